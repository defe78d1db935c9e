//! Segmentation capability abstraction
//!
//! The background segmentation model is an injected dependency. Anything that
//! can turn an RGBA image into an RGBA image of the same size, with background
//! pixels made transparent, can drive the pipeline.

use crate::error::SegmenterError;
use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Arc;

/// Trait for background segmentation backends
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Remove the background from `image`
    ///
    /// Implementations must return an image with the same dimensions whose
    /// alpha channel encodes foreground (255) versus background (0).
    ///
    /// # Errors
    /// - Any backend failure; the pipeline reports it as `SegmentationFailed`
    async fn segment(&self, image: RgbaImage) -> Result<RgbaImage, SegmenterError>;

    /// Short backend name for logs
    fn name(&self) -> &str {
        "segmenter"
    }
}

#[async_trait]
impl<T: Segmenter + ?Sized> Segmenter for Arc<T> {
    async fn segment(&self, image: RgbaImage) -> Result<RgbaImage, SegmenterError> {
        (**self).segment(image).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
