//! Segmentation adapter
//!
//! Owns the boundary to the injected [`Segmenter`]: memoization by input-byte
//! identity, failure translation, and the same-dimensions contract check.

use crate::{
    cache::{CacheKey, CacheStats, SegmentationCache},
    error::{PipelineError, Result},
    inference::Segmenter,
};
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info};

/// Segmented working image plus where it came from
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    /// RGBA image with background pixels made transparent
    pub image: Arc<RgbaImage>,
    /// Whether this request reused another request's computation
    pub cache_hit: bool,
}

/// Memoizing wrapper around a segmentation backend
pub struct SegmentationAdapter {
    segmenter: Arc<dyn Segmenter>,
    cache: Option<SegmentationCache>,
}

impl SegmentationAdapter {
    /// Create an adapter with an unbounded cache
    #[must_use]
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self::with_cache(segmenter, Some(SegmentationCache::new()))
    }

    /// Create an adapter with an explicit cache, or none to always recompute
    #[must_use]
    pub fn with_cache(segmenter: Arc<dyn Segmenter>, cache: Option<SegmentationCache>) -> Self {
        Self { segmenter, cache }
    }

    /// Segment the image identified by `key`
    ///
    /// `prepare` produces the bounded RGBA working image (decode + resize). It
    /// only runs when no stored or in-flight result exists for `key`, so a
    /// cache hit skips decoding entirely.
    ///
    /// # Errors
    /// - Errors from `prepare` (e.g. `DecodeFailed`)
    /// - `SegmentationFailed` when the backend errors or breaks its contract
    pub async fn segment<F>(&self, key: CacheKey, prepare: F) -> Result<SegmentationOutcome>
    where
        F: FnOnce() -> Result<RgbaImage>,
    {
        let Some(cache) = &self.cache else {
            let image = self.compute(key, prepare).await?;
            return Ok(SegmentationOutcome {
                image: Arc::new(image),
                cache_hit: false,
            });
        };

        let (image, cache_hit) = cache
            .get_or_compute(key, move || self.compute(key, prepare))
            .await?;
        Ok(SegmentationOutcome { image, cache_hit })
    }

    /// Cache statistics; all zero when caching is disabled
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .as_ref()
            .map(SegmentationCache::stats)
            .unwrap_or_default()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    #[must_use]
    pub fn segmenter_name(&self) -> &str {
        self.segmenter.name()
    }

    async fn compute<F>(&self, key: CacheKey, prepare: F) -> Result<RgbaImage>
    where
        F: FnOnce() -> Result<RgbaImage>,
    {
        let working = prepare()?;
        let expected = working.dimensions();

        info!(
            key = %key,
            backend = %self.segmenter.name(),
            dimensions = %format!("{}x{}", expected.0, expected.1),
            "Running background segmentation"
        );

        let segmented = self
            .segmenter
            .segment(working)
            .await
            .map_err(PipelineError::segmentation)?;

        if segmented.dimensions() != expected {
            return Err(PipelineError::segmentation(format!(
                "backend '{}' returned {}x{} for a {}x{} input",
                self.segmenter.name(),
                segmented.width(),
                segmented.height(),
                expected.0,
                expected.1
            )));
        }

        debug!(key = %key, "Segmentation complete");
        Ok(segmented)
    }
}
