//! Test utilities and mock segmenters
//!
//! This module provides mock implementations of the `Segmenter` trait so the
//! pipeline can be exercised without model files or an inference runtime.

use crate::{error::SegmenterError, inference::Segmenter};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock segmenter that cuts out a soft-edged circle
///
/// Clones share the same call counter, so a test can hand one clone to the
/// pipeline and keep another to inspect.
#[derive(Debug, Clone, Default)]
pub struct MockSegmenter {
    /// Number of `segment` invocations across all clones
    calls: Arc<AtomicUsize>,
    /// Simulated inference latency
    delay: Option<Duration>,
}

impl MockSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that sleeps before answering, widening race windows
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Some(delay),
        }
    }

    /// Number of times the backend was invoked
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Apply the mock mask: opaque inside a centered circle, fading to
    /// transparent at its edge, fully transparent outside
    #[must_use]
    pub fn cut_out(image: &RgbaImage) -> RgbaImage {
        let (width, height) = image.dimensions();
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 2.0).max(1.0);

        RgbaImage::from_fn(width, height, |x, y| {
            let pixel = image.get_pixel(x, y);
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            let coverage = ((radius - distance) / radius).clamp(0.0, 1.0);
            // Scale so the inner half of the radius is fully opaque
            let alpha = (coverage * 2.0).min(1.0) * 255.0;
            Rgba([pixel[0], pixel[1], pixel[2], alpha.round() as u8])
        })
    }
}

#[async_trait]
impl Segmenter for MockSegmenter {
    async fn segment(&self, image: RgbaImage) -> Result<RgbaImage, SegmenterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Self::cut_out(&image))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Mock segmenter that always fails
#[derive(Debug, Clone)]
pub struct FailingSegmenter {
    message: String,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl FailingSegmenter {
    #[must_use]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    /// Fail only after `delay`, so concurrent requests overlap the failure
    #[must_use]
    pub fn with_delay<S: Into<String>>(message: S, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(message)
        }
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Segmenter for FailingSegmenter {
    async fn segment(&self, _image: RgbaImage) -> Result<RgbaImage, SegmenterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Err(self.message.clone().into())
    }

    fn name(&self) -> &str {
        "failing-mock"
    }
}

/// Mock segmenter that violates the same-dimensions contract
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizingSegmenter;

#[async_trait]
impl Segmenter for ResizingSegmenter {
    async fn segment(&self, image: RgbaImage) -> Result<RgbaImage, SegmenterError> {
        let (width, height) = image.dimensions();
        Ok(RgbaImage::new(width + 1, height))
    }

    fn name(&self) -> &str {
        "resizing-mock"
    }
}
