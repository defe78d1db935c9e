//! Background removal pipeline
//!
//! This module provides `BackgroundRemovalPipeline`, which drives one request
//! through every stage:
//!
//! `Received → SizeChecked → Decoded → Resized → Segmented → Composited → Encoded → Delivered`
//!
//! Only the size check, decoding, segmentation and encoding can fail. A failed
//! request produces no output bytes.

use crate::{
    cache::{CacheKey, CacheStats, SegmentationCache},
    config::PipelineConfig,
    error::{PipelineError, Result},
    inference::Segmenter,
    segmentation::SegmentationAdapter,
    services::{Compositor, ImageResizer, OutputEncoder, SizeGuard},
    types::{
        FillColor, PipelineStage, ProcessedResult, ProcessingMetadata, ProcessingTimings,
        RawImageBytes,
    },
};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument, warn};

/// Background removal pipeline around an injected segmenter
///
/// The pipeline is shareable across tasks (`&self` everywhere); concurrent
/// requests for identical bytes share one segmentation.
pub struct BackgroundRemovalPipeline {
    config: PipelineConfig,
    guard: SizeGuard,
    adapter: SegmentationAdapter,
}

impl BackgroundRemovalPipeline {
    /// Create a pipeline from a configuration and a segmentation backend
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration fails validation
    pub fn new(config: PipelineConfig, segmenter: Arc<dyn Segmenter>) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config, segmenter))
    }

    /// Create a pipeline with the default configuration
    #[must_use]
    pub fn with_default_config(segmenter: Arc<dyn Segmenter>) -> Self {
        Self::from_validated(PipelineConfig::default(), segmenter)
    }

    fn from_validated(config: PipelineConfig, segmenter: Arc<dyn Segmenter>) -> Self {
        let guard = if config.strict_size_check {
            SizeGuard::strict(config.max_payload_bytes)
        } else {
            SizeGuard::new(config.max_payload_bytes)
        };
        let cache = if config.disable_cache {
            None
        } else {
            Some(SegmentationCache::with_capacity(config.cache_capacity))
        };

        info!(
            backend = %segmenter.name(),
            max_payload_bytes = config.max_payload_bytes,
            max_dimension = config.max_dimension,
            cache = !config.disable_cache,
            "Background removal pipeline ready"
        );

        Self {
            config,
            guard,
            adapter: SegmentationAdapter::with_cache(segmenter, cache),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Segmentation cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.adapter.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.adapter.clear_cache();
    }

    /// Remove the background from one image
    ///
    /// Without a fill color the result is a transparent PNG; with one, the
    /// cut-out is flattened onto that color and delivered as JPEG.
    ///
    /// # Errors
    /// - `PayloadTooLarge` when the claimed or measured size exceeds the limit
    /// - `DecodeFailed` when the bytes are not a supported raster
    /// - `SegmentationFailed` when the backend fails
    /// - `EncodeFailed` when serializing the result fails
    #[instrument(
        name = "process",
        skip(self, input),
        fields(
            bytes = input.len(),
            claimed_size = ?input.claimed_size(),
            fill = ?fill.map(|c| c.to_string())
        )
    )]
    pub async fn process(
        &self,
        input: RawImageBytes,
        fill: Option<FillColor>,
    ) -> Result<ProcessedResult> {
        self.run(input, fill).await.map_err(|err| {
            warn!(
                stage = ?err.failed_stage(),
                input_error = err.is_input_error(),
                error = %err,
                "Background removal aborted"
            );
            err
        })
    }

    /// Remove the background from an in-memory image
    ///
    /// # Errors
    /// Same as [`process`](Self::process)
    pub async fn process_bytes(
        &self,
        bytes: &[u8],
        fill: Option<FillColor>,
    ) -> Result<ProcessedResult> {
        self.process(RawImageBytes::from(bytes), fill).await
    }

    /// Remove the background from an async byte stream
    ///
    /// At most `max_payload_bytes + 1` bytes are read, so an oversized stream
    /// is rejected without being buffered in full.
    ///
    /// # Errors
    /// - `Io` when reading the stream fails
    /// - Same as [`process`](Self::process)
    pub async fn process_reader<R: AsyncRead + Unpin>(
        &self,
        reader: R,
        fill: Option<FillColor>,
    ) -> Result<ProcessedResult> {
        let limit = self.guard.max_bytes();
        let mut buffer = Vec::new();
        reader
            .take(limit.saturating_add(1))
            .read_to_end(&mut buffer)
            .await?;

        let read = buffer.len() as u64;
        if let Err(err) = self.guard.check_size(read) {
            warn!(read, limit, "Input stream exceeds the payload limit");
            return Err(err);
        }

        self.process(RawImageBytes::new(buffer), fill).await
    }

    /// Remove the background from an image file
    ///
    /// The file length from metadata is used as the claimed size, so an
    /// oversized file is rejected before it is read.
    ///
    /// # Errors
    /// - `Io` when the file cannot be inspected or read
    /// - Same as [`process`](Self::process)
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
        fill: Option<FillColor>,
    ) -> Result<ProcessedResult> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        debug!(path = %path.display(), size, "Reading input file");
        self.guard.check_size(size)?;

        let data = tokio::fs::read(path).await?;
        self.process(RawImageBytes::with_claimed_size(data, size), fill)
            .await
    }

    async fn run(&self, input: RawImageBytes, fill: Option<FillColor>) -> Result<ProcessedResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        transition(PipelineStage::Received);

        let input = self.guard.check(input)?;
        transition(PipelineStage::SizeChecked);

        let key = CacheKey::from_bytes(input.as_bytes());
        let max_dimension = self.config.max_dimension;

        let segmentation_start = Instant::now();
        let outcome = self
            .adapter
            .segment(key, || {
                let decoded = image::load_from_memory(input.as_bytes())
                    .map_err(PipelineError::decode)?
                    .into_rgba8();
                transition(PipelineStage::Decoded);

                let working = ImageResizer::fit_within(decoded, max_dimension);
                transition(PipelineStage::Resized);
                Ok(working)
            })
            .await?;
        timings.segmentation_ms = elapsed_ms(segmentation_start);
        transition(PipelineStage::Segmented);

        let working_dimensions = outcome.image.dimensions();

        let compositing_start = Instant::now();
        let image = Compositor::apply(&outcome.image, fill);
        timings.compositing_ms = elapsed_ms(compositing_start);
        transition(PipelineStage::Composited);

        let encode_start = Instant::now();
        let output =
            OutputEncoder::encode(&image, self.config.jpeg_quality, &self.config.output_stem)?;
        timings.encode_ms = elapsed_ms(encode_start);
        transition(PipelineStage::Encoded);

        timings.total_ms = elapsed_ms(total_start);
        info!(
            format = %output.format,
            output_bytes = output.bytes.len(),
            width = working_dimensions.0,
            height = working_dimensions.1,
            cache_hit = outcome.cache_hit,
            total_ms = timings.total_ms,
            "Background removal complete"
        );
        transition(PipelineStage::Delivered);

        Ok(ProcessedResult {
            image,
            output,
            metadata: ProcessingMetadata {
                cache_hit: outcome.cache_hit,
                working_dimensions,
                fill_color: fill,
                timings,
            },
        })
    }
}

fn transition(stage: PipelineStage) {
    debug!(stage = %stage, "Pipeline stage reached");
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{FailingSegmenter, MockSegmenter};
    use crate::config::OutputFormat;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90, 255])
        });
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn pipeline(mock: &MockSegmenter) -> BackgroundRemovalPipeline {
        BackgroundRemovalPipeline::with_default_config(Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_transparent_result_is_png() {
        let mock = MockSegmenter::new();
        let result = pipeline(&mock)
            .process_bytes(&png_bytes(16, 12), None)
            .await
            .unwrap();

        assert_eq!(result.format(), OutputFormat::Png);
        assert!(result.has_alpha());
        assert_eq!(result.mime_type(), "image/png");
        assert_eq!(result.file_name(), "processed_background_removed.png");
        assert_eq!(result.metadata.working_dimensions, (16, 12));
        assert!(!result.metadata.cache_hit);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_filled_result_is_jpeg() {
        let mock = MockSegmenter::new();
        let result = pipeline(&mock)
            .process_bytes(&png_bytes(16, 12), Some(FillColor::WHITE))
            .await
            .unwrap();

        assert_eq!(result.format(), OutputFormat::Jpeg);
        assert!(!result.has_alpha());
        assert_eq!(result.mime_type(), "image/jpg");
        assert_eq!(result.file_name(), "processed_background_removed.jpg");
        assert_eq!(result.metadata.fill_color, Some(FillColor::WHITE));
    }

    #[tokio::test]
    async fn test_second_request_hits_cache() {
        let mock = MockSegmenter::new();
        let pipeline = pipeline(&mock);
        let bytes = png_bytes(10, 10);

        let cold = pipeline.process_bytes(&bytes, None).await.unwrap();
        let warm = pipeline.process_bytes(&bytes, None).await.unwrap();

        assert!(warm.metadata.cache_hit);
        assert_eq!(cold.bytes(), warm.bytes());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(pipeline.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_fill_does_not_change_cache_identity() {
        let mock = MockSegmenter::new();
        let pipeline = pipeline(&mock);
        let bytes = png_bytes(10, 10);

        pipeline.process_bytes(&bytes, None).await.unwrap();
        let filled = pipeline
            .process_bytes(&bytes, Some(FillColor::BLACK))
            .await
            .unwrap();

        assert!(filled.metadata.cache_hit);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_filled_request_leaves_cached_frame_intact() {
        let mock = MockSegmenter::new();
        let pipeline = pipeline(&mock);
        let bytes = png_bytes(10, 10);

        pipeline
            .process_bytes(&bytes, Some(FillColor::BLACK))
            .await
            .unwrap();
        let transparent = pipeline.process_bytes(&bytes, None).await.unwrap();
        assert!(transparent.metadata.cache_hit);

        let decoded = image::load_from_memory(transparent.bytes()).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0)[3], 0);

        let fresh = BackgroundRemovalPipeline::new(
            PipelineConfig::builder().disable_cache(true).build().unwrap(),
            Arc::new(MockSegmenter::new()),
        )
        .unwrap()
        .process_bytes(&bytes, None)
        .await
        .unwrap();
        assert_eq!(fresh.bytes(), transparent.bytes());
    }

    #[tokio::test]
    async fn test_default_pipeline_matches_validated_new() {
        let mock = MockSegmenter::new();
        let defaulted = pipeline(&mock);
        let validated =
            BackgroundRemovalPipeline::new(PipelineConfig::default(), Arc::new(mock.clone()))
                .unwrap();
        assert_eq!(defaulted.config(), validated.config());

        let bytes = png_bytes(6, 6);
        defaulted.process_bytes(&bytes, None).await.unwrap();
        validated.process_bytes(&bytes, None).await.unwrap();
        assert_eq!(defaulted.cache_stats(), validated.cache_stats());
        assert_eq!(defaulted.cache_stats().entries, 1);
    }

    #[tokio::test]
    async fn test_oversized_input_never_reaches_backend() {
        let mock = MockSegmenter::new();
        let config = PipelineConfig::builder()
            .max_payload_bytes(8)
            .build()
            .unwrap();
        let pipeline = BackgroundRemovalPipeline::new(config, Arc::new(mock.clone())).unwrap();

        let err = pipeline
            .process_bytes(&png_bytes(4, 4), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::PayloadTooLarge { .. }));
        assert_eq!(err.failed_stage(), Some(PipelineStage::SizeChecked));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure() {
        let mock = MockSegmenter::new();
        let err = pipeline(&mock)
            .process_bytes(b"definitely not an image", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DecodeFailed(_)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_segmentation_failure_is_surfaced() {
        let failing = FailingSegmenter::new("no model");
        let pipeline = BackgroundRemovalPipeline::with_default_config(Arc::new(failing.clone()));

        let err = pipeline
            .process_bytes(&png_bytes(4, 4), None)
            .await
            .unwrap_err();
        assert!(err.is_capability_error());
        assert_eq!(err.failed_stage(), Some(PipelineStage::Segmented));
        assert_eq!(failing.call_count(), 1);
    }

    #[tokio::test]
    async fn test_large_input_is_downscaled() {
        let mock = MockSegmenter::new();
        let config = PipelineConfig::builder().max_dimension(50).build().unwrap();
        let pipeline = BackgroundRemovalPipeline::new(config, Arc::new(mock)).unwrap();

        let result = pipeline.process_bytes(&png_bytes(200, 100), None).await.unwrap();
        assert_eq!(result.dimensions(), (50, 25));
        assert_eq!(result.metadata.working_dimensions, (50, 25));
    }

    #[tokio::test]
    async fn test_reader_stops_after_limit() {
        let mock = MockSegmenter::new();
        let config = PipelineConfig::builder()
            .max_payload_bytes(16)
            .build()
            .unwrap();
        let pipeline = BackgroundRemovalPipeline::new(config, Arc::new(mock.clone())).unwrap();

        let err = pipeline
            .process_reader(Cursor::new(vec![0_u8; 1024]), None)
            .await
            .unwrap_err();
        match err {
            PipelineError::PayloadTooLarge { size, limit } => {
                assert_eq!(size, 17);
                assert_eq!(limit, 16);
            },
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            max_dimension: 0,
            ..PipelineConfig::default()
        };
        let result = BackgroundRemovalPipeline::new(config, Arc::new(MockSegmenter::new()));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
