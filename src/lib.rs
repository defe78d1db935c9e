#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Background Removal Pipeline
//!
//! Removes the background from a single PNG or JPEG image. Bytes go through a
//! size guard, are decoded and bounded to a maximum working dimension, handed
//! to a pluggable segmentation backend, and optionally flattened onto a solid
//! fill color before being encoded.
//!
//! ## Features
//!
//! - **Pluggable segmentation**: any [`Segmenter`] implementation drives the
//!   pipeline; a pure Rust Tract backend is included (`tract` feature)
//! - **Single-flight cache**: identical input bytes are segmented at most once,
//!   even when requests arrive concurrently
//! - **Deterministic output**: transparent results are PNG, filled results are
//!   JPEG, always
//! - **CLI Integration**: optional `bgremove` command (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "tract")]
//! # async fn example() -> anyhow::Result<()> {
//! use bgremove_pipeline::{
//!     backends::TractSegmenter, utils::PreprocessingConfig, BackgroundRemovalPipeline,
//!     FillColor, PipelineConfig,
//! };
//! use std::sync::Arc;
//!
//! let segmenter = TractSegmenter::from_path("isnet.onnx", PreprocessingConfig::default())?;
//! let pipeline = BackgroundRemovalPipeline::new(PipelineConfig::default(), Arc::new(segmenter))?;
//!
//! // Transparent PNG
//! let cutout = pipeline.process_file("photo.jpg", None).await?;
//! cutout.save(cutout.file_name())?;
//!
//! // Same input on white: the segmentation is served from the cache
//! let on_white = pipeline
//!     .process_file("photo.jpg", Some("#FFFFFF".parse::<FillColor>()?))
//!     .await?;
//! assert!(on_white.metadata.cache_hit);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust ONNX backend
//! - `cli` (default): Command-line interface and log subscriber setup
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod processor;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;
use tokio::io::AsyncRead;

// Public API exports
pub use cache::{CacheKey, CacheStats, SegmentationCache};
pub use config::{OutputFormat, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, Result, SegmenterError};
pub use inference::Segmenter;
pub use processor::BackgroundRemovalPipeline;
pub use segmentation::{SegmentationAdapter, SegmentationOutcome};
pub use services::{Compositor, ImageResizer, OutputEncoder, SizeGuard};
pub use types::{
    EncodedImage, FillColor, PipelineStage, ProcessedResult, ProcessingMetadata,
    ProcessingTimings, RawImageBytes,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from an in-memory image with a one-off pipeline
///
/// Suited to single calls; long-lived callers should keep a
/// [`BackgroundRemovalPipeline`] so its cache is reused.
///
/// # Examples
///
/// ```rust
/// use bgremove_pipeline::{
///     backends::test_utils::MockSegmenter, remove_background_from_bytes, FillColor,
///     OutputFormat, PipelineConfig,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> anyhow::Result<()> {
/// let mut png = std::io::Cursor::new(Vec::new());
/// image::RgbaImage::new(8, 8).write_to(&mut png, image::ImageFormat::Png)?;
///
/// let result = remove_background_from_bytes(
///     png.get_ref(),
///     Some(FillColor::WHITE),
///     Arc::new(MockSegmenter::new()),
///     PipelineConfig::default(),
/// )
/// .await?;
/// assert_eq!(result.format(), OutputFormat::Jpeg);
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    fill: Option<FillColor>,
    segmenter: Arc<dyn Segmenter>,
    config: PipelineConfig,
) -> Result<ProcessedResult> {
    BackgroundRemovalPipeline::new(config, segmenter)?
        .process_bytes(image_bytes, fill)
        .await
}

/// Remove the background from an async reader stream with a one-off pipeline
///
/// The stream is read up to the configured payload limit plus one byte.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    fill: Option<FillColor>,
    segmenter: Arc<dyn Segmenter>,
    config: PipelineConfig,
) -> Result<ProcessedResult> {
    BackgroundRemovalPipeline::new(config, segmenter)?
        .process_reader(reader, fill)
        .await
}
