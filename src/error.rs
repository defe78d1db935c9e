//! Error types for background removal pipeline operations

use crate::types::PipelineStage;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Opaque error raised by a segmentation capability
pub type SegmenterError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for the background removal pipeline
///
/// Errors are cheap to clone so that one failed segmentation can be reported
/// to every request that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Input exceeds the configured byte threshold
    #[error("Payload too large: {size} bytes exceeds the maximum of {limit} bytes")]
    PayloadTooLarge {
        /// Size that tripped the guard (claimed or measured)
        size: u64,
        /// Configured maximum payload size
        limit: u64,
    },

    /// Bytes are not a valid or supported raster
    #[error("Failed to decode image: {0}")]
    DecodeFailed(#[source] Arc<image::ImageError>),

    /// The external segmentation capability failed
    #[error("Segmentation failed: {0}")]
    SegmentationFailed(#[source] Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// Serializing the final raster failed
    #[error("Failed to encode output image: {0}")]
    EncodeFailed(#[source] Arc<image::ImageError>),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Segmentation model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Input/output errors (reader, file system)
    #[error("IO error: {0}")]
    Io(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl PipelineError {
    /// Create a new payload-too-large error
    #[must_use]
    pub fn payload_too_large(size: u64, limit: u64) -> Self {
        Self::PayloadTooLarge { size, limit }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Wrap any capability error as a segmentation failure
    pub fn segmentation<E>(cause: E) -> Self
    where
        E: Into<SegmenterError>,
    {
        Self::SegmentationFailed(Arc::from(cause.into()))
    }

    /// Create a decode error from the codec's error
    #[must_use]
    pub fn decode(err: image::ImageError) -> Self {
        Self::DecodeFailed(Arc::new(err))
    }

    /// Create an encode error from the codec's error
    #[must_use]
    pub fn encode(err: image::ImageError) -> Self {
        Self::EncodeFailed(Arc::new(err))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether the failure was caused by the submitted input
    ///
    /// Input errors are recoverable by resubmitting different input.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. } | Self::DecodeFailed(_))
    }

    /// Whether the failure came from the segmentation capability
    ///
    /// Capability errors are worth retrying later or reporting upstream.
    #[must_use]
    pub fn is_capability_error(&self) -> bool {
        matches!(self, Self::SegmentationFailed(_))
    }

    /// The pipeline transition that aborted, if the error came from one
    #[must_use]
    pub fn failed_stage(&self) -> Option<PipelineStage> {
        match self {
            Self::PayloadTooLarge { .. } => Some(PipelineStage::SizeChecked),
            Self::DecodeFailed(_) => Some(PipelineStage::Decoded),
            Self::SegmentationFailed(_) => Some(PipelineStage::Segmented),
            Self::EncodeFailed(_) => Some(PipelineStage::Encoded),
            Self::InvalidConfig(_) | Self::Model(_) | Self::Io(_) => None,
        }
    }
}
