//! Configuration types for the background removal pipeline

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default maximum payload size (10 MiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default maximum working dimension in pixels
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;

/// Default file name stem for processed downloads
pub const DEFAULT_OUTPUT_STEM: &str = "processed_background_removed";

/// Output container format
///
/// The format is never chosen by the caller; it follows from whether the final
/// image still has an alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Lossless PNG, preserves the alpha channel
    Png,
    /// Lossy JPEG, opaque only
    Jpeg,
}

impl OutputFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    /// MIME type derived from the extension
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpg",
        }
    }

    #[must_use]
    pub fn supports_transparency(self) -> bool {
        matches!(self, Self::Png)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
        }
    }
}

/// Configuration for the background removal pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum accepted payload size in bytes
    pub max_payload_bytes: u64,

    /// Maximum width or height of the working image
    pub max_dimension: u32,

    /// Also check the measured byte length, not only the transport's size hint
    pub strict_size_check: bool,

    /// JPEG quality (1-100, only used for filled output)
    pub jpeg_quality: u8,

    /// File name stem for the suggested download name
    pub output_stem: String,

    /// Maximum number of cached segmentation results (None = unbounded)
    pub cache_capacity: Option<usize>,

    /// Disable memoization of the segmentation stage
    pub disable_cache: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            strict_size_check: true,
            jpeg_quality: 90,
            output_stem: DEFAULT_OUTPUT_STEM.to_string(),
            cache_capacity: None,
            disable_cache: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_pipeline::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .max_dimension(1024)
    ///     .jpeg_quality(85)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_dimension, 1024);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Zero payload limit or zero dimension bound
    /// - JPEG quality outside 1-100
    /// - Zero cache capacity
    /// - Empty output file name stem
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_bytes == 0 {
            return Err(PipelineError::config_value_error(
                "maximum payload size",
                self.max_payload_bytes,
                "> 0",
            ));
        }
        if self.max_dimension == 0 {
            return Err(PipelineError::config_value_error(
                "maximum dimension",
                self.max_dimension,
                "> 0",
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
            ));
        }
        if self.cache_capacity == Some(0) {
            return Err(PipelineError::config_value_error(
                "cache capacity",
                0,
                "> 0 or unbounded",
            ));
        }
        if self.output_stem.trim().is_empty() {
            return Err(PipelineError::invalid_config(
                "Output file name stem must not be empty",
            ));
        }
        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this structure
    /// - Loaded values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse and validate a configuration from a JSON string
    ///
    /// # Errors
    /// - Malformed JSON
    /// - Loaded values fail validation
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| {
            PipelineError::invalid_config(format!("Failed to parse configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_payload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_payload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, dimension: u32) -> Self {
        self.config.max_dimension = dimension;
        self
    }

    #[must_use]
    pub fn strict_size_check(mut self, strict: bool) -> Self {
        self.config.strict_size_check = strict;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    #[must_use]
    pub fn output_stem<S: Into<String>>(mut self, stem: S) -> Self {
        self.config.output_stem = stem.into();
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any value rejected by [`PipelineConfig::validate`]
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
