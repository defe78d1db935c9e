//! Core data types for the background removal pipeline

use crate::{
    config::OutputFormat,
    error::{PipelineError, Result},
};
use image::{DynamicImage, Rgb};
use std::path::Path;

/// Raw image bytes as received from the caller
///
/// The claimed size is whatever the transport reported; it is optional and is
/// never derived from the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImageBytes {
    data: Vec<u8>,
    claimed_size: Option<u64>,
}

impl RawImageBytes {
    /// Wrap bytes without a size hint
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            claimed_size: None,
        }
    }

    /// Wrap bytes together with the size reported by the transport
    #[must_use]
    pub fn with_claimed_size(data: Vec<u8>, claimed_size: u64) -> Self {
        Self {
            data,
            claimed_size: Some(claimed_size),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn claimed_size(&self) -> Option<u64> {
        self.claimed_size
    }

    /// Number of bytes actually held
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for RawImageBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for RawImageBytes {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

/// Opaque solid fill color for flattening transparent results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FillColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl FillColor {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub fn to_rgb(self) -> Rgb<u8> {
        Rgb([self.r, self.g, self.b])
    }
}

impl std::str::FromStr for FillColor {
    type Err = PipelineError;

    /// Parse `#RRGGBB`, `RRGGBB`, `#RGB` or `RGB` (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        let invalid =
            || PipelineError::invalid_config(format!("Invalid fill color '{}': expected #RRGGBB", s));

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| invalid());
        match hex.len() {
            6 => Ok(Self::new(
                channel(hex.get(0..2).ok_or_else(invalid)?)?,
                channel(hex.get(2..4).ok_or_else(invalid)?)?,
                channel(hex.get(4..6).ok_or_else(invalid)?)?,
            )),
            3 => {
                // #abc expands to #aabbcc
                let nibble = |i: usize| channel(hex.get(i..=i).ok_or_else(invalid)?).map(|v| v * 17);
                Ok(Self::new(nibble(0)?, nibble(1)?, nibble(2)?))
            },
            _ => Err(invalid()),
        }
    }
}

impl std::fmt::Display for FillColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Linear pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Received,
    SizeChecked,
    Decoded,
    Resized,
    Segmented,
    Composited,
    Encoded,
    Delivered,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::SizeChecked => "size_checked",
            Self::Decoded => "decoded",
            Self::Resized => "resized",
            Self::Segmented => "segmented",
            Self::Composited => "composited",
            Self::Encoded => "encoded",
            Self::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

/// Serialized output image ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded container bytes
    pub bytes: Vec<u8>,
    /// Container format chosen from the channel layout
    pub format: OutputFormat,
    /// MIME type matching the format's extension
    pub mime_type: String,
    /// Suggested download file name
    pub file_name: String,
}

/// Detailed timing breakdown for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingTimings {
    /// Decode, resize and segmentation (zero work on a cache hit)
    pub segmentation_ms: u64,
    /// Fill compositing
    pub compositing_ms: u64,
    /// Output serialization
    pub encode_ms: u64,
    /// End-to-end
    pub total_ms: u64,
}

/// Metadata about a completed pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingMetadata {
    /// Whether the segmented image came from the cache
    pub cache_hit: bool,
    /// Dimensions of the segmented (working) image
    pub working_dimensions: (u32, u32),
    /// Fill color that was applied, if any
    pub fill_color: Option<FillColor>,
    pub timings: ProcessingTimings,
}

/// Final output of a successful pipeline run
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    /// The final raster (RGBA when no fill was applied, RGB otherwise)
    pub image: DynamicImage,
    /// The serialized image
    pub output: EncodedImage,
    pub metadata: ProcessingMetadata,
}

impl ProcessedResult {
    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.output.format
    }

    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.image.color().has_alpha()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.output.bytes
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.output.mime_type
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.output.file_name
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Human-readable completion summary, e.g. `Done in 1.23s (cached)`
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let secs = self.metadata.timings.total_ms as f64 / 1000.0;
        if self.metadata.cache_hit {
            format!("Done in {:.2}s (cached)", secs)
        } else {
            format!("Done in {:.2}s", secs)
        }
    }

    /// Write the encoded bytes to `path`
    ///
    /// # Errors
    /// - File system errors while writing
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.output.bytes)?;
        Ok(())
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.output.bytes
    }
}
