//! Shared utilities for segmentation backends

#[cfg(feature = "tract")]
pub mod preprocessing;

#[cfg(feature = "tract")]
pub use preprocessing::{ImagePreprocessor, Letterbox, PreprocessingConfig};
