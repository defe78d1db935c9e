//! Segmentation backends
//!
//! - Tract backend (pure Rust ONNX inference)
//! - Mock backends for exercising the pipeline without a model

#[cfg(feature = "tract")]
pub mod tract;

pub mod test_utils;

#[cfg(feature = "tract")]
pub use self::tract::TractSegmenter;
