//! Tract segmentation backend
//!
//! Runs a single-output ONNX matting model (ISNet / U²-Net style) with Tract,
//! a pure Rust inference engine. The model sees a letterboxed square input and
//! returns a `1x1xNxN` foreground probability map, which is mapped back onto
//! the working image as its alpha channel.

use crate::error::{PipelineError, Result, SegmenterError};
use crate::inference::Segmenter;
use crate::utils::preprocessing::{ImagePreprocessor, Letterbox, PreprocessingConfig};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tract_onnx::prelude::*;
use tracing::{debug, info};

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Segmenter backed by an optimized Tract plan
#[derive(Clone)]
pub struct TractSegmenter {
    model: Arc<TractModel>,
    config: PreprocessingConfig,
}

impl std::fmt::Debug for TractSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractSegmenter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TractSegmenter {
    /// Load and optimize an ONNX model from disk
    ///
    /// The input fact is pinned to `1x3xNxN` where `N` is
    /// `config.target_size`, which lets Tract fully optimize the plan.
    ///
    /// # Errors
    /// - Invalid preprocessing configuration
    /// - Model file missing, unreadable, or not a supported ONNX graph
    pub fn from_path<P: AsRef<Path>>(path: P, config: PreprocessingConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let load_start = Instant::now();
        let side = config.target_size as usize;

        info!(model = %path.display(), input_size = side, "Loading Tract model");

        let model = onnx()
            .model_for_path(path)
            .map_err(|e| PipelineError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| PipelineError::model(format!("Failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| PipelineError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| PipelineError::model(format!("Failed to create runnable model: {e}")))?;

        info!(
            elapsed_ms = load_start.elapsed().as_millis() as u64,
            "Tract model ready"
        );

        Ok(Self {
            model: Arc::new(model),
            config,
        })
    }

    /// Model input configuration in use
    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.config
    }

    fn infer(
        model: &TractModel,
        config: &PreprocessingConfig,
        image: &RgbaImage,
    ) -> std::result::Result<RgbaImage, SegmenterError> {
        let inference_start = Instant::now();
        let (input, letterbox) = ImagePreprocessor::preprocess(image, config)?;

        let outputs = model
            .run(tvec![Tensor::from(input).into()])
            .map_err(|e| format!("Tract inference failed: {e}"))?;
        let output = outputs.first().ok_or("No output tensor found")?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| format!("Failed to read output tensor: {e}"))?;

        let shape = view.shape().to_vec();
        let side = config.target_size as usize;
        let [.., height, width] = shape.as_slice() else {
            return Err(format!("Unexpected output tensor shape {shape:?}").into());
        };
        if *height != side || *width != side || view.len() != side * side {
            return Err(format!(
                "Expected a single {side}x{side} mask, got output shape {shape:?}"
            )
            .into());
        }

        let mask: Vec<f32> = view.iter().copied().collect();
        debug!(
            elapsed_ms = inference_start.elapsed().as_millis() as u64,
            "Tract inference complete"
        );
        Ok(apply_mask(image, &mask, side, &letterbox))
    }
}

#[async_trait]
impl Segmenter for TractSegmenter {
    async fn segment(&self, image: RgbaImage) -> std::result::Result<RgbaImage, SegmenterError> {
        let model = Arc::clone(&self.model);
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || Self::infer(&model, &config, &image))
            .await
            .map_err(|e| format!("Inference task failed: {e}"))?
    }

    fn name(&self) -> &str {
        "tract"
    }
}

/// Write a square probability map into the alpha channel of `image`
///
/// The map is min-max normalized first, so models whose output is not
/// already in 0-1 still produce a full-range alpha.
fn apply_mask(image: &RgbaImage, mask: &[f32], side: usize, letterbox: &Letterbox) -> RgbaImage {
    let (min, max) = mask
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;

    let (width, height) = image.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let (mx, my) = letterbox.project(x, y);
        let raw = mask
            .get(my as usize * side + mx as usize)
            .copied()
            .unwrap_or(min);
        let value = if range > f32::EPSILON {
            (raw - min) / range
        } else {
            raw.clamp(0.0, 1.0)
        };
        let pixel = image.get_pixel(x, y);
        Rgba([
            pixel[0],
            pixel[1],
            pixel[2],
            (value * 255.0).round().clamp(0.0, 255.0) as u8,
        ])
    })
}
