//! Model input preprocessing
//!
//! Letterboxes the working image into the square model input and converts it
//! to a normalized NCHW tensor. The [`Letterbox`] geometry is kept so the
//! model's mask can be mapped back onto the original pixels.

use crate::error::{PipelineError, Result};
use image::{imageops::FilterType, Rgb, RgbImage, RgbaImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Model input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Side length of the square model input
    pub target_size: u32,
    /// Per-channel mean subtracted after scaling to 0-1
    pub normalization_mean: [f32; 3],
    /// Per-channel divisor applied after mean subtraction
    pub normalization_std: [f32; 3],
    /// RGB color for the letterbox padding
    pub padding_color: [u8; 3],
}

impl Default for PreprocessingConfig {
    /// ISNet-style defaults
    fn default() -> Self {
        Self {
            target_size: 1024,
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [1.0, 1.0, 1.0],
            padding_color: [255, 255, 255],
        }
    }
}

impl PreprocessingConfig {
    /// # Errors
    /// - Zero target size
    /// - Non-positive or non-finite standard deviation
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(PipelineError::config_value_error(
                "model input size",
                self.target_size,
                "> 0",
            ));
        }
        if self
            .normalization_std
            .iter()
            .any(|std| !std.is_finite() || *std <= 0.0)
        {
            return Err(PipelineError::invalid_config(
                "Normalization std values must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Geometry of an image placed inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale applied to the original image
    pub scale: f32,
    /// Left padding in tensor pixels
    pub offset_x: u32,
    /// Top padding in tensor pixels
    pub offset_y: u32,
    /// Scaled image width inside the canvas
    pub scaled_width: u32,
    /// Scaled image height inside the canvas
    pub scaled_height: u32,
}

impl Letterbox {
    /// Fit `(width, height)` into a `target_size` square, centered
    #[must_use]
    pub fn fit(width: u32, height: u32, target_size: u32) -> Self {
        let target = target_size as f32;
        let scale = (target / width.max(1) as f32).min(target / height.max(1) as f32);

        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Self {
            scale,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Map an original pixel coordinate to the tensor coordinate covering it
    #[must_use]
    pub fn project(&self, x: u32, y: u32) -> (u32, u32) {
        let scaled_x = ((x as f32 + 0.5) * self.scale - 0.5).round().max(0.0) as u32;
        let scaled_y = ((y as f32 + 0.5) * self.scale - 0.5).round().max(0.0) as u32;
        (
            scaled_x.min(self.scaled_width - 1) + self.offset_x,
            scaled_y.min(self.scaled_height - 1) + self.offset_y,
        )
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox `image` and convert it to a normalized `1x3xNxN` tensor
    ///
    /// The alpha channel of the input is ignored.
    ///
    /// # Errors
    /// - Invalid preprocessing configuration
    pub fn preprocess(
        image: &RgbaImage,
        config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        config.validate()?;
        let target_size = config.target_size;
        let (width, height) = image.dimensions();
        let letterbox = Letterbox::fit(width, height, target_size);

        let rgb: RgbImage = RgbImage::from_fn(width, height, |x, y| {
            let p = image.get_pixel(x, y);
            Rgb([p[0], p[1], p[2]])
        });
        let resized = image::imageops::resize(
            &rgb,
            letterbox.scaled_width,
            letterbox.scaled_height,
            FilterType::Triangle,
        );

        let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb(config.padding_color));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok((Self::canvas_to_tensor(&canvas, config), letterbox))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let size = canvas.width() as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / 255.0;
                tensor[[0, channel, y as usize, x as usize]] = (value
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
            }
        }

        tensor
    }
}
