//! Output format selection and serialization
//!
//! This module keeps the format policy out of the pipeline: the container is
//! derived from the channel layout of the final image, never chosen freely.

use crate::{
    config::OutputFormat,
    error::{PipelineError, Result},
    types::EncodedImage,
};
use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    DynamicImage, ImageEncoder,
};
use std::io::Cursor;

/// Service for serializing the final raster
pub struct OutputEncoder;

impl OutputEncoder {
    /// Select the container format for an image
    ///
    /// RGBA images go to lossless PNG so transparency survives; opaque RGB
    /// images go to JPEG.
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_pipeline::{services::OutputEncoder, OutputFormat};
    /// use image::{DynamicImage, RgbImage, RgbaImage};
    ///
    /// let rgba = DynamicImage::ImageRgba8(RgbaImage::new(1, 1));
    /// let rgb = DynamicImage::ImageRgb8(RgbImage::new(1, 1));
    /// assert_eq!(OutputEncoder::select_format(&rgba), OutputFormat::Png);
    /// assert_eq!(OutputEncoder::select_format(&rgb), OutputFormat::Jpeg);
    /// ```
    #[must_use]
    pub fn select_format(image: &DynamicImage) -> OutputFormat {
        if image.color().has_alpha() {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }

    /// Suggested download name, e.g. `processed_background_removed.png`
    #[must_use]
    pub fn file_name(stem: &str, format: OutputFormat) -> String {
        format!("{}.{}", stem, format.extension())
    }

    /// Serialize `image` into the format bound to its channel layout
    ///
    /// # Arguments
    /// * `image` - Final image from the compositor (RGBA or RGB)
    /// * `jpeg_quality` - Quality used when the JPEG path is taken
    /// * `stem` - File name stem for the suggested download name
    ///
    /// # Errors
    /// - `EncodeFailed` if the codec rejects the buffer
    pub fn encode(image: &DynamicImage, jpeg_quality: u8, stem: &str) -> Result<EncodedImage> {
        let format = Self::select_format(image);
        let mut buffer = Cursor::new(Vec::new());

        match format {
            OutputFormat::Png => {
                let rgba = image.to_rgba8();
                PngEncoder::new(&mut buffer)
                    .write_image(
                        rgba.as_raw(),
                        rgba.width(),
                        rgba.height(),
                        image::ExtendedColorType::Rgba8,
                    )
                    .map_err(PipelineError::encode)?;
            },
            OutputFormat::Jpeg => {
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, jpeg_quality)
                    .write_image(
                        rgb.as_raw(),
                        rgb.width(),
                        rgb.height(),
                        image::ExtendedColorType::Rgb8,
                    )
                    .map_err(PipelineError::encode)?;
            },
        }

        Ok(EncodedImage {
            bytes: buffer.into_inner(),
            format,
            mime_type: format.mime_type().to_string(),
            file_name: Self::file_name(stem, format),
        })
    }
}
