//! Alpha-aware compositing onto a solid fill color

use crate::types::FillColor;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

/// Flattens transparent results onto an opaque fill
pub struct Compositor;

impl Compositor {
    /// Composite `image` over `fill`, or pass it through when no fill is given
    ///
    /// Without a fill the result is a copy of the RGBA image. With a fill the
    /// result is an opaque RGB image of the same dimensions; the alpha channel
    /// acts as a linear mask and is then discarded. `image` is never modified.
    #[must_use]
    pub fn apply(image: &RgbaImage, fill: Option<FillColor>) -> DynamicImage {
        match fill {
            None => DynamicImage::ImageRgba8(image.clone()),
            Some(color) => DynamicImage::ImageRgb8(Self::flatten(image, color)),
        }
    }

    /// Blend every pixel of `image` over `fill` into a new RGB image
    #[must_use]
    pub fn flatten(image: &RgbaImage, fill: FillColor) -> RgbImage {
        let (width, height) = image.dimensions();
        let fill = [fill.r, fill.g, fill.b];

        RgbImage::from_fn(width, height, |x, y| {
            let pixel = image.get_pixel(x, y);
            let alpha = pixel[3];
            Rgb([
                Self::blend_channel(pixel[0], fill[0], alpha),
                Self::blend_channel(pixel[1], fill[1], alpha),
                Self::blend_channel(pixel[2], fill[2], alpha),
            ])
        })
    }

    /// Linear interpolation between `fill` (alpha 0) and `source` (alpha 255)
    #[must_use]
    pub fn blend_channel(source: u8, fill: u8, alpha: u8) -> u8 {
        let alpha = u32::from(alpha);
        let mixed = u32::from(source) * alpha + u32::from(fill) * (255 - alpha);
        // Rounded division; never exceeds 255 because mixed <= 255 * 255
        ((mixed + 127) / 255) as u8
    }
}
