//! Aspect-preserving downscaling of the working image

use image::{imageops::FilterType, RgbaImage};
use tracing::debug;

/// Bounds image dimensions while preserving aspect ratio
pub struct ImageResizer;

impl ImageResizer {
    /// Compute the bounded dimensions for `(width, height)`
    ///
    /// Both sides are scaled by `max_dim / max(width, height)` and floored.
    /// Integer arithmetic keeps the larger side exactly `max_dim`; a side that
    /// would floor to zero is kept at one pixel.
    #[must_use]
    pub fn target_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= max_dim {
            return (width, height);
        }

        let scale = |side: u32| -> u32 {
            let scaled = u64::from(side) * u64::from(max_dim) / u64::from(longest);
            (scaled as u32).max(1)
        };
        (scale(width), scale(height))
    }

    /// Downscale `image` so that neither side exceeds `max_dim`
    ///
    /// Images already within the bound are returned as-is, without resampling.
    /// Downscaling uses a Lanczos3 filter.
    #[must_use]
    pub fn fit_within(image: RgbaImage, max_dim: u32) -> RgbaImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = Self::target_dimensions(width, height, max_dim);
        if (new_width, new_height) == (width, height) {
            return image;
        }

        debug!(
            from = %format!("{}x{}", width, height),
            to = %format!("{}x{}", new_width, new_height),
            "Downscaling working image"
        );
        image::imageops::resize(&image, new_width, new_height, FilterType::Lanczos3)
    }
}
