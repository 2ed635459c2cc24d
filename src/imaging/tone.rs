//! Brightness, contrast and grayscale baking.
//!
//! The per-channel stages run in a fixed order on every pixel:
//!
//! ```text
//! v1 = clamp(v  * brightness / 100)
//! v2 = clamp((v1 - 128) * contrast / 100 + 128)
//! gray (optional) = round((r2 + g2 + b2) / 3)
//! ```
//!
//! Grayscale comes last so tone is computed on the original color data and
//! only then desaturated. Alpha is never touched. Because the first two stages
//! act on each channel independently they collapse into one 256-entry lookup
//! table; rows are then processed in parallel with rayon.

use super::buffer::ImageBuffer;
use super::params::{FilterSettings, ToneLimits};
use image::RgbaImage;
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterBakeError {
    #[error("{setting} {value}% is outside the allowed {min}-{max}% range")]
    OutOfRange {
        setting: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
}

/// Contrast pivot.
const MIDPOINT: f64 = 128.0;

/// Build the brightness+contrast lookup table for one channel value.
fn tone_lut(settings: FilterSettings) -> [u8; 256] {
    let brightness = settings.brightness_percent as f64 / 100.0;
    let contrast = settings.contrast_percent as f64 / 100.0;
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let bright = (value as f64 * brightness).clamp(0.0, 255.0);
        let contrasted = ((bright - MIDPOINT) * contrast + MIDPOINT).clamp(0.0, 255.0);
        *slot = contrasted.round() as u8;
    }
    lut
}

/// Apply `settings` to every pixel, returning a new buffer of the same size.
///
/// Pure: the input is never modified and the output is byte-identical for
/// identical inputs.
pub fn apply_tone(image: &ImageBuffer, settings: FilterSettings) -> ImageBuffer {
    if settings.is_identity() {
        return image.clone();
    }

    let lut = tone_lut(settings);
    let (width, height) = image.dimensions();
    let stride = width as usize * 4;
    let mut raw = image.pixels().as_raw().clone();

    raw.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let r = lut[px[0] as usize];
            let g = lut[px[1] as usize];
            let b = lut[px[2] as usize];
            if settings.grayscale {
                let avg = ((r as u32 + g as u32 + b as u32) as f64 / 3.0).round() as u8;
                px[0] = avg;
                px[1] = avg;
                px[2] = avg;
            } else {
                px[0] = r;
                px[1] = g;
                px[2] = b;
            }
        }
    });

    let pixels = RgbaImage::from_raw(width, height, raw)
        .unwrap_or_else(|| image.pixels().clone());
    ImageBuffer::from_rgba(pixels).unwrap_or_else(|_| image.clone())
}

/// Validate `settings` against the configured limits, then apply them.
pub fn bake_tone(
    image: &ImageBuffer,
    settings: FilterSettings,
    limits: ToneLimits,
) -> Result<ImageBuffer, FilterBakeError> {
    for (setting, value) in [
        ("brightness", settings.brightness_percent),
        ("contrast", settings.contrast_percent),
    ] {
        if !limits.contains(value) {
            return Err(FilterBakeError::OutOfRange {
                setting,
                value,
                min: limits.min_percent,
                max: limits.max_percent,
            });
        }
    }
    Ok(apply_tone(image, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{noisy_image, pixel_at, solid_image};

    fn settings(brightness: u32, contrast: u32, grayscale: bool) -> FilterSettings {
        FilterSettings {
            brightness_percent: brightness,
            contrast_percent: contrast,
            grayscale,
        }
    }

    #[test]
    fn identity_settings_are_byte_identical() {
        let image = noisy_image(37, 23);
        let out = apply_tone(&image, FilterSettings::default());
        assert_eq!(out.pixels().as_raw(), image.pixels().as_raw());
    }

    #[test]
    fn identity_lut_is_identity() {
        let lut = tone_lut(FilterSettings::default());
        for (value, mapped) in lut.iter().enumerate() {
            assert_eq!(*mapped as usize, value);
        }
    }

    #[test]
    fn grayscale_equalizes_channels_and_keeps_alpha() {
        let image = noisy_image(31, 17);
        let out = apply_tone(&image, settings(120, 90, true));
        for (before, after) in image.pixels().pixels().zip(out.pixels().pixels()) {
            let [r, g, b, a] = after.0;
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert_eq!(a, before.0[3]);
        }
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let image = solid_image(2, 2, [100, 200, 0, 255]);
        let out = apply_tone(&image, settings(150, 100, false));
        // 100*1.5 = 150, 200*1.5 = 300 → 255
        assert_eq!(pixel_at(&out, 0, 0), [150, 255, 0, 255]);
    }

    #[test]
    fn contrast_pivots_around_128() {
        let image = solid_image(1, 1, [128, 178, 78, 200]);
        let out = apply_tone(&image, settings(100, 150, false));
        // 178 → 128 + 50*1.5 = 203; 78 → 128 - 50*1.5 = 53
        assert_eq!(pixel_at(&out, 0, 0), [128, 203, 53, 200]);
    }

    #[test]
    fn low_contrast_flattens_toward_midpoint() {
        let image = solid_image(1, 1, [0, 255, 128, 255]);
        let out = apply_tone(&image, settings(100, 50, false));
        assert_eq!(pixel_at(&out, 0, 0), [64, 192, 128, 255]);
    }

    #[test]
    fn grayscale_runs_after_brightness_and_contrast() {
        // Brightness clamps red before averaging; averaging first would give 100.
        let image = solid_image(1, 1, [200, 100, 0, 255]);
        let out = apply_tone(&image, settings(150, 100, true));
        // (255 + 150 + 0) / 3 = 135
        assert_eq!(pixel_at(&out, 0, 0), [135, 135, 135, 255]);
    }

    #[test]
    fn apply_tone_is_deterministic_and_pure() {
        let image = noisy_image(64, 48);
        let before = image.clone();
        let a = apply_tone(&image, settings(80, 130, false));
        let b = apply_tone(&image, settings(80, 130, false));
        assert_eq!(a, b);
        assert_eq!(image, before);
        assert_eq!(a.dimensions(), image.dimensions());
    }

    #[test]
    fn bake_rejects_out_of_range_settings() {
        let image = solid_image(1, 1, [1, 2, 3, 255]);
        let err = bake_tone(&image, settings(151, 100, false), ToneLimits::default()).unwrap_err();
        assert_eq!(
            err,
            FilterBakeError::OutOfRange {
                setting: "brightness",
                value: 151,
                min: 50,
                max: 150
            }
        );
        assert!(bake_tone(&image, settings(100, 49, false), ToneLimits::default()).is_err());
    }

    #[test]
    fn bake_accepts_boundaries() {
        let image = solid_image(1, 1, [1, 2, 3, 255]);
        assert!(bake_tone(&image, settings(50, 150, true), ToneLimits::default()).is_ok());
    }
}
