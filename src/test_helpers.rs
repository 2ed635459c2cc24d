//! Shared test utilities for the photo-sheet test suite.
//!
//! Synthetic image builders so tests never depend on fixture files, plus a
//! couple of pixel-level assertions used across the imaging tests.

use crate::imaging::ImageBuffer;
use image::{Rgba, RgbaImage};

// =========================================================================
// Synthetic images
// =========================================================================

/// Opaque image whose red channel encodes x and green channel encodes y.
///
/// Every pixel in a 256x256 window is unique, which makes it easy to check
/// where an extracted pixel came from.
pub fn gradient_image(width: u32, height: u32) -> ImageBuffer {
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    ImageBuffer::from_rgba(pixels).unwrap()
}

/// Image filled with a single color.
pub fn solid_image(width: u32, height: u32, color: [u8; 4]) -> ImageBuffer {
    ImageBuffer::from_rgba(RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
}

/// Image with a different color in each quadrant (TL red, TR green, BL blue, BR white).
pub fn quadrant_image(width: u32, height: u32) -> ImageBuffer {
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        let right = x >= width / 2;
        let bottom = y >= height / 2;
        match (right, bottom) {
            (false, false) => Rgba([255, 0, 0, 255]),
            (true, false) => Rgba([0, 255, 0, 255]),
            (false, true) => Rgba([0, 0, 255, 255]),
            (true, true) => Rgba([255, 255, 255, 255]),
        }
    });
    ImageBuffer::from_rgba(pixels).unwrap()
}

/// Image with varied colors and a varied alpha channel.
pub fn noisy_image(width: u32, height: u32) -> ImageBuffer {
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        let seed = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503));
        Rgba([
            (seed % 251) as u8,
            ((seed >> 8) % 253) as u8,
            ((seed >> 16) % 255) as u8,
            (64 + (x + y) % 192) as u8,
        ])
    });
    ImageBuffer::from_rgba(pixels).unwrap()
}

// =========================================================================
// Assertions
// =========================================================================

/// Pixel at `(x, y)` as a plain array. Panics with coordinates on miss.
pub fn pixel_at(image: &ImageBuffer, x: u32, y: u32) -> [u8; 4] {
    assert!(
        x < image.width() && y < image.height(),
        "pixel ({x}, {y}) outside {}x{} image",
        image.width(),
        image.height()
    );
    image.pixels().get_pixel(x, y).0
}
