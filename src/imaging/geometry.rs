//! Rotation, flip and crop math.
//!
//! Two coordinate systems are in play and are kept apart on purpose:
//!
//! - **Source space**: pixel coordinates of the uploaded image.
//! - **Rotated space**: pixel coordinates inside the axis-aligned bounding box
//!   of the source after rotation, with the rotated (and flipped) image centered
//!   in it. [`CropRegion`]s always live in rotated space.
//!
//! [`rotated_bounding_box`] sizes rotated space; [`extract_cropped_region`]
//! maps every output pixel back through the inverse transform into source
//! space and samples it. Pixels that land outside the source are transparent.

use super::buffer::ImageBuffer;
use super::params::{CropRegion, Flip};
use image::{Rgba, RgbaImage};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Crop region must have a positive size (got {width}x{height})")]
    EmptyRegion { width: u32, height: u32 },
    #[error(
        "Crop region {region} lies outside the {bbox_width}x{bbox_height} rotated image"
    )]
    OutOfBounds {
        region: CropRegion,
        bbox_width: u32,
        bbox_height: u32,
    },
    #[error("Aspect ratio must be a positive number (got {0})")]
    InvalidAspect(f64),
}

/// Convert degrees to radians.
pub fn degrees_to_radians(degrees: f64) -> f64 {
    degrees * PI / 180.0
}

/// Size of the axis-aligned box enclosing a rotated rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Whole-pixel size of the rendered rotated image. Partial pixels at the
    /// right and bottom edges are dropped.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width.floor() as u32, self.height.floor() as u32)
    }
}

/// `(sin, cos)` of an angle in degrees, exact at multiples of 90°.
fn sin_cos_degrees(rotation_degrees: f64) -> (f64, f64) {
    let degrees = rotation_degrees.rem_euclid(360.0);
    if degrees == 0.0 {
        (0.0, 1.0)
    } else if degrees == 90.0 {
        (1.0, 0.0)
    } else if degrees == 180.0 {
        (0.0, -1.0)
    } else if degrees == 270.0 {
        (-1.0, 0.0)
    } else {
        degrees_to_radians(degrees).sin_cos()
    }
}

fn is_right_angle(rotation_degrees: f64) -> bool {
    rotation_degrees.rem_euclid(90.0) == 0.0
}

/// Bounding box of a `width` x `height` rectangle rotated by `rotation_degrees`.
///
/// Uses `|cos|·w + |sin|·h` by `|sin|·w + |cos|·h`.
///
/// # Examples
/// ```
/// # use photo_sheet::imaging::rotated_bounding_box;
/// let quarter = rotated_bounding_box(400.0, 300.0, 90.0);
/// assert_eq!((quarter.width, quarter.height), (300.0, 400.0));
/// ```
pub fn rotated_bounding_box(width: f64, height: f64, rotation_degrees: f64) -> BoundingBox {
    let (sin, cos) = sin_cos_degrees(rotation_degrees);
    let (sin, cos) = (sin.abs(), cos.abs());
    BoundingBox {
        width: cos * width + sin * height,
        height: sin * width + cos * height,
    }
}

/// Render `image` rotated and flipped into its bounding box and cut out `crop`.
///
/// The render is equivalent to: translate to the box center, rotate, scale by
/// `(-1, 1)` per flipped axis, translate back by half the source size, draw.
/// The result is exactly `crop.width` x `crop.height`.
pub fn extract_cropped_region(
    image: &ImageBuffer,
    crop: CropRegion,
    rotation_degrees: f64,
    flip: Flip,
) -> Result<ImageBuffer, GeometryError> {
    if crop.width == 0 || crop.height == 0 {
        return Err(GeometryError::EmptyRegion {
            width: crop.width,
            height: crop.height,
        });
    }

    let (src_w, src_h) = image.dimensions();
    let bbox = rotated_bounding_box(src_w as f64, src_h as f64, rotation_degrees);
    let (bbox_w, bbox_h) = bbox.pixel_size();
    if crop.right() > bbox_w || crop.bottom() > bbox_h {
        return Err(GeometryError::OutOfBounds {
            region: crop,
            bbox_width: bbox_w,
            bbox_height: bbox_h,
        });
    }

    log::debug!(
        "extracting {crop} from {src_w}x{src_h} rotated {rotation_degrees}° (box {bbox_w}x{bbox_h})"
    );

    let (sin, cos) = sin_cos_degrees(rotation_degrees);
    let (flip_x, flip_y) = flip.scale();
    let nearest = is_right_angle(rotation_degrees);
    // Rotation center is the real-valued box center, not the truncated canvas
    let half_box = (bbox.width / 2.0, bbox.height / 2.0);
    let half_src = (src_w as f64 / 2.0, src_h as f64 / 2.0);
    let source = image.pixels();

    let pixels = RgbaImage::from_fn(crop.width, crop.height, |ox, oy| {
        // Pixel center in rotated space, relative to the box center
        let px = (crop.x + ox) as f64 + 0.5 - half_box.0;
        let py = (crop.y + oy) as f64 + 0.5 - half_box.1;
        // Inverse rotation, inverse flip, then back to source origin
        let rx = cos * px + sin * py;
        let ry = -sin * px + cos * py;
        let u = rx * flip_x + half_src.0;
        let v = ry * flip_y + half_src.1;
        sample(source, u, v, nearest)
    });

    // from_rgba only fails on empty images, ruled out above
    ImageBuffer::from_rgba(pixels).map_err(|_| GeometryError::EmptyRegion {
        width: crop.width,
        height: crop.height,
    })
}

/// Sample the source at continuous coordinates `(u, v)` (pixel `i` spans `[i, i+1)`).
fn sample(source: &RgbaImage, u: f64, v: f64, nearest: bool) -> Rgba<u8> {
    let (w, h) = source.dimensions();
    if u < 0.0 || v < 0.0 || u >= w as f64 || v >= h as f64 {
        return Rgba([0, 0, 0, 0]);
    }
    if nearest {
        return *source.get_pixel(u as u32, v as u32);
    }

    let fx = u - 0.5;
    let fy = v - 0.5;
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let clamp_x = |x: f64| x.clamp(0.0, (w - 1) as f64) as u32;
    let clamp_y = |y: f64| y.clamp(0.0, (h - 1) as f64) as u32;
    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let p00 = source.get_pixel(xa, ya).0;
    let p10 = source.get_pixel(xb, ya).0;
    let p01 = source.get_pixel(xa, yb).0;
    let p11 = source.get_pixel(xb, yb).0;

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - tx) + p10[c] as f64 * tx;
        let bottom = p01[c] as f64 * (1.0 - tx) + p11[c] as f64 * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Largest `aspect`-shaped region (width / height) inside `bbox`, shrunk by
/// `zoom` and centered.
///
/// This is the region a fixed-aspect crop frame covers before the user drags
/// it anywhere.
pub fn fit_crop_region(
    bbox: (u32, u32),
    aspect: f64,
    zoom: f64,
) -> Result<CropRegion, GeometryError> {
    if !(aspect.is_finite() && aspect > 0.0) {
        return Err(GeometryError::InvalidAspect(aspect));
    }
    let (bbox_w, bbox_h) = bbox;
    if bbox_w == 0 || bbox_h == 0 {
        return Err(GeometryError::EmptyRegion {
            width: bbox_w,
            height: bbox_h,
        });
    }
    let zoom = if zoom.is_finite() { zoom.max(1.0) } else { 1.0 };

    let (w, h) = (bbox_w as f64, bbox_h as f64);
    let (fit_w, fit_h) = if w / h > aspect {
        // Box is wider than the frame: height is the limit
        (h * aspect, h)
    } else {
        (w, w / aspect)
    };

    let width = ((fit_w / zoom).round() as u32).clamp(1, bbox_w);
    let height = ((fit_h / zoom).round() as u32).clamp(1, bbox_h);
    Ok(CropRegion::new(
        (bbox_w - width) / 2,
        (bbox_h - height) / 2,
        width,
        height,
    ))
}
