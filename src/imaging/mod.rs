//! Pixel-level image work in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode / encode** | `image` (JPEG, PNG) |
//! | **Rotate + flip + crop** | inverse-mapped sampling in [`geometry`] |
//! | **Brightness / contrast / grayscale** | lookup table + rayon rows in [`tone`] |
//!
//! The module is split into:
//! - **Buffer**: the owned RGBA [`ImageBuffer`] every stage passes along
//! - **Parameters**: values committed by the interactive widgets
//! - **Geometry**: bounding-box math and region extraction
//! - **Tone**: photometric adjustments

mod buffer;
pub mod geometry;
mod params;
pub mod tone;

pub use buffer::{BufferError, ImageBuffer};
pub use geometry::{
    BoundingBox, GeometryError, degrees_to_radians, extract_cropped_region, fit_crop_region,
    rotated_bounding_box,
};
pub use params::{CropRegion, FilterSettings, Flip, Quality, ToneLimits, Transform};
pub use tone::{FilterBakeError, apply_tone, bake_tone};
