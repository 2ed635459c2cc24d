//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! values the interactive widgets commit once the user finalizes an
//! action, and the interface between the [`pipeline`](crate::pipeline) and the
//! pixel work in [`geometry`](super::geometry) and [`tone`](super::tone).
//!
//! ## Types
//!
//! - [`CropRegion`]: Pixel rectangle in rotated-bounding-box coordinates.
//! - [`Flip`]: Mirror flags applied around the image center.
//! - [`Transform`]: Rotation, flip, and zoom the crop region was computed under.
//! - [`FilterSettings`]: Brightness/contrast percentages and the grayscale switch.
//! - [`ToneLimits`]: Allowed percentage range for brightness and contrast.
//! - [`Quality`]: Lossy encoding quality (1–100, default 95). Clamped on construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Rectangle selecting the visible area of the photo.
///
/// Coordinates are relative to the rotated bounding box of the source image
/// (see [`rotated_bounding_box`](super::geometry::rotated_bounding_box)), not
/// to the source image itself. At rotation 0 the two coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge. Saturates instead of wrapping.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge. Saturates instead of wrapping.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

impl FromStr for CropRegion {
    type Err = String;

    /// Parse `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!("expected x,y,width,height but got '{s}'"));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| format!("'{part}' is not a non-negative integer"))?;
        }
        let [x, y, width, height] = values;
        Ok(Self::new(x, y, width, height))
    }
}

/// Mirror flags. Each set axis is scaled by -1 around the image center.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flip {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Flip {
    /// Scale factors `(sx, sy)` for the render transform.
    pub fn scale(self) -> (f64, f64) {
        (
            if self.horizontal { -1.0 } else { 1.0 },
            if self.vertical { -1.0 } else { 1.0 },
        )
    }
}

/// Geometric parameters a [`CropRegion`] was computed under.
///
/// Only meaningful together with a crop region computed at the same rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Rotation in degrees, normalized into `[0, 360)`.
    pub rotation_degrees: f64,
    pub flip: Flip,
    /// Crop-widget zoom, `>= 1`.
    pub zoom: f64,
}

impl Transform {
    /// Build a transform, normalizing the angle and flooring zoom at 1.
    pub fn new(rotation_degrees: f64, flip: Flip, zoom: f64) -> Self {
        let rotation = if rotation_degrees.is_finite() {
            rotation_degrees.rem_euclid(360.0)
        } else {
            0.0
        };
        let zoom = if zoom.is_finite() { zoom.max(1.0) } else { 1.0 };
        Self {
            rotation_degrees: rotation,
            flip,
            zoom,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            rotation_degrees: 0.0,
            flip: Flip::default(),
            zoom: 1.0,
        }
    }
}

/// Photometric adjustments baked into the final photo.
///
/// Percentages are 100-based: `100` leaves the channel untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub brightness_percent: u32,
    pub contrast_percent: u32,
    pub grayscale: bool,
}

impl FilterSettings {
    /// True when applying these settings would not change any pixel.
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            brightness_percent: 100,
            contrast_percent: 100,
            grayscale: false,
        }
    }
}

/// Inclusive percentage range accepted for brightness and contrast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToneLimits {
    pub min_percent: u32,
    pub max_percent: u32,
}

impl ToneLimits {
    pub fn contains(&self, percent: u32) -> bool {
        (self.min_percent..=self.max_percent).contains(&percent)
    }
}

impl Default for ToneLimits {
    fn default() -> Self {
        Self {
            min_percent: 50,
            max_percent: 150,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_95() {
        assert_eq!(Quality::default().value(), 95);
    }

    #[test]
    fn crop_region_parses_comma_list() {
        let region: CropRegion = "100, 100,500,600".parse().unwrap();
        assert_eq!(region, CropRegion::new(100, 100, 500, 600));
        assert_eq!(region.right(), 600);
        assert_eq!(region.bottom(), 700);
    }

    #[test]
    fn crop_region_rejects_wrong_arity_and_negatives() {
        assert!("1,2,3".parse::<CropRegion>().is_err());
        assert!("1,2,3,4,5".parse::<CropRegion>().is_err());
        assert!("-1,0,10,10".parse::<CropRegion>().is_err());
    }

    #[test]
    fn crop_region_display_roundtrips() {
        let region = CropRegion::new(3, 4, 5, 6);
        assert_eq!(region.to_string().parse::<CropRegion>().unwrap(), region);
    }

    #[test]
    fn transform_normalizes_rotation_and_zoom() {
        let t = Transform::new(-90.0, Flip::default(), 0.5);
        assert_eq!(t.rotation_degrees, 270.0);
        assert_eq!(t.zoom, 1.0);

        let t = Transform::new(720.0, Flip::default(), 2.0);
        assert_eq!(t.rotation_degrees, 0.0);
        assert_eq!(t.zoom, 2.0);
    }

    #[test]
    fn flip_scale_factors() {
        assert_eq!(Flip::default().scale(), (1.0, 1.0));
        let both = Flip {
            horizontal: true,
            vertical: true,
        };
        assert_eq!(both.scale(), (-1.0, -1.0));
    }

    #[test]
    fn default_filter_settings_are_identity() {
        let s = FilterSettings::default();
        assert_eq!(s.brightness_percent, 100);
        assert_eq!(s.contrast_percent, 100);
        assert!(!s.grayscale);
        assert!(s.is_identity());
    }

    #[test]
    fn tone_limits_are_inclusive() {
        let limits = ToneLimits::default();
        assert!(limits.contains(50));
        assert!(limits.contains(150));
        assert!(!limits.contains(49));
        assert!(!limits.contains(151));
    }
}
