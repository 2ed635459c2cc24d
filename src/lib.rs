//! # Photo Sheet
//!
//! Turns one photo of a child into a printable sheet of identical ID photos:
//! crop it to the photo's fixed aspect ratio, clean up the background, adjust
//! tone, and tile copies across as many pages as needed.
//!
//! # Architecture: Four-Stage Pipeline
//!
//! A session moves one photo strictly forward through four stages, each
//! replacing the current image buffer with a new one:
//!
//! ```text
//! 1. Upload   file        →  raw image       (JPEG/PNG decode)
//! 2. Crop     raw image   →  working image   (rotate + flip + extract region)
//! 3. Edit     working     →  finalized       (background removal, tone bake)
//! 4. Print    finalized   →  sheet.pdf       (layout + pagination + render)
//! ```
//!
//! Every pixel operation is a pure function from buffer to buffer, so each one
//! is unit-tested on synthetic images without touching the filesystem. The
//! [`pipeline`] holds the only mutable state and owns the stage transitions.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Image buffer, rotation/flip/crop geometry, brightness/contrast/grayscale |
//! | [`background`] | Manual erase strokes and remote background replacement |
//! | [`layout`] | Row-major placement of photo copies across pages |
//! | [`document`] | PDF rendering of a layout plan with cut guides |
//! | [`pipeline`] | Session state machine: Upload → Crop → Edit → Print |
//! | [`config`] | `photo-sheet.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting for each stage |
//!
//! # Design Decisions
//!
//! ## Crop Coordinates Live in Rotated Space
//!
//! A crop region is expressed in the coordinates of the rotated image's
//! bounding box, not the source image. Rotation, flip and crop then compose
//! into a single inverse-mapped pass, and callers never translate coordinates
//! between the two spaces by hand.
//!
//! ## Bake Order: Tone, Then Grayscale
//!
//! Brightness and contrast are computed on the original color data and only
//! then desaturated. Reversing the order changes the result wherever a channel
//! clips.
//!
//! ## Failures That Never Block Printing
//!
//! A failed remote background call leaves the photo as it was and points the
//! user at the manual eraser. A failed tone bake prints the unfiltered photo.
//! Only invalid geometry and invalid configuration stop the pipeline.
//!
//! ## Configuration Over Constants
//!
//! Photo size, paper, margins, copy limits, tone limits and the background
//! service all come from `photo-sheet.toml`, so another photo standard is a
//! config file away. See [`config`].

pub mod background;
pub mod config;
pub mod document;
pub mod imaging;
pub mod layout;
pub mod output;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_helpers;
