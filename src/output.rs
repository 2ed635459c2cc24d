//! CLI output formatting for all pipeline stages.
//!
//! # Output Format
//!
//! ## Crop
//!
//! ```text
//! Source 1000x1200
//!     Rotation: 0°
//!     Region: 100,100,500,600
//! Photo 500x600
//! ```
//!
//! ## Layout
//!
//! ```text
//! 6 photos of 25x30mm on 210x297mm paper (6 x 7 per page)
//! 001 Page (6 photos)
//!     001 at 15.0, 15.0mm
//!     002 at 45.0, 15.0mm
//! ```
//!
//! ## Build
//!
//! ```text
//! Wrote sheet.pdf: 1 page, 6 photos
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::background::BackgroundError;
use crate::document::PrintDocument;
use crate::imaging::{CropRegion, FilterSettings, Transform};
use crate::layout::LayoutPlan;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page` / `2 pages`.
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Millimeter value without a trailing `.0` for whole numbers.
fn mm(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Crop
// ============================================================================

/// Format the crop stage: source size, transform, region, result size.
pub fn format_crop_output(
    source: (u32, u32),
    region: CropRegion,
    transform: Transform,
    result: (u32, u32),
) -> Vec<String> {
    let mut lines = vec![format!("Source {}x{}", source.0, source.1)];
    lines.push(format!("{}Rotation: {}°", indent(1), transform.rotation_degrees));
    let flips: Vec<&str> = [
        (transform.flip.horizontal, "horizontal"),
        (transform.flip.vertical, "vertical"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect();
    if !flips.is_empty() {
        lines.push(format!("{}Flip: {}", indent(1), flips.join(", ")));
    }
    if transform.zoom > 1.0 {
        lines.push(format!("{}Zoom: {}x", indent(1), transform.zoom));
    }
    lines.push(format!("{}Region: {}", indent(1), region));
    lines.push(format!("Photo {}x{}", result.0, result.1));
    lines
}

pub fn print_crop_output(
    source: (u32, u32),
    region: CropRegion,
    transform: Transform,
    result: (u32, u32),
) {
    print_lines(format_crop_output(source, region, transform, result));
}

// ============================================================================
// Edit
// ============================================================================

/// Format the tone settings that were baked.
pub fn format_tone_output(settings: FilterSettings) -> Vec<String> {
    if settings.is_identity() {
        return vec!["Tone: unchanged".to_string()];
    }
    let mut line = format!(
        "Tone: brightness {}%, contrast {}%",
        settings.brightness_percent, settings.contrast_percent
    );
    if settings.grayscale {
        line.push_str(", grayscale");
    }
    vec![line]
}

pub fn print_tone_output(settings: FilterSettings) {
    print_lines(format_tone_output(settings));
}

/// Format a failed remote replacement with the manual fallback hint.
pub fn format_background_failure(error: &BackgroundError) -> Vec<String> {
    vec![
        format!("Background replacement failed: {error}"),
        format!("{}The photo was left unchanged.", indent(1)),
        format!(
            "{}Erase the background by hand instead: --erase x,y,radius [--erase-fill white]",
            indent(1)
        ),
    ]
}

pub fn print_background_failure(error: &BackgroundError) {
    print_lines(format_background_failure(error));
}

// ============================================================================
// Layout
// ============================================================================

/// Format a layout plan: summary line, then every page with its placements.
pub fn format_layout_plan(plan: &LayoutPlan) -> Vec<String> {
    let (columns, rows) = plan.grid_per_page();
    let mut lines = vec![format!(
        "{} of {}x{}mm on {}x{}mm paper ({} x {} per page)",
        plural(plan.tile_count(), "photo"),
        mm(plan.photo.width_mm),
        mm(plan.photo.height_mm),
        mm(plan.page.width_mm),
        mm(plan.page.height_mm),
        columns,
        rows
    )];

    for (page_idx, page) in plan.pages.iter().enumerate() {
        lines.push(format!(
            "{} Page ({})",
            format_index(page_idx + 1),
            plural(page.placements.len(), "photo")
        ));
        for (idx, placement) in page.placements.iter().enumerate() {
            lines.push(format!(
                "{}{} at {:.1}, {:.1}mm",
                indent(1),
                format_index(idx + 1),
                placement.x_mm,
                placement.y_mm
            ));
        }
    }
    lines
}

pub fn print_layout_plan(plan: &LayoutPlan) {
    print_lines(format_layout_plan(plan));
}

// ============================================================================
// Build
// ============================================================================

/// Format the final line after the document was written.
pub fn format_build_summary(document: &PrintDocument, output: &Path) -> Vec<String> {
    vec![format!(
        "Wrote {}: {}, {}",
        output.display(),
        plural(document.page_count, "page"),
        plural(document.tile_count, "photo")
    )]
}

pub fn print_build_summary(document: &PrintDocument, output: &Path) {
    print_lines(format_build_summary(document, output));
}
