//! Sheet layout: where each copy of the photo goes on which page.
//!
//! Placement is a row-major cursor walk. Starting at `(margin, margin)`:
//!
//! 1. If a photo at the cursor would cross the bottom margin, start a new
//!    page and reset the cursor to `(margin, margin)`.
//! 2. Emit a placement at the cursor.
//! 3. Advance `x` by photo width + gap; if the *next* photo would cross the
//!    right margin, wrap to `x = margin` and advance `y` by photo height + gap.
//!
//! The page break is decided before placing, never after, so a count that
//! exactly fills the last row or page does not produce a trailing blank page.
//!
//! All measurements are millimeters with the origin at the page's top-left
//! corner, matching how the sheet is read. The PDF renderer flips to its own
//! bottom-left origin.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for millimeter comparisons.
const EPSILON_MM: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("Photo count {count} is outside the allowed {min}-{max} range")]
    InvalidCount { count: u32, min: u32, max: u32 },
    #[error("Invalid page geometry: {0}")]
    InvalidPage(String),
    #[error(
        "A {photo_width}x{photo_height}mm photo does not fit the {area_width}x{area_height}mm printable area"
    )]
    PhotoDoesNotFit {
        photo_width: f64,
        photo_height: f64,
        area_width: f64,
        area_height: f64,
    },
}

/// Physical size of one printed photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhotoSize {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PhotoSize {
    pub fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            width_mm,
            height_mm,
        }
    }

    /// Width / height, the ratio the crop frame is locked to.
    pub fn aspect_ratio(&self) -> f64 {
        self.width_mm / self.height_mm
    }
}

impl Default for PhotoSize {
    /// Child ID photo: 25 x 30 mm.
    fn default() -> Self {
        Self::new(25.0, 30.0)
    }
}

/// Paper geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PageSpec {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin_mm: f64,
    pub gap_mm: f64,
}

impl PageSpec {
    /// A4 portrait with 15 mm margins and 5 mm gaps.
    pub fn a4() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 15.0,
            gap_mm: 5.0,
        }
    }

    pub fn printable_width(&self) -> f64 {
        self.width_mm - 2.0 * self.margin_mm
    }

    pub fn printable_height(&self) -> f64 {
        self.height_mm - 2.0 * self.margin_mm
    }

    /// Check the page is well formed and `photo` fits inside its margins.
    pub fn validate_for(&self, photo: PhotoSize) -> Result<(), LayoutError> {
        let all = [
            self.width_mm,
            self.height_mm,
            self.margin_mm,
            self.gap_mm,
            photo.width_mm,
            photo.height_mm,
        ];
        if all.iter().any(|v| !v.is_finite()) {
            return Err(LayoutError::InvalidPage(
                "all dimensions must be finite numbers".into(),
            ));
        }
        if self.width_mm <= 0.0 || self.height_mm <= 0.0 {
            return Err(LayoutError::InvalidPage(
                "page width and height must be positive".into(),
            ));
        }
        if self.margin_mm < 0.0 || self.gap_mm < 0.0 {
            return Err(LayoutError::InvalidPage(
                "margin and gap must not be negative".into(),
            ));
        }
        if photo.width_mm <= 0.0 || photo.height_mm <= 0.0 {
            return Err(LayoutError::InvalidPage(
                "photo width and height must be positive".into(),
            ));
        }
        if photo.width_mm > self.printable_width() + EPSILON_MM
            || photo.height_mm > self.printable_height() + EPSILON_MM
        {
            return Err(LayoutError::PhotoDoesNotFit {
                photo_width: photo.width_mm,
                photo_height: photo.height_mm,
                area_width: self.printable_width(),
                area_height: self.printable_height(),
            });
        }
        Ok(())
    }
}

impl Default for PageSpec {
    fn default() -> Self {
        Self::a4()
    }
}

/// Inclusive range of photo counts the user may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoCountRange {
    pub min: u32,
    pub max: u32,
}

impl PhotoCountRange {
    pub fn check(&self, count: u32) -> Result<u32, LayoutError> {
        if count == 0 || count < self.min || count > self.max {
            return Err(LayoutError::InvalidCount {
                count,
                min: self.min,
                max: self.max,
            });
        }
        Ok(count)
    }
}

impl Default for PhotoCountRange {
    fn default() -> Self {
        Self { min: 1, max: 30 }
    }
}

/// Top-left corner of one photo, in millimeters from the page's top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x_mm: f64,
    pub y_mm: f64,
}

/// One sheet of paper and the photos placed on it, in placement order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutPage {
    pub placements: Vec<Placement>,
}

/// Every page of the sheet, plus the geometry it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPlan {
    pub photo: PhotoSize,
    pub page: PageSpec,
    pub pages: Vec<LayoutPage>,
}

impl LayoutPlan {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn tile_count(&self) -> usize {
        self.pages.iter().map(|p| p.placements.len()).sum()
    }

    /// `(columns, rows)` of a full page.
    pub fn grid_per_page(&self) -> (usize, usize) {
        let fit = |space: f64, size: f64| -> usize {
            if size > space + EPSILON_MM {
                0
            } else {
                1 + ((space - size) / (size + self.page.gap_mm) + EPSILON_MM).floor() as usize
            }
        };
        (
            fit(self.page.printable_width(), self.photo.width_mm),
            fit(self.page.printable_height(), self.photo.height_mm),
        )
    }

    pub fn capacity_per_page(&self) -> usize {
        let (columns, rows) = self.grid_per_page();
        columns * rows
    }
}

/// Place `count` copies of `photo` across as many `page`s as needed.
///
/// A count of zero yields a plan with zero pages. The count range itself is
/// enforced by [`PhotoCountRange::check`] before calling this.
pub fn compute_layout(
    count: u32,
    photo: PhotoSize,
    page: PageSpec,
) -> Result<LayoutPlan, LayoutError> {
    page.validate_for(photo)?;

    let right_limit = page.width_mm - page.margin_mm + EPSILON_MM;
    let bottom_limit = page.height_mm - page.margin_mm + EPSILON_MM;

    let mut pages: Vec<LayoutPage> = Vec::new();
    let mut current = LayoutPage::default();
    let (mut x, mut y) = (page.margin_mm, page.margin_mm);

    for _ in 0..count {
        if y + photo.height_mm > bottom_limit {
            pages.push(std::mem::take(&mut current));
            x = page.margin_mm;
            y = page.margin_mm;
        }

        current.placements.push(Placement { x_mm: x, y_mm: y });

        x += photo.width_mm + page.gap_mm;
        if x + photo.width_mm > right_limit {
            x = page.margin_mm;
            y += photo.height_mm + page.gap_mm;
        }
    }
    if !current.placements.is_empty() {
        pages.push(current);
    }

    log::debug!(
        "layout: {count} photo(s) of {}x{}mm on {} page(s)",
        photo.width_mm,
        photo.height_mm,
        pages.len()
    );

    Ok(LayoutPlan { photo, page, pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a4_plan(count: u32) -> LayoutPlan {
        compute_layout(count, PhotoSize::default(), PageSpec::a4()).unwrap()
    }

    fn overlaps(a: &Placement, b: &Placement, photo: PhotoSize) -> bool {
        a.x_mm < b.x_mm + photo.width_mm
            && b.x_mm < a.x_mm + photo.width_mm
            && a.y_mm < b.y_mm + photo.height_mm
            && b.y_mm < a.y_mm + photo.height_mm
    }

    fn assert_valid_plan(plan: &LayoutPlan) {
        let (photo, page) = (plan.photo, plan.page);
        for (page_idx, sheet) in plan.pages.iter().enumerate() {
            assert!(!sheet.placements.is_empty(), "page {page_idx} is blank");
            for (i, p) in sheet.placements.iter().enumerate() {
                assert!(p.x_mm >= page.margin_mm - EPSILON_MM);
                assert!(p.y_mm >= page.margin_mm - EPSILON_MM);
                assert!(p.x_mm + photo.width_mm <= page.width_mm - page.margin_mm + EPSILON_MM);
                assert!(p.y_mm + photo.height_mm <= page.height_mm - page.margin_mm + EPSILON_MM);
                for q in &sheet.placements[i + 1..] {
                    assert!(!overlaps(p, q, photo), "{p:?} overlaps {q:?}");
                }
            }
            // Row-major: each placement is right of, or below, the previous one
            for pair in sheet.placements.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                assert!(
                    (b.y_mm == a.y_mm && b.x_mm > a.x_mm) || b.y_mm > a.y_mm,
                    "{b:?} does not follow {a:?} in row-major order"
                );
            }
        }
    }

    // =========================================================================
    // compute_layout
    // =========================================================================

    #[test]
    fn single_photo_sits_at_margin() {
        let plan = a4_plan(1);
        assert_eq!(plan.page_count(), 1);
        assert_eq!(
            plan.pages[0].placements,
            vec![Placement {
                x_mm: 15.0,
                y_mm: 15.0
            }]
        );
    }

    #[test]
    fn six_photos_fill_one_row_on_one_page() {
        let plan = a4_plan(6);
        assert_eq!(plan.page_count(), 1);
        assert_eq!(plan.tile_count(), 6);
        let xs: Vec<f64> = plan.pages[0].placements.iter().map(|p| p.x_mm).collect();
        assert_eq!(xs, vec![15.0, 45.0, 75.0, 105.0, 135.0, 165.0]);
        assert!(plan.pages[0].placements.iter().all(|p| p.y_mm == 15.0));
        assert_valid_plan(&plan);
    }

    #[test]
    fn seventh_photo_wraps_to_second_row() {
        let plan = a4_plan(7);
        let last = plan.pages[0].placements[6];
        assert_eq!(last, Placement { x_mm: 15.0, y_mm: 50.0 });
    }

    #[test]
    fn thirty_photos_fit_on_one_a4_page() {
        // 6 columns x 7 rows = 42 slots per A4 page
        let plan = a4_plan(30);
        assert_eq!(plan.page_count(), 1);
        assert_eq!(plan.tile_count(), 30);
        assert_valid_plan(&plan);
    }

    #[test]
    fn exactly_full_page_does_not_add_blank_page() {
        let plan = a4_plan(42);
        assert_eq!(plan.capacity_per_page(), 42);
        assert_eq!(plan.page_count(), 1);
        assert_valid_plan(&plan);
    }

    #[test]
    fn overflow_starts_new_page_at_margin() {
        let plan = a4_plan(43);
        assert_eq!(plan.page_count(), 2);
        assert_eq!(plan.pages[0].placements.len(), 42);
        assert_eq!(
            plan.pages[1].placements,
            vec![Placement {
                x_mm: 15.0,
                y_mm: 15.0
            }]
        );
        assert_valid_plan(&plan);
    }

    #[test]
    fn small_paper_paginates_thirty_photos() {
        // A6 postcard: 3 columns x 4 rows
        let page = PageSpec {
            width_mm: 105.0,
            height_mm: 148.0,
            margin_mm: 5.0,
            gap_mm: 5.0,
        };
        let plan = compute_layout(30, PhotoSize::default(), page).unwrap();
        assert_eq!(plan.grid_per_page(), (3, 4));
        assert_eq!(plan.page_count(), 3);
        assert_eq!(plan.tile_count(), 30);
        assert_eq!(plan.pages[2].placements.len(), 6);
        assert_valid_plan(&plan);
    }

    #[test]
    fn every_count_up_to_three_pages_is_valid() {
        for count in 1..=126 {
            let plan = a4_plan(count);
            assert_eq!(plan.tile_count(), count as usize);
            assert_eq!(plan.page_count(), (count as usize).div_ceil(42));
            assert_valid_plan(&plan);
        }
    }

    #[test]
    fn zero_count_yields_no_pages() {
        let plan = a4_plan(0);
        assert_eq!(plan.page_count(), 0);
        assert_eq!(plan.tile_count(), 0);
    }

    #[test]
    fn layout_is_pure_function_of_inputs() {
        assert_eq!(a4_plan(17), a4_plan(17));
    }

    #[test]
    fn photo_larger_than_printable_area_is_rejected() {
        let result = compute_layout(1, PhotoSize::new(200.0, 30.0), PageSpec::a4());
        assert!(matches!(result, Err(LayoutError::PhotoDoesNotFit { .. })));
    }

    #[test]
    fn photo_exactly_filling_printable_area_fits() {
        let plan = compute_layout(2, PhotoSize::new(180.0, 267.0), PageSpec::a4()).unwrap();
        assert_eq!(plan.page_count(), 2);
        assert_valid_plan(&plan);
    }

    #[test]
    fn negative_margin_is_rejected() {
        let page = PageSpec {
            margin_mm: -1.0,
            ..PageSpec::a4()
        };
        let result = compute_layout(1, PhotoSize::default(), page);
        assert!(matches!(result, Err(LayoutError::InvalidPage(_))));
    }

    // =========================================================================
    // PhotoCountRange
    // =========================================================================

    #[test]
    fn count_range_bounds() {
        let range = PhotoCountRange::default();
        assert_eq!(range.check(1), Ok(1));
        assert_eq!(range.check(30), Ok(30));
        assert!(matches!(
            range.check(0),
            Err(LayoutError::InvalidCount { count: 0, .. })
        ));
        assert!(range.check(31).is_err());
    }

    #[test]
    fn photo_aspect_ratio() {
        assert!((PhotoSize::default().aspect_ratio() - 25.0 / 30.0).abs() < 1e-12);
    }
}
