//! Printable document rendering.
//!
//! Turns a finished photo and a [`LayoutPlan`] into a PDF. The photo is
//! flattened onto white, JPEG-encoded once, and embedded as a single image
//! XObject that every tile on every page references. Each tile gets a thin
//! gray cut guide traced along its edges.
//!
//! Layout coordinates are millimeters from the page's top-left corner; PDF
//! user space is points from the bottom-left, so every placement is flipped:
//!
//! ```text
//! x_pt = x_mm * 72 / 25.4
//! y_pt = page_height_pt - (y_mm + photo_height_mm) * 72 / 25.4
//! ```

use crate::config::PrintConfig;
use crate::imaging::{ImageBuffer, Quality};
use crate::layout::LayoutPlan;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode photo for print: {0}")]
    Encode(String),
    #[error("Layout plan has no pages")]
    EmptyPlan,
}

/// Name the photo XObject is registered under in each page's resources.
const PHOTO_XOBJECT: &[u8] = b"Im1";

const POINTS_PER_MM: f64 = 72.0 / 25.4;

fn mm_to_pt(mm: f64) -> f32 {
    (mm * POINTS_PER_MM) as f32
}

/// How tiles are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentStyle {
    /// Cut-guide gray (0 = black, 255 = white).
    pub guide_gray: u8,
    pub guide_width_mm: f64,
    pub jpeg_quality: Quality,
}

impl Default for DocumentStyle {
    fn default() -> Self {
        Self::from(&PrintConfig::default())
    }
}

impl From<&PrintConfig> for DocumentStyle {
    fn from(print: &PrintConfig) -> Self {
        Self {
            guide_gray: print.guide_gray,
            guide_width_mm: print.guide_width_mm,
            jpeg_quality: print.quality(),
        }
    }
}

/// A rendered PDF, ready to write out.
#[derive(Debug, Clone)]
pub struct PrintDocument {
    pub page_count: usize,
    pub tile_count: usize,
    pub bytes: Vec<u8>,
}

impl PrintDocument {
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

fn encode_jpeg(photo: &ImageBuffer, quality: Quality) -> Result<Vec<u8>, DocumentError> {
    let rgb = photo.flatten_onto_white();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.value() as u8)
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| DocumentError::Encode(e.to_string()))?;
    Ok(out)
}

/// Content stream operations for one page.
fn page_operations(plan: &LayoutPlan, page_index: usize, style: &DocumentStyle) -> Vec<Operation> {
    let page_height = mm_to_pt(plan.page.height_mm);
    let width = mm_to_pt(plan.photo.width_mm);
    let height = mm_to_pt(plan.photo.height_mm);
    let gray = style.guide_gray as f32 / 255.0;

    let mut ops = Vec::new();
    for placement in &plan.pages[page_index].placements {
        let x = mm_to_pt(placement.x_mm);
        let y = page_height - mm_to_pt(placement.y_mm) - height;

        ops.push(Operation::new("q", vec![]));
        ops.push(Operation::new(
            "cm",
            vec![
                width.into(),
                0.into(),
                0.into(),
                height.into(),
                x.into(),
                y.into(),
            ],
        ));
        ops.push(Operation::new("Do", vec![Object::Name(PHOTO_XOBJECT.to_vec())]));
        ops.push(Operation::new("Q", vec![]));

        if style.guide_width_mm > 0.0 {
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new("G", vec![gray.into()]));
            ops.push(Operation::new("w", vec![mm_to_pt(style.guide_width_mm).into()]));
            ops.push(Operation::new(
                "re",
                vec![x.into(), y.into(), width.into(), height.into()],
            ));
            ops.push(Operation::new("S", vec![]));
            ops.push(Operation::new("Q", vec![]));
        }
    }
    ops
}

/// Render every page of `plan`, tiling `photo` at each placement.
pub fn render_to_document(
    photo: &ImageBuffer,
    plan: &LayoutPlan,
    style: &DocumentStyle,
) -> Result<PrintDocument, DocumentError> {
    if plan.pages.is_empty() {
        return Err(DocumentError::EmptyPlan);
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let jpeg = encode_jpeg(photo, style.jpeg_quality)?;
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => photo.width() as i64,
            "Height" => photo.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg,
    ));
    let resources_id = doc.add_object(dictionary! {
        "XObject" => dictionary! {
            "Im1" => image_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(plan.pages.len());
    for index in 0..plan.pages.len() {
        let content = Content {
            operations: page_operations(plan, index, style),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => plan.pages.len() as i64,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            mm_to_pt(plan.page.width_mm).into(),
            mm_to_pt(plan.page.height_mm).into(),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;

    log::info!(
        "rendered {} tile(s) on {} page(s), {} bytes",
        plan.tile_count(),
        plan.page_count(),
        bytes.len()
    );

    Ok(PrintDocument {
        page_count: plan.page_count(),
        tile_count: plan.tile_count(),
        bytes,
    })
}
