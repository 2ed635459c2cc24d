//! The session state machine.
//!
//! One [`Pipeline`] carries one photo from upload to print:
//!
//! ```text
//! Upload ──upload──▶ Crop ──commit_crop──▶ Edit ──commit_edit──▶ Print
//!                     ▲                     │  ▲                    │
//!                     └────back_to_crop─────┘  └────back_to_edit────┘
//!
//! reset / reset_keeping_count: any stage ──▶ Upload
//! ```
//!
//! It holds exactly one current buffer per role: the raw upload, the working
//! image (crop result plus background edits), and the finalized image (tone
//! baked). Committing a stage replaces the buffer; nothing is kept for undo.
//!
//! ## Remote background replacement
//!
//! The remote call is the only operation that suspends. It is split into
//! [`begin_background_replace`](Pipeline::begin_background_replace), which
//! hands out a [`ReplaceTicket`] and a copy of the working image, and
//! [`finish_background_replace`](Pipeline::finish_background_replace), which
//! installs the result. While a ticket is outstanding, manual edits, a second
//! remote call, and `commit_edit` are rejected with
//! [`PipelineError::BackgroundBusy`]. Going back to crop or resetting bumps the
//! generation counter, so a result that arrives afterwards is
//! [`Discarded`](ReplaceOutcome::Discarded) rather than installed.

use crate::background::{
    BackgroundError, BackgroundService, EraseFill, EraseStroke, erase_strokes,
};
use crate::config::SheetConfig;
use crate::document::{DocumentError, DocumentStyle, PrintDocument, render_to_document};
use crate::imaging::{
    BufferError, CropRegion, FilterSettings, GeometryError, ImageBuffer, ToneLimits, Transform,
    bake_tone, extract_cropped_region, fit_crop_region, rotated_bounding_box,
};
use crate::layout::{LayoutError, LayoutPlan, PageSpec, PhotoCountRange, PhotoSize, compute_layout};
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Crop,
    Edit,
    Print,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upload => "upload",
            Stage::Crop => "crop",
            Stage::Edit => "edit",
            Stage::Print => "print",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Not allowed in the {actual} stage (expected {expected})")]
    WrongStage { expected: Stage, actual: Stage },
    #[error("Background replacement is still in progress")]
    BackgroundBusy,
    #[error("No image loaded")]
    NoImage,
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Background(#[from] BackgroundError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Configuration the pipeline needs, extracted from [`SheetConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub photo: PhotoSize,
    pub page: PageSpec,
    pub tone: ToneLimits,
    pub counts: PhotoCountRange,
    pub default_count: u32,
    pub style: DocumentStyle,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&SheetConfig::default())
    }
}

impl From<&SheetConfig> for PipelineSettings {
    fn from(config: &SheetConfig) -> Self {
        Self {
            photo: config.photo,
            page: config.page,
            tone: config.tone,
            counts: config.photo_count_range(),
            default_count: config.print.default_count,
            style: DocumentStyle::from(&config.print),
        }
    }
}

/// Proof that a remote replacement was started, redeemed on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceTicket {
    generation: u64,
    id: u64,
}

/// What happened to a finished remote replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Result installed as the working image.
    Applied,
    /// The session moved on while the call was in flight; result ignored.
    Discarded,
}

pub struct Pipeline {
    settings: PipelineSettings,
    stage: Stage,
    raw: Option<ImageBuffer>,
    working: Option<ImageBuffer>,
    finalized: Option<ImageBuffer>,
    transform: Transform,
    filters: FilterSettings,
    photo_count: u32,
    /// Bumped whenever in-flight results become stale.
    generation: u64,
    next_ticket: u64,
    pending: Option<ReplaceTicket>,
}

impl Pipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        let photo_count = settings.default_count;
        Self {
            settings,
            stage: Stage::Upload,
            raw: None,
            working: None,
            finalized: None,
            transform: Transform::default(),
            filters: FilterSettings::default(),
            photo_count,
            generation: 0,
            next_ticket: 0,
            pending: None,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn raw_image(&self) -> Option<&ImageBuffer> {
        self.raw.as_ref()
    }

    pub fn working_image(&self) -> Option<&ImageBuffer> {
        self.working.as_ref()
    }

    pub fn finalized_image(&self) -> Option<&ImageBuffer> {
        self.finalized.as_ref()
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn filter_settings(&self) -> FilterSettings {
        self.filters
    }

    pub fn photo_count(&self) -> u32 {
        self.photo_count
    }

    /// True while a remote replacement is outstanding.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn expect_stage(&self, expected: Stage) -> Result<(), PipelineError> {
        if self.stage != expected {
            return Err(PipelineError::WrongStage {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    fn expect_idle(&self) -> Result<(), PipelineError> {
        if self.is_busy() {
            return Err(PipelineError::BackgroundBusy);
        }
        Ok(())
    }

    fn invalidate_pending(&mut self) {
        if self.pending.take().is_some() {
            log::debug!("pending background replacement cancelled");
        }
        self.generation += 1;
    }

    // =========================================================================
    // Upload → Crop
    // =========================================================================

    /// Take ownership of the uploaded photo and move to the crop stage.
    pub fn upload(&mut self, image: ImageBuffer) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Upload)?;
        log::info!("uploaded {}x{} photo", image.width(), image.height());
        self.raw = Some(image);
        self.stage = Stage::Crop;
        Ok(())
    }

    /// Decode a JPEG or PNG file and [`upload`](Self::upload) it.
    pub fn upload_file(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Upload)?;
        let image = ImageBuffer::open(path)?;
        self.upload(image)
    }

    // =========================================================================
    // Crop → Edit
    // =========================================================================

    /// Width / height the crop frame is locked to.
    pub fn crop_aspect_ratio(&self) -> f64 {
        self.settings.photo.aspect_ratio()
    }

    /// The centered region a fresh crop frame covers under `transform`.
    pub fn default_crop_region(&self, transform: Transform) -> Result<CropRegion, PipelineError> {
        let raw = self.raw.as_ref().ok_or(PipelineError::NoImage)?;
        let bbox = rotated_bounding_box(
            raw.width() as f64,
            raw.height() as f64,
            transform.rotation_degrees,
        );
        Ok(fit_crop_region(
            bbox.pixel_size(),
            self.crop_aspect_ratio(),
            transform.zoom,
        )?)
    }

    /// Extract `region` from the raw photo under `transform` and move to edit.
    ///
    /// Tone settings are reset: a new crop invalidates earlier choices. On a
    /// geometry error nothing changes.
    pub fn commit_crop(
        &mut self,
        region: CropRegion,
        transform: Transform,
    ) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Crop)?;
        let raw = self.raw.as_ref().ok_or(PipelineError::NoImage)?;
        let cropped =
            extract_cropped_region(raw, region, transform.rotation_degrees, transform.flip)?;

        log::info!(
            "cropped {region} at {}° to {}x{}",
            transform.rotation_degrees,
            cropped.width(),
            cropped.height()
        );
        self.working = Some(cropped);
        self.finalized = None;
        self.transform = transform;
        self.filters = FilterSettings::default();
        self.generation += 1;
        self.stage = Stage::Edit;
        Ok(())
    }

    // =========================================================================
    // Edit: background
    // =========================================================================

    fn install_working(&mut self, image: ImageBuffer, source: &str) {
        if let Some(current) = &self.working
            && current.dimensions() != image.dimensions()
        {
            log::warn!(
                "{source} changed photo size from {}x{} to {}x{}",
                current.width(),
                current.height(),
                image.width(),
                image.height()
            );
        }
        self.working = Some(image);
    }

    /// Paint erase strokes onto the working image.
    pub fn apply_manual_erase(
        &mut self,
        strokes: &[EraseStroke],
        fill: EraseFill,
    ) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Edit)?;
        self.expect_idle()?;
        let working = self.working.as_ref().ok_or(PipelineError::NoImage)?;
        let erased = erase_strokes(working, strokes, fill);
        self.install_working(erased, "manual erase");
        Ok(())
    }

    /// Install a buffer produced by an external eraser as the working image.
    pub fn apply_manual_edit(&mut self, edited: ImageBuffer) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Edit)?;
        self.expect_idle()?;
        if self.working.is_none() {
            return Err(PipelineError::NoImage);
        }
        self.install_working(edited, "manual edit");
        Ok(())
    }

    /// Start a remote replacement: returns the ticket to redeem and the image
    /// to send.
    pub fn begin_background_replace(
        &mut self,
    ) -> Result<(ReplaceTicket, ImageBuffer), PipelineError> {
        self.expect_stage(Stage::Edit)?;
        self.expect_idle()?;
        let working = self.working.clone().ok_or(PipelineError::NoImage)?;
        let ticket = ReplaceTicket {
            generation: self.generation,
            id: self.next_ticket,
        };
        self.next_ticket += 1;
        self.pending = Some(ticket);
        Ok((ticket, working))
    }

    /// Install (or discard) the result of a remote replacement.
    ///
    /// A failed call leaves the working image untouched and returns the
    /// service error; the manual path is available again immediately.
    pub fn finish_background_replace(
        &mut self,
        ticket: ReplaceTicket,
        result: Result<ImageBuffer, BackgroundError>,
    ) -> Result<ReplaceOutcome, PipelineError> {
        if self.pending != Some(ticket) || ticket.generation != self.generation {
            log::info!("discarding stale background replacement result");
            return Ok(ReplaceOutcome::Discarded);
        }
        self.pending = None;
        match result {
            Ok(image) => {
                self.install_working(image, "background replacement");
                log::info!("background replaced");
                Ok(ReplaceOutcome::Applied)
            }
            Err(e) => {
                log::warn!("background replacement failed: {e}");
                Err(e.into())
            }
        }
    }

    /// Run a remote replacement end to end.
    pub async fn auto_replace<S: BackgroundService>(
        &mut self,
        service: &S,
    ) -> Result<ReplaceOutcome, PipelineError> {
        let (ticket, image) = self.begin_background_replace()?;
        let result = service.replace_background(&image).await;
        self.finish_background_replace(ticket, result)
    }

    // =========================================================================
    // Edit → Print
    // =========================================================================

    /// Bake `filters` into the working image and move to print.
    ///
    /// A bake failure never blocks the user: the unfiltered working image is
    /// used instead and the failure is logged.
    pub fn commit_edit(&mut self, filters: FilterSettings) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Edit)?;
        self.expect_idle()?;
        let working = self.working.as_ref().ok_or(PipelineError::NoImage)?;

        let finalized = match bake_tone(working, filters, self.settings.tone) {
            Ok(baked) => baked,
            Err(e) => {
                log::warn!("tone bake failed, printing unfiltered photo: {e}");
                working.clone()
            }
        };
        self.finalized = Some(finalized);
        self.filters = filters;
        self.stage = Stage::Print;
        Ok(())
    }

    // =========================================================================
    // Backward transitions and reset
    // =========================================================================

    /// Edit → Crop. Drops the working image and any in-flight replacement.
    pub fn back_to_crop(&mut self) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Edit)?;
        self.invalidate_pending();
        self.working = None;
        self.stage = Stage::Crop;
        Ok(())
    }

    /// Print → Edit. The working image is kept; the finalized one is dropped.
    pub fn back_to_edit(&mut self) -> Result<(), PipelineError> {
        self.expect_stage(Stage::Print)?;
        self.finalized = None;
        self.stage = Stage::Edit;
        Ok(())
    }

    /// Discard everything, including the photo count, and return to upload.
    pub fn reset(&mut self) {
        self.reset_keeping_count();
        self.photo_count = self.settings.default_count;
    }

    /// Discard all buffers and settings but keep the photo count.
    pub fn reset_keeping_count(&mut self) {
        self.invalidate_pending();
        self.raw = None;
        self.working = None;
        self.finalized = None;
        self.transform = Transform::default();
        self.filters = FilterSettings::default();
        self.stage = Stage::Upload;
        log::debug!("pipeline reset");
    }

    // =========================================================================
    // Print
    // =========================================================================

    /// Set how many copies to print. Out-of-range counts are rejected.
    pub fn set_photo_count(&mut self, count: u32) -> Result<(), PipelineError> {
        self.photo_count = self.settings.counts.check(count)?;
        Ok(())
    }

    /// Layout for the current photo count.
    pub fn layout(&self) -> Result<LayoutPlan, PipelineError> {
        let count = self.settings.counts.check(self.photo_count)?;
        Ok(compute_layout(count, self.settings.photo, self.settings.page)?)
    }

    /// Render the printable document from the finalized image.
    pub fn render(&self) -> Result<PrintDocument, PipelineError> {
        self.expect_stage(Stage::Print)?;
        let finalized = self.finalized.as_ref().ok_or(PipelineError::NoImage)?;
        let plan = self.layout()?;
        Ok(render_to_document(finalized, &plan, &self.settings.style)?)
    }
}
