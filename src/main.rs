use clap::{Parser, Subcommand};
use photo_sheet::background::{
    BackgroundError, BackgroundService, EraseFill, EraseStroke, GeminiBackground, erase_strokes,
};
use photo_sheet::config::{self, SheetConfig};
use photo_sheet::imaging::{
    CropRegion, FilterSettings, Flip, ImageBuffer, Transform, bake_tone,
};
use photo_sheet::layout::compute_layout;
use photo_sheet::output;
use photo_sheet::pipeline::{Pipeline, PipelineError, PipelineSettings, ReplaceOutcome};
use std::path::{Path, PathBuf};

/// Crop and transform flags.
#[derive(clap::Args, Clone)]
struct CropArgs {
    /// Crop region as x,y,width,height in rotated-image pixels
    /// (default: the largest centered region with the photo's aspect ratio)
    #[arg(long)]
    region: Option<CropRegion>,

    /// Rotation in degrees (clockwise)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rotate: f64,

    /// Mirror left-right
    #[arg(long)]
    flip_h: bool,

    /// Mirror top-bottom
    #[arg(long)]
    flip_v: bool,

    /// Shrink the default crop region by this factor (>= 1)
    #[arg(long, default_value_t = 1.0)]
    zoom: f64,
}

impl CropArgs {
    fn transform(&self) -> Transform {
        Transform::new(
            self.rotate,
            Flip {
                horizontal: self.flip_h,
                vertical: self.flip_v,
            },
            self.zoom,
        )
    }
}

/// Tone flags.
#[derive(clap::Args, Clone)]
struct ToneArgs {
    /// Brightness in percent (100 = unchanged)
    #[arg(long, default_value_t = 100)]
    brightness: u32,

    /// Contrast in percent (100 = unchanged)
    #[arg(long, default_value_t = 100)]
    contrast: u32,

    /// Convert to black and white
    #[arg(long)]
    grayscale: bool,
}

impl ToneArgs {
    fn settings(&self) -> FilterSettings {
        FilterSettings {
            brightness_percent: self.brightness,
            contrast_percent: self.contrast,
            grayscale: self.grayscale,
        }
    }
}

/// Background flags.
#[derive(clap::Args, Clone)]
struct BackgroundArgs {
    /// Replace the background with white using the remote image model
    #[arg(long)]
    auto_background: bool,

    /// Erase with a round brush: x,y,radius or x1,y1,x2,y2,...,radius (repeatable)
    #[arg(long, value_name = "STROKE")]
    erase: Vec<EraseStroke>,

    /// What erased pixels become: transparent or white
    #[arg(long, default_value_t = EraseFill::Transparent)]
    erase_fill: EraseFill,
}

#[derive(Parser)]
#[command(name = "photo-sheet")]
#[command(about = "Turn a child's photo into a printable sheet of ID photos")]
#[command(long_about = "\
Turn a child's photo into a printable sheet of ID photos

The photo goes through four stages:

  upload  → a JPEG or PNG file
  crop    → rotate/flip, then cut a region locked to the photo's aspect ratio
  edit    → optional background removal (remote or by hand), then tone
  print   → tiled copies with cut guides, paginated into a PDF

Sizes, paper, copy limits and the background service all come from
photo-sheet.toml. Run 'photo-sheet gen-config' to generate a documented one.

The remote background service reads its API key from GEMINI_API_KEY.
Set RUST_LOG=debug for detailed logs.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./photo-sheet.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rotate, flip and crop a photo
    Crop {
        input: PathBuf,
        #[command(flatten)]
        crop: CropArgs,
        /// Output PNG
        #[arg(long, short, default_value = "photo.png")]
        output: PathBuf,
    },
    /// Bake brightness, contrast and grayscale into a photo
    Tone {
        input: PathBuf,
        #[command(flatten)]
        tone: ToneArgs,
        #[arg(long, short, default_value = "photo.png")]
        output: PathBuf,
    },
    /// Remove a photo's background, remotely or with erase strokes
    Background {
        input: PathBuf,
        #[command(flatten)]
        background: BackgroundArgs,
        #[arg(long, short, default_value = "photo.png")]
        output: PathBuf,
    },
    /// Show where each copy goes on the sheet
    Layout {
        /// Number of copies
        #[arg(long)]
        count: Option<u32>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the full pipeline: crop → edit → print
    Build {
        input: PathBuf,
        #[command(flatten)]
        crop: CropArgs,
        #[command(flatten)]
        background: BackgroundArgs,
        #[command(flatten)]
        tone: ToneArgs,
        /// Number of copies (default from config)
        #[arg(long)]
        count: Option<u32>,
        /// Also save the finished photo as PNG
        #[arg(long)]
        save_photo: Option<PathBuf>,
        /// Output PDF
        #[arg(long, short, default_value = "sheet.pdf")]
        output: PathBuf,
    },
    /// Print a stock photo-sheet.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Crop {
            input,
            crop,
            output,
        } => {
            let mut pipeline = Pipeline::new(PipelineSettings::from(&config));
            pipeline.upload_file(&input)?;
            let (transform, region) = resolve_crop(&pipeline, &crop)?;
            pipeline.commit_crop(region, transform)?;
            let photo = pipeline.working_image().ok_or(PipelineError::NoImage)?;
            output::print_crop_output(
                source_dimensions(&pipeline)?,
                region,
                pipeline.transform(),
                photo.dimensions(),
            );
            photo.save_png(&output)?;
        }
        Command::Tone {
            input,
            tone,
            output,
        } => {
            let photo = ImageBuffer::open(&input)?;
            let baked = bake_tone(&photo, tone.settings(), config.tone)?;
            output::print_tone_output(tone.settings());
            baked.save_png(&output)?;
        }
        Command::Background {
            input,
            background,
            output,
        } => {
            let mut photo = ImageBuffer::open(&input)?;
            if background.auto_background {
                match replace_remotely(&config, &photo) {
                    Ok(replaced) => {
                        println!("Background replaced");
                        photo = replaced;
                    }
                    Err(e) => output::print_background_failure(&e),
                }
            }
            if !background.erase.is_empty() {
                photo = erase_strokes(&photo, &background.erase, background.erase_fill);
            }
            photo.save_png(&output)?;
        }
        Command::Layout { count, json } => {
            let count = config
                .photo_count_range()
                .check(count.unwrap_or(config.print.default_count))?;
            let plan = compute_layout(count, config.photo, config.page)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                output::print_layout_plan(&plan);
            }
        }
        Command::Build {
            input,
            crop,
            background,
            tone,
            count,
            save_photo,
            output,
        } => {
            build(
                &config, &input, &crop, &background, &tone, count, save_photo, &output,
            )?;
        }
        Command::GenConfig => {}
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build(
    config: &SheetConfig,
    input: &Path,
    crop: &CropArgs,
    background: &BackgroundArgs,
    tone: &ToneArgs,
    count: Option<u32>,
    save_photo: Option<PathBuf>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut pipeline = Pipeline::new(PipelineSettings::from(config));
    if let Some(count) = count {
        pipeline.set_photo_count(count)?;
    }

    println!("==> Stage 1: Loading {}", input.display());
    pipeline.upload_file(input)?;

    println!("==> Stage 2: Cropping");
    let (transform, region) = resolve_crop(&pipeline, crop)?;
    pipeline.commit_crop(region, transform)?;
    let cropped = pipeline
        .working_image()
        .ok_or(PipelineError::NoImage)?
        .dimensions();
    output::print_crop_output(
        source_dimensions(&pipeline)?,
        region,
        pipeline.transform(),
        cropped,
    );

    println!("==> Stage 3: Editing");
    if background.auto_background {
        auto_replace(config, &mut pipeline)?;
    }
    if !background.erase.is_empty() {
        pipeline.apply_manual_erase(&background.erase, background.erase_fill)?;
        println!("Erased {} stroke(s)", background.erase.len());
    }
    pipeline.commit_edit(tone.settings())?;
    output::print_tone_output(tone.settings());
    if let Some(path) = save_photo {
        let photo = pipeline.finalized_image().ok_or(PipelineError::NoImage)?;
        photo.save_png(&path)?;
        println!("Saved photo to {}", path.display());
    }

    println!("==> Stage 4: Printing");
    let plan = pipeline.layout()?;
    output::print_layout_plan(&plan);
    let document = pipeline.render()?;
    document.save(output)?;
    output::print_build_summary(&document, output);
    Ok(())
}

/// Explicit region, or the centered default for the requested transform.
fn resolve_crop(
    pipeline: &Pipeline,
    crop: &CropArgs,
) -> Result<(Transform, CropRegion), PipelineError> {
    let transform = crop.transform();
    let region = match crop.region {
        Some(region) => region,
        None => pipeline.default_crop_region(transform)?,
    };
    Ok((transform, region))
}

fn source_dimensions(pipeline: &Pipeline) -> Result<(u32, u32), PipelineError> {
    Ok(pipeline
        .raw_image()
        .ok_or(PipelineError::NoImage)?
        .dimensions())
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Remote replacement inside the pipeline. Service failures are reported with
/// the manual fallback and do not stop the build.
fn auto_replace(
    config: &SheetConfig,
    pipeline: &mut Pipeline,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = match GeminiBackground::from_config(&config.background) {
        Ok(service) => service,
        Err(e) => {
            output::print_background_failure(&e);
            return Ok(());
        }
    };
    match runtime()?.block_on(pipeline.auto_replace(&service)) {
        Ok(ReplaceOutcome::Applied) => println!("Background replaced"),
        Ok(ReplaceOutcome::Discarded) => println!("Background result discarded"),
        Err(PipelineError::Background(e)) => output::print_background_failure(&e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Remote replacement of a standalone photo.
fn replace_remotely(
    config: &SheetConfig,
    photo: &ImageBuffer,
) -> Result<ImageBuffer, BackgroundError> {
    let service = GeminiBackground::from_config(&config.background)?;
    runtime()
        .map_err(|e| BackgroundError::Network(e.to_string()))?
        .block_on(service.replace_background(photo))
}
