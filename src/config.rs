//! Sheet configuration module.
//!
//! Handles loading, validating, and merging `photo-sheet.toml`. Every constant
//! that ties the tool to one photo standard or paper size lives here, so other
//! standards need a config file, not a code change.
//!
//! ## Config File Location
//!
//! Passed with `--config <path>`. Without the flag, `photo-sheet.toml` in the
//! working directory is used when present; otherwise stock defaults apply.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [photo]
//! width_mm = 25.0           # Printed photo width
//! height_mm = 30.0          # Printed photo height (crop aspect = width / height)
//!
//! [page]
//! width_mm = 210.0          # A4 portrait
//! height_mm = 297.0
//! margin_mm = 15.0          # Blank border on every side
//! gap_mm = 5.0              # Space between photos
//!
//! [print]
//! default_count = 6         # Copies when --count is not given
//! min_count = 1
//! max_count = 30
//! guide_gray = 200          # Cut-guide gray level (0 = black, 255 = white)
//! guide_width_mm = 0.2      # Cut-guide line width
//! jpeg_quality = 95         # Quality of the photo embedded in the PDF
//!
//! [tone]
//! min_percent = 50          # Lowest brightness/contrast allowed
//! max_percent = 150         # Highest brightness/contrast allowed
//!
//! [background]
//! endpoint = "https://generativelanguage.googleapis.com/v1beta"
//! model = "gemini-2.5-flash-image"
//! api_key_env = "GEMINI_API_KEY"
//! timeout_secs = 120
//! prompt = "..."            # Instruction sent with the photo
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! # US Letter paper
//! [page]
//! width_mm = 215.9
//! height_mm = 279.4
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Quality, ToneLimits};
use crate::layout::{PageSpec, PhotoCountRange, PhotoSize};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "photo-sheet.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `photo-sheet.toml`.
///
/// All fields have defaults matching a 25x30 mm child photo on A4 paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SheetConfig {
    /// Printed photo size.
    pub photo: PhotoSize,
    /// Paper geometry.
    pub page: PageSpec,
    /// Copy count range and print styling.
    pub print: PrintConfig,
    /// Allowed brightness/contrast range.
    pub tone: ToneLimits,
    /// Remote background replacement service.
    pub background: BackgroundConfig,
}

impl SheetConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.page
            .validate_for(self.photo)
            .map_err(|e| ConfigError::Validation(format!("[page]/[photo]: {e}")))?;

        let print = &self.print;
        if print.min_count == 0 {
            return Err(ConfigError::Validation(
                "print.min_count must be at least 1".into(),
            ));
        }
        if !(print.min_count <= print.default_count && print.default_count <= print.max_count) {
            return Err(ConfigError::Validation(
                "print counts must satisfy min_count <= default_count <= max_count".into(),
            ));
        }
        if !(print.guide_width_mm.is_finite() && print.guide_width_mm >= 0.0) {
            return Err(ConfigError::Validation(
                "print.guide_width_mm must not be negative".into(),
            ));
        }
        if print.jpeg_quality == 0 || print.jpeg_quality > 100 {
            return Err(ConfigError::Validation(
                "print.jpeg_quality must be 1-100".into(),
            ));
        }

        if !(self.tone.min_percent <= 100 && 100 <= self.tone.max_percent) {
            return Err(ConfigError::Validation(
                "tone range must include 100 (min_percent <= 100 <= max_percent)".into(),
            ));
        }

        let bg = &self.background;
        for (key, value) in [
            ("endpoint", &bg.endpoint),
            ("model", &bg.model),
            ("api_key_env", &bg.api_key_env),
            ("prompt", &bg.prompt),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "background.{key} must not be empty"
                )));
            }
        }
        if bg.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "background.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn photo_count_range(&self) -> PhotoCountRange {
        PhotoCountRange {
            min: self.print.min_count,
            max: self.print.max_count,
        }
    }
}

/// Copy count range and print styling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrintConfig {
    /// Copies printed when no count is requested.
    pub default_count: u32,
    /// Fewest copies a user may request.
    pub min_count: u32,
    /// Most copies a user may request.
    pub max_count: u32,
    /// Gray level of the cut guides (0 = black, 255 = white).
    pub guide_gray: u8,
    /// Stroke width of the cut guides.
    pub guide_width_mm: f64,
    /// JPEG quality of the embedded photo (1-100).
    pub jpeg_quality: u32,
}

impl PrintConfig {
    pub fn quality(&self) -> Quality {
        Quality::new(self.jpeg_quality)
    }
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            default_count: 6,
            min_count: 1,
            max_count: 30,
            guide_gray: 200,
            guide_width_mm: 0.2,
            jpeg_quality: 95,
        }
    }
}

/// Remote background replacement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundConfig {
    /// Base URL of the generative language API.
    pub endpoint: String,
    /// Image-editing model name.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout.
    pub timeout_secs: u64,
    /// Instruction sent alongside the photo.
    pub prompt: String,
}

pub const DEFAULT_BACKGROUND_PROMPT: &str = "Edit this image: Replace the background with a clean, solid white background. \
Keep the person in the foreground exactly as they are. Do not crop or change the person.";

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash-image".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 120,
            prompt: DEFAULT_BACKGROUND_PROMPT.to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SheetConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SheetConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SheetConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] in the
/// working directory is used if present, else stock defaults.
pub fn load_config(path: Option<&Path>) -> Result<SheetConfig, ConfigError> {
    let overlay = match path {
        Some(p) => Some(load_raw_config(p)?.ok_or_else(|| ConfigError::NotFound(p.into()))?),
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    if let Some(p) = path {
        log::debug!("loaded config from {}", p.display());
    }
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Photo Sheet Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Each section only needs the keys it wants to override.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Printed photo size
# ---------------------------------------------------------------------------
[photo]
# The crop frame is locked to width / height.
width_mm = 25.0
height_mm = 30.0

# ---------------------------------------------------------------------------
# Paper
# ---------------------------------------------------------------------------
[page]
# A4 portrait. US Letter is 215.9 x 279.4.
width_mm = 210.0
height_mm = 297.0
# Blank border kept on every side of the sheet.
margin_mm = 15.0
# Space between neighbouring photos.
gap_mm = 5.0

# ---------------------------------------------------------------------------
# Printing
# ---------------------------------------------------------------------------
[print]
# Copies printed when no count is requested.
default_count = 6
# Allowed range for the number of copies.
min_count = 1
max_count = 30
# Cut guides drawn around every photo: gray level (0-255) and line width.
guide_gray = 200
guide_width_mm = 0.2
# JPEG quality of the photo embedded in the PDF (1-100).
jpeg_quality = 95

# ---------------------------------------------------------------------------
# Tone adjustments
# ---------------------------------------------------------------------------
[tone]
# Allowed brightness/contrast range in percent. Must include 100.
min_percent = 50
max_percent = 150

# ---------------------------------------------------------------------------
# Automatic background replacement
# ---------------------------------------------------------------------------
[background]
endpoint = "https://generativelanguage.googleapis.com/v1beta"
model = "gemini-2.5-flash-image"
# The API key is read from this environment variable, never from this file.
api_key_env = "GEMINI_API_KEY"
timeout_secs = 120
prompt = "Edit this image: Replace the background with a clean, solid white background. Keep the person in the foreground exactly as they are. Do not crop or change the person."
"##
}
