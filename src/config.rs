//! Image configuration.
//!
//! Handles loading, validating, and merging configuration for variant
//! generation. Stock defaults are overridden by a sparse user TOML file; only
//! the keys that differ need to be written down.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! widths = ["auto"]            # "auto" = the source's own width
//! formats = ["webp", "jpeg"]   # "auto" = the source's own format
//! concurrency = 10             # Images processed in parallel
//! url_path = "/img/"           # Public URL prefix
//! output_dir = "img/"          # Where files are written
//! svg_short_circuit = false    # SVG source + "svg" requested → SVG only
//! svg_allow_upscale = true     # Vector sources may be rendered larger
//!
//! [encoding.jpeg]
//! quality = 80
//!
//! [encoding.avif]
//! quality = 60
//! speed = 6
//!
//! [extensions]
//! jpeg = "jpg"                 # Write .jpg instead of .jpeg
//!
//! [cache]
//! duration = "1d"              # How long fetched remote images stay fresh
//! directory = ".cache"
//! remove_url_query_params = false
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::parse_duration;
use crate::format::{Format, FormatRequest};
use crate::imaging::{EncodeOptions, Width};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Variant generation settings.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImageConfig {
    /// Widths to produce. `"auto"` stands for the source's intrinsic width.
    pub widths: Vec<Width>,
    /// Output formats, in order. `"auto"` keeps the source format.
    pub formats: Vec<FormatRequest>,
    /// Maximum number of images processed at once.
    pub concurrency: usize,
    /// Public URL prefix for generated files.
    pub url_path: String,
    /// Directory generated files are written to.
    pub output_dir: PathBuf,
    /// When the source is an SVG and `svg` is requested, emit only the SVG.
    pub svg_short_circuit: bool,
    /// Allow rasterizing SVG sources above their intrinsic width.
    pub svg_allow_upscale: bool,
    /// Treat the source as this format when it cannot be probed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_input_format: Option<Format>,
    /// Per-format encoder options.
    pub encoding: BTreeMap<Format, EncodeOptions>,
    /// Per-format output file extension overrides.
    pub extensions: BTreeMap<Format, String>,
    /// Remote source fetching and caching.
    pub cache: CacheConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            widths: vec![Width::Intrinsic],
            formats: vec![
                FormatRequest::Format(Format::Webp),
                FormatRequest::Format(Format::Jpeg),
            ],
            concurrency: 10,
            url_path: "/img/".to_string(),
            output_dir: PathBuf::from("img/"),
            svg_short_circuit: false,
            svg_allow_upscale: true,
            override_input_format: None,
            encoding: BTreeMap::new(),
            extensions: BTreeMap::new(),
            cache: CacheConfig::default(),
        }
    }
}

impl ImageConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.widths.is_empty() {
            return Err(ConfigError::Validation("widths must not be empty".into()));
        }
        if self.widths.contains(&Width::Px(0)) {
            return Err(ConfigError::Validation(
                "widths must be positive (use \"auto\" for the intrinsic width)".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Validation("concurrency must be at least 1".into()));
        }
        for (format, options) in &self.encoding {
            // png and webp are always written lossless
            if options.quality.is_some() && !matches!(format, Format::Jpeg | Format::Avif) {
                return Err(ConfigError::Validation(format!(
                    "encoding.{format}.quality is only supported for jpeg and avif"
                )));
            }
            if options.speed.is_some() && *format != Format::Avif {
                return Err(ConfigError::Validation(format!(
                    "encoding.{format}.speed is only supported for avif"
                )));
            }
            if let Some(q) = options.quality
                && !(1..=100).contains(&q)
            {
                return Err(ConfigError::Validation(format!(
                    "encoding.{format}.quality must be 1-100"
                )));
            }
            if let Some(s) = options.speed
                && !(1..=10).contains(&s)
            {
                return Err(ConfigError::Validation(format!(
                    "encoding.{format}.speed must be 1-10"
                )));
            }
        }
        for (format, ext) in &self.extensions {
            if ext.is_empty() || ext.contains('/') || ext.contains('\\') {
                return Err(ConfigError::Validation(format!(
                    "extensions.{format} must be a plain file extension"
                )));
            }
        }
        parse_duration(&self.cache.duration)
            .map_err(|e| ConfigError::Validation(format!("cache.duration: {e}")))?;
        Ok(())
    }

    /// File extension written for `format`.
    pub fn extension(&self, format: Format) -> &str {
        self.extensions
            .get(&format)
            .map(String::as_str)
            .unwrap_or(format.as_str())
    }

    /// Encoder options for `format` (defaults when unset).
    pub fn encode_options(&self, format: Format) -> EncodeOptions {
        self.encoding.get(&format).copied().unwrap_or_default()
    }
}

/// Remote source caching settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Freshness window: `<n><unit>` with unit `s m h d w y`, or `*` for never
    /// expiring.
    pub duration: String,
    /// Directory holding fetched bytes and the cache manifest.
    pub directory: PathBuf,
    /// Ignore the query string when keying cached URLs.
    pub remove_url_query_params: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            duration: "1d".to_string(),
            directory: PathBuf::from(".cache"),
            remove_url_query_params: false,
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
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ImageConfig::default())
        .unwrap_or_else(|_| toml::Value::Table(toml::map::Map::new()))
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

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ImageConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ImageConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Parse a config from TOML text, merged over stock defaults.
pub fn parse_config(content: &str) -> Result<ImageConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    resolve_config(stock_defaults_value(), Some(overlay))
}

/// Load a config file, merged over stock defaults.
///
/// A missing file yields the stock defaults.
pub fn load_config(path: &Path) -> Result<ImageConfig, ConfigError> {
    if !path.exists() {
        return resolve_config(stock_defaults_value(), None);
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock config file with all keys and explanations.
pub fn stock_config_toml() -> &'static str {
    r##"# imgset Configuration
# ====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Widths to generate, in pixels. "auto" is the source image's own width.
# Widths larger than the source are dropped (raster sources are never
# upscaled); if all of them are dropped, the source width is used.
widths = ["auto"]

# Output formats: jpeg, png, webp, avif, svg. "auto" keeps the source format.
# svg is only produced for SVG sources and is always evaluated first.
formats = ["webp", "jpeg"]

# Maximum number of images processed at the same time.
concurrency = 10

# Public URL prefix used for each variant's url and srcset entry.
url_path = "/img/"

# Directory generated files are written to (created if missing).
output_dir = "img/"

# With an SVG source and "svg" among the formats, emit only the SVG.
svg_short_circuit = false

# Allow vector (SVG) sources to be rendered wider than their intrinsic width.
svg_allow_upscale = true

# Treat sources as this format when it cannot be detected.
# override_input_format = "svg"

# ---------------------------------------------------------------------------
# Encoder options per output format
# ---------------------------------------------------------------------------
# quality: 1-100 (jpeg, avif). speed: 1-10 (avif, 1 = slowest/best).
# [encoding.jpeg]
# quality = 80
#
# [encoding.avif]
# quality = 60
# speed = 6

# ---------------------------------------------------------------------------
# File extension overrides per output format
# ---------------------------------------------------------------------------
# [extensions]
# jpeg = "jpg"

# ---------------------------------------------------------------------------
# Remote sources
# ---------------------------------------------------------------------------
[cache]
# How long a fetched image stays fresh: 30s, 5m, 2h, 1d, 1w, 1y, or "*"
# for never. "0s" always refetches.
duration = "1d"
directory = ".cache"
# Key cached URLs without their query string.
remove_url_query_params = false
"##
}
