//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the generation engine (which decides what each variant
//! needs) and the [`backend`](super::backend) (which does the actual pixel
//! work). This separation allows swapping backends (e.g. for testing with a
//! mock) without changing generation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1-100). Clamped on construction.
//! - [`Width`]: A requested output width, or the source's intrinsic width.
//! - [`EncodeOptions`]: Per-format encoder knobs, passed through untouched.
//! - [`PrepareParams`]: Decode a source and optionally resize it.
//! - [`SaveParams`]: Encode a prepared image and write it to disk.

use crate::format::Format;
use crate::source::SourceInput;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

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

    /// Encoder default for a format when the config leaves quality unset.
    pub fn default_for(format: Format) -> Self {
        match format {
            Format::Avif => Self(60),
            _ => Self(80),
        }
    }
}

/// A requested output width.
///
/// `Intrinsic` stands for the source's own width (`"auto"` in config files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WidthRepr", into = "WidthRepr")]
pub enum Width {
    Intrinsic,
    Px(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WidthRepr {
    Px(u32),
    Keyword(String),
}

impl TryFrom<WidthRepr> for Width {
    type Error = String;

    fn try_from(repr: WidthRepr) -> Result<Self, Self::Error> {
        match repr {
            WidthRepr::Px(px) => Ok(Width::Px(px)),
            WidthRepr::Keyword(k) if k.eq_ignore_ascii_case("auto") => Ok(Width::Intrinsic),
            WidthRepr::Keyword(k) => Err(format!("expected a pixel width or \"auto\", got {k:?}")),
        }
    }
}

impl From<Width> for WidthRepr {
    fn from(width: Width) -> Self {
        match width {
            Width::Intrinsic => WidthRepr::Keyword("auto".to_string()),
            Width::Px(px) => WidthRepr::Px(px),
        }
    }
}

impl From<u32> for Width {
    fn from(px: u32) -> Self {
        Width::Px(px)
    }
}

/// Encoder options for one output format.
///
/// Unset fields fall back to encoder defaults. `quality` applies to JPEG and
/// AVIF; `speed` (1 = slowest/best, 10 = fastest) applies to AVIF only. PNG
/// and WebP (lossless) ignore both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<u8>,
}

impl EncodeOptions {
    pub fn quality_for(&self, format: Format) -> Quality {
        self.quality
            .map(Quality::new)
            .unwrap_or_else(|| Quality::default_for(format))
    }
}

/// Target size for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
    /// Leave the image at its decoded size if the target is larger.
    pub without_enlargement: bool,
}

/// Parameters for decoding a source into a fresh image handle.
#[derive(Debug, Clone)]
pub struct PrepareParams {
    pub source: SourceInput,
    /// `None` keeps the intrinsic size.
    pub resize: Option<Resize>,
}

/// Parameters for encoding a prepared image to a file.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveParams {
    pub output: PathBuf,
    pub format: Format,
    pub options: EncodeOptions,
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
    fn encode_options_fall_back_to_format_defaults() {
        let unset = EncodeOptions::default();
        assert_eq!(unset.quality_for(Format::Jpeg).value(), 80);
        assert_eq!(unset.quality_for(Format::Avif).value(), 60);

        let set = EncodeOptions {
            quality: Some(95),
            speed: None,
        };
        assert_eq!(set.quality_for(Format::Avif).value(), 95);
    }

    #[test]
    fn width_accepts_auto_and_pixels() {
        let widths: Vec<Width> = serde_json::from_str(r#"["auto", 400, "AUTO"]"#).unwrap();
        assert_eq!(widths, vec![Width::Intrinsic, Width::Px(400), Width::Intrinsic]);
        assert!(serde_json::from_str::<Width>(r#""wide""#).is_err());
    }

    #[test]
    fn width_serializes_back_to_auto() {
        let json = serde_json::to_string(&vec![Width::Intrinsic, Width::Px(640)]).unwrap();
        assert_eq!(json, r#"["auto",640]"#);
    }
}
