//! Output format tags and the format resolution policy.
//!
//! A request names formats either explicitly (`webp`, `jpeg`, ...) or with the
//! `auto` placeholder, meaning "whatever the source already is". The placeholder
//! is only resolved once the source has been probed, so it survives resolution
//! here untouched.
//!
//! ## SVG first
//!
//! [`resolve_formats`] moves any `svg` request to the front. The planner
//! evaluates formats in order, and an SVG match may short-circuit everything
//! after it, so it has to be seen before any raster work is committed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown image format: {0:?}")]
pub struct ParseFormatError(pub String);

/// An image format the pipeline can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    Jpeg,
    Png,
    Webp,
    Avif,
    Svg,
}

impl Format {
    /// The canonical tag, also the default file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Webp => "webp",
            Format::Avif => "avif",
            Format::Svg => "svg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Jpeg => "image/jpeg",
            Format::Png => "image/png",
            Format::Webp => "image/webp",
            Format::Avif => "image/avif",
            Format::Svg => "image/svg+xml",
        }
    }

    pub fn is_vector(self) -> bool {
        self == Format::Svg
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Format::Jpeg),
            "png" => Ok(Format::Png),
            "webp" => Ok(Format::Webp),
            "avif" => Ok(Format::Avif),
            "svg" => Ok(Format::Svg),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Format {
    type Error = ParseFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Format> for String {
    fn from(format: Format) -> Self {
        format.as_str().to_string()
    }
}

/// One requested output format.
///
/// `Source` keeps the source's own format (`"auto"` in config files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FormatRequest {
    Source,
    Format(Format),
}

impl FormatRequest {
    pub fn is_svg(self) -> bool {
        self == FormatRequest::Format(Format::Svg)
    }
}

impl From<Format> for FormatRequest {
    fn from(format: Format) -> Self {
        FormatRequest::Format(format)
    }
}

impl FromStr for FormatRequest {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            Ok(FormatRequest::Source)
        } else {
            trimmed.parse().map(FormatRequest::Format)
        }
    }
}

impl TryFrom<String> for FormatRequest {
    type Error = ParseFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FormatRequest> for String {
    fn from(request: FormatRequest) -> Self {
        match request {
            FormatRequest::Source => "auto".to_string(),
            FormatRequest::Format(f) => f.as_str().to_string(),
        }
    }
}

/// Parse a comma-separated format list such as `"webp,jpeg"`.
///
/// An empty string yields an empty list; empty entries between commas mean
/// `auto`.
pub fn parse_formats(list: &str) -> Result<Vec<FormatRequest>, ParseFormatError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',').map(str::parse).collect()
}

/// Order requested formats for evaluation: `svg` first, everything else keeps
/// its relative order.
pub fn resolve_formats(requested: &[FormatRequest]) -> Vec<FormatRequest> {
    let mut formats = requested.to_vec();
    // stable: `false` (svg) sorts before `true`
    formats.sort_by_key(|f| !f.is_svg());
    formats
}
