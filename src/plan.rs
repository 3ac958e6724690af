//! Variant planning.
//!
//! [`plan_variants`] turns a source's probed metadata plus the request options
//! into the full set of outputs: one [`VariantSpec`] per (format, width), each
//! already named and located. It is a pure function, and both the prediction
//! calls and the generation path go through it, so a predicted plan and a
//! generated one agree on every field except `size`.
//!
//! ## Policy
//!
//! Formats are evaluated in resolved order (`svg` first):
//!
//! - `svg` yields one variant at the intrinsic size, but only when the source
//!   is itself an SVG. A raster source skips it. With `svg_short_circuit` set,
//!   nothing after the SVG is evaluated.
//! - Raster formats get one variant per resolved width. Vector sources may be
//!   upscaled (`svg_allow_upscale`); raster sources never are.
//!
//! The width only appears in a filename when the format produces more than one
//! width and that width is not the intrinsic one, so a single-size request
//! keeps the same filename across configuration changes.

use crate::format::{Format, FormatRequest, resolve_formats};
use crate::imaging::{SourceMetadata, resolve_widths, scaled_height};
use crate::naming::locate;
use crate::pipeline::{ImageError, Options};
use serde::Serialize;
use serde::ser::SerializeMap;
use std::path::PathBuf;
use tracing::debug;

/// One output file: what it is, where it goes, and how it is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSpec {
    pub format: Format,
    pub width: u32,
    pub height: u32,
    pub filename: String,
    pub output_path: PathBuf,
    pub url: String,
    pub mime_type: &'static str,
    /// `"<url> <width>w"`, ready to join into a `srcset` attribute.
    pub srcset_entry: String,
    /// Bytes written. Unset until generated (SVG variants know it up front).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Variants grouped by format.
///
/// Groups keep the order formats were evaluated in; each group is sorted
/// ascending by width. A format that was evaluated but produced nothing (an
/// `svg` request against a raster source) has an empty group. Serializes as a
/// JSON object keyed by format tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantPlan {
    groups: Vec<(Format, Vec<VariantSpec>)>,
}

impl VariantPlan {
    /// Variants for one format, if that format was evaluated.
    pub fn get(&self, format: Format) -> Option<&[VariantSpec]> {
        self.groups
            .iter()
            .find(|(f, _)| *f == format)
            .map(|(_, variants)| variants.as_slice())
    }

    /// Formats in evaluation order.
    pub fn formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.groups.iter().map(|(f, _)| *f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Format, &[VariantSpec])> {
        self.groups.iter().map(|(f, v)| (*f, v.as_slice()))
    }

    /// Every variant, group by group.
    pub fn variants(&self) -> impl Iterator<Item = &VariantSpec> {
        self.groups.iter().flat_map(|(_, v)| v.iter())
    }

    #[cfg(test)]
    pub(crate) fn variants_mut(&mut self) -> impl Iterator<Item = &mut VariantSpec> {
        self.groups.iter_mut().flat_map(|(_, v)| v.iter_mut())
    }

    pub(crate) fn groups_mut(&mut self) -> &mut [(Format, Vec<VariantSpec>)] {
        &mut self.groups
    }

    /// Total number of variants.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, v)| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `srcset` attribute value for one format.
    pub fn srcset(&self, format: Format) -> Option<String> {
        let variants = self.get(format)?;
        Some(
            variants
                .iter()
                .map(|v| v.srcset_entry.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    fn group_mut(&mut self, format: Format) -> &mut Vec<VariantSpec> {
        let idx = match self.groups.iter().position(|(f, _)| *f == format) {
            Some(idx) => idx,
            None => {
                self.groups.push((format, Vec::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx].1
    }
}

impl Serialize for VariantPlan {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (format, variants) in &self.groups {
            map.serialize_entry(format, variants)?;
        }
        map.end()
    }
}

fn build_spec(
    src: &str,
    format: Format,
    (width, height): (u32, u32),
    width_in_name: bool,
    options: &Options,
) -> VariantSpec {
    let config = &options.config;
    let location = locate(
        src,
        width_in_name.then_some(width),
        config.extension(format),
        config,
        options.filename_format.as_ref(),
    );
    VariantSpec {
        format,
        width,
        height,
        srcset_entry: format!("{} {}w", location.url, width),
        filename: location.filename,
        output_path: location.output_path,
        url: location.url,
        mime_type: format.mime_type(),
        size: None,
    }
}

/// Plan every variant for one source.
///
/// `src` is the source identity used for naming. Performs no I/O: an SVG
/// variant's `size` is copied from `metadata.size`.
pub fn plan_variants(
    src: &str,
    metadata: &SourceMetadata,
    options: &Options,
) -> Result<VariantPlan, ImageError> {
    let config = &options.config;
    if metadata.width == 0 || metadata.height == 0 {
        return Err(ImageError::Configuration(format!(
            "source dimensions must be positive, got {}x{}",
            metadata.width, metadata.height
        )));
    }

    let source_format = metadata.format.or(config.override_input_format);
    let source_is_svg = source_format == Some(Format::Svg);
    let mut plan = VariantPlan::default();

    for request in resolve_formats(&config.formats) {
        let format = match request {
            FormatRequest::Format(format) => format,
            FormatRequest::Source => source_format.ok_or_else(|| {
                ImageError::Configuration(format!(
                    "cannot use the source format for {src}: it could not be determined \
                     (set `override_input_format` or list explicit formats)"
                ))
            })?,
        };

        if format == Format::Svg {
            if !source_is_svg {
                debug!(src, "Skipping svg output: source is a raster image");
                plan.group_mut(format);
                continue;
            }
            let mut spec = build_spec(
                src,
                format,
                (metadata.width, metadata.height),
                false,
                options,
            );
            spec.size = metadata.size;
            plan.group_mut(format).push(spec);
            if config.svg_short_circuit {
                break;
            }
            continue;
        }

        if config.widths.is_empty() {
            return Err(ImageError::Configuration(
                "`widths` must list at least one width".into(),
            ));
        }
        let widths = resolve_widths(
            metadata.width,
            &config.widths,
            source_is_svg && config.svg_allow_upscale,
        );
        let multiple = widths.len() > 1;
        let specs: Vec<VariantSpec> = widths
            .iter()
            .map(|&width| {
                let height = scaled_height((metadata.width, metadata.height), width);
                let width_in_name = multiple && width != metadata.width;
                build_spec(src, format, (width, height), width_in_name, options)
            })
            .collect();
        plan.group_mut(format).extend(specs);
    }

    for (_, variants) in plan.groups_mut() {
        variants.sort_by_key(|v| v.width);
    }
    Ok(plan)
}
