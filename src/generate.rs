//! Variant generation.
//!
//! Takes a [`VariantPlan`] and realizes it on disk. Every variant is written
//! independently:
//!
//! - **SVG variants** are the source document itself: buffered sources are
//!   written out, file sources are copied.
//! - **Raster variants** decode a fresh image from the source, resize it when
//!   needed, and encode it. A registered [`FormatHook`](crate::imaging::FormatHook)
//!   for the format takes over encoding; otherwise the backend encodes with the
//!   configured [`EncodeOptions`](crate::imaging::EncodeOptions).
//!
//! Each variant's `size` is filled in with the bytes written.
//!
//! ## Parallel Processing
//!
//! Variants are written in parallel using [rayon](https://docs.rs/rayon), with
//! no ordering between formats or widths. The first failure fails the whole
//! call; no partial plan is returned.
//!
//! ## Resizing
//!
//! A raster variant is resized when its width is below the source's intrinsic
//! width, or when the source is an SVG and upscaling is allowed. Raster
//! sources are always resized with enlargement forbidden.

use crate::format::Format;
use crate::imaging::{BackendError, ImageBackend, PrepareParams, Resize, SaveParams, SourceMetadata};
use crate::pipeline::Options;
use crate::plan::{VariantPlan, VariantSpec};
use crate::source::{SourceData, SourceInput};
use rayon::prelude::*;
use std::fs;
use tracing::debug;

/// Write every variant in `plan`, returning the plan with sizes filled in.
pub fn generate_variants(
    backend: &dyn ImageBackend,
    source: &SourceInput,
    metadata: &SourceMetadata,
    mut plan: VariantPlan,
    options: &Options,
) -> Result<VariantPlan, BackendError> {
    plan.groups_mut()
        .par_iter_mut()
        .flat_map(|(_, variants)| variants.par_iter_mut())
        .try_for_each(|spec| -> Result<(), BackendError> {
            let size = write_variant(backend, source, metadata, spec, options)?;
            debug!(
                output = %spec.output_path.display(),
                format = %spec.format,
                width = spec.width,
                size,
                "Wrote variant"
            );
            spec.size = Some(size);
            Ok(())
        })?;
    Ok(plan)
}

fn write_variant(
    backend: &dyn ImageBackend,
    source: &SourceInput,
    metadata: &SourceMetadata,
    spec: &VariantSpec,
    options: &Options,
) -> Result<u64, BackendError> {
    if spec.format == Format::Svg {
        return match &source.data {
            SourceData::Buffer(bytes) => {
                fs::write(&spec.output_path, bytes)?;
                Ok(bytes.len() as u64)
            }
            SourceData::File(path) => Ok(fs::copy(path, &spec.output_path)?),
        };
    }

    let config = &options.config;
    let vector_upscale =
        metadata.format.or(config.override_input_format) == Some(Format::Svg) && config.svg_allow_upscale;
    let resize = (spec.width < metadata.width || vector_upscale).then_some(Resize {
        width: spec.width,
        height: spec.height,
        without_enlargement: !vector_upscale,
    });

    let image = backend.prepare(&PrepareParams {
        source: source.clone(),
        resize,
    })?;

    if let Some(hook) = options.format_hooks.get(&spec.format) {
        let bytes = hook.encode(&image)?;
        fs::write(&spec.output_path, &bytes)?;
        return Ok(bytes.len() as u64);
    }

    backend.save(
        &image,
        &SaveParams {
            output: spec.output_path.clone(),
            format: spec.format,
            options: config.encode_options(spec.format),
        },
    )
}
