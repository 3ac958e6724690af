//! Pure Rust image processing backend.
//!
//! Everything is statically linked; no system codecs are required.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Probe (raster) | `image::ImageReader::with_guessed_format` + `into_dimensions` |
//! | Probe (SVG) | `resvg::usvg::Tree::size` |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Rasterize SVG | `resvg::render` into a `tiny_skia::Pixmap` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` (default 80) |
//! | Encode → PNG | `PngEncoder` |
//! | Encode → WebP | `WebPEncoder::new_lossless` |
//! | Encode → AVIF | `AvifEncoder::new_with_speed_quality` (rav1e, speed 6, quality 60) |
//!
//! AVIF is output-only: the `image` crate's `"avif"` feature enables the
//! encoder, not a decoder.

use super::backend::{BackendError, ImageBackend, SourceMetadata};
use super::params::{EncodeOptions, PrepareParams, Resize, SaveParams};
use crate::format::Format;
use crate::source::{SourceData, SourceInput};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use resvg::{tiny_skia, usvg};
use std::borrow::Cow;
use std::io::{BufRead, Cursor, Read, Seek};
use std::path::Path;
use tracing::trace;

/// AVIF encoder speed when the config leaves it unset (1 = slowest/best).
const DEFAULT_AVIF_SPEED: u8 = 6;

/// How many leading bytes are inspected when sniffing for SVG markup.
const SNIFF_LEN: usize = 1024;

/// Pure Rust backend using the `image` and `resvg` crates.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }

    /// Encode an image into `format`'s container.
    ///
    /// Exposed so format hooks can fall back to the stock encoders.
    pub fn encode(
        image: &DynamicImage,
        format: Format,
        options: &EncodeOptions,
    ) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        let result = match format {
            Format::Jpeg => {
                let quality = options.quality_for(format).value() as u8;
                // JPEG has no alpha channel
                let img = match image {
                    DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(image),
                    _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
                };
                img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
            }
            Format::Png => {
                let img = match image {
                    DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                        Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
                    }
                    _ => Cow::Borrowed(image),
                };
                img.write_with_encoder(PngEncoder::new(&mut buf))
            }
            Format::Webp => DynamicImage::ImageRgba8(image.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut buf)),
            Format::Avif => {
                let quality = options.quality_for(format).value() as u8;
                let speed = options.speed.unwrap_or(DEFAULT_AVIF_SPEED);
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut buf, speed, quality))
            }
            Format::Svg => {
                return Err(BackendError::ProcessingFailed(
                    "Cannot encode a raster image as SVG".into(),
                ));
            }
        };
        result.map_err(|e| {
            BackendError::ProcessingFailed(format!("{} encode failed: {}", format, e))
        })?;
        Ok(buf)
    }
}

/// True if the leading bytes look like SVG markup.
fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // a multi-byte character may straddle the cut
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default(),
    };
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<svg") {
        return true;
    }
    (text.starts_with("<?xml") || text.starts_with("<!--") || text.starts_with("<!DOCTYPE"))
        && text.contains("<svg")
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Decide whether a source is an SVG document.
fn is_svg(source: &SourceInput) -> Result<bool, BackendError> {
    match &source.data {
        SourceData::Buffer(bytes) => Ok(looks_like_svg(bytes)),
        SourceData::File(path) if has_extension(path, "svg") => Ok(true),
        SourceData::File(path) => {
            let mut head = Vec::with_capacity(SNIFF_LEN);
            std::fs::File::open(path)?
                .take(SNIFF_LEN as u64)
                .read_to_end(&mut head)?;
            Ok(looks_like_svg(&head))
        }
    }
}

fn to_format(format: ImageFormat) -> Option<Format> {
    match format {
        ImageFormat::Jpeg => Some(Format::Jpeg),
        ImageFormat::Png => Some(Format::Png),
        ImageFormat::WebP => Some(Format::Webp),
        ImageFormat::Avif => Some(Format::Avif),
        _ => None,
    }
}

fn probe_raster<R: BufRead + Seek>(
    reader: ImageReader<R>,
    identity: &str,
) -> Result<SourceMetadata, BackendError> {
    let format = reader.format().and_then(to_format);
    let (width, height) = reader.into_dimensions().map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to read dimensions of {identity}: {e}"))
    })?;
    Ok(SourceMetadata::new(width, height, format))
}

fn decode_raster(source: &SourceInput) -> Result<DynamicImage, BackendError> {
    let decoded = match &source.data {
        SourceData::File(path) => ImageReader::open(path)?.with_guessed_format()?.decode(),
        SourceData::Buffer(bytes) => ImageReader::new(Cursor::new(bytes.as_ref()))
            .with_guessed_format()?
            .decode(),
    };
    decoded.map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to decode {}: {}", source.identity, e))
    })
}

fn parse_svg(source: &SourceInput) -> Result<usvg::Tree, BackendError> {
    let bytes = source.read_bytes()?;
    usvg::Tree::from_data(&bytes, &usvg::Options::default()).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to parse SVG {}: {}", source.identity, e))
    })
}

/// Intrinsic pixel size of an SVG document.
fn svg_size(tree: &usvg::Tree) -> (u32, u32) {
    let size = tree.size();
    (
        (size.width().round() as u32).max(1),
        (size.height().round() as u32).max(1),
    )
}

/// Rasterize an SVG document at exactly `width` × `height`.
fn rasterize_svg(tree: &usvg::Tree, width: u32, height: u32) -> Result<DynamicImage, BackendError> {
    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
        BackendError::ProcessingFailed(format!("Invalid raster size {width}x{height}"))
    })?;
    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha
    let rgba: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(width, height, rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| BackendError::ProcessingFailed("Failed to build image from SVG raster".into()))
}

/// Apply a resize, leaving the image alone if it would enlarge and that is
/// not allowed.
fn target_size(intrinsic: (u32, u32), resize: Option<Resize>) -> (u32, u32) {
    match resize {
        Some(r) if r.without_enlargement && r.width > intrinsic.0 => intrinsic,
        Some(r) => (r.width, r.height),
        None => intrinsic,
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &SourceInput) -> Result<SourceMetadata, BackendError> {
        if is_svg(source)? {
            let (width, height) = svg_size(&parse_svg(source)?);
            return Ok(SourceMetadata::new(width, height, Some(Format::Svg)));
        }
        match &source.data {
            SourceData::File(path) => {
                probe_raster(ImageReader::open(path)?.with_guessed_format()?, &source.identity)
            }
            SourceData::Buffer(bytes) => probe_raster(
                ImageReader::new(Cursor::new(bytes.as_ref())).with_guessed_format()?,
                &source.identity,
            ),
        }
    }

    fn prepare(&self, params: &PrepareParams) -> Result<DynamicImage, BackendError> {
        if is_svg(&params.source)? {
            let tree = parse_svg(&params.source)?;
            let (width, height) = target_size(svg_size(&tree), params.resize);
            trace!(source = %params.source.identity, width, height, "Rasterizing SVG");
            return rasterize_svg(&tree, width, height);
        }

        let img = decode_raster(&params.source)?;
        let intrinsic = (img.width(), img.height());
        let (width, height) = target_size(intrinsic, params.resize);
        if (width, height) == intrinsic {
            return Ok(img);
        }
        Ok(img.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn save(&self, image: &DynamicImage, params: &SaveParams) -> Result<u64, BackendError> {
        let bytes = Self::encode(image, params.format, &params.options)?;
        std::fs::write(&params.output, &bytes)?;
        Ok(bytes.len() as u64)
    }
}
