//! # imgset
//!
//! Plans and generates responsive image variants. Give it one source image (a
//! local file, a remote URL, or a byte buffer) plus the widths and formats you
//! want, and it writes every resized, re-encoded variant and describes each one
//! (dimensions, URL, byte size) for `srcset` markup.
//!
//! ```no_run
//! use imgset::{Format, ImageConfig, ImagePipeline, Options, Width};
//!
//! # async fn run() -> Result<(), imgset::ImageError> {
//! let pipeline = ImagePipeline::new()?;
//! let options = Options::new(ImageConfig {
//!     widths: vec![Width::Px(400), Width::Intrinsic],
//!     ..ImageConfig::default()
//! });
//! let plan = pipeline.generate("photos/cat.jpg", &options).await?;
//! println!("{}", plan.srcset(Format::Webp).unwrap_or_default());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture: Plan, Then Generate
//!
//! ```text
//! 1. Resolve   src       →  SourceInput      (fetch URLs through the disk cache)
//! 2. Identify  input     →  SourceMetadata   (width, height, format)
//! 3. Plan      metadata  →  VariantPlan      (pure: names, paths, URLs, sizes)
//! 4. Generate  plan      →  files on disk    (parallel decode/resize/encode)
//! ```
//!
//! Planning is a pure function of the metadata and options. The prediction
//! calls stop after step 3, which is why a predicted plan always matches the
//! one `generate` returns, apart from the byte sizes.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`format`] | Format tags, MIME types, `auto` requests, svg-first ordering |
//! | [`naming`] | Stable hashed filenames, output paths and URLs |
//! | [`plan`] | The variant planner and the [`VariantPlan`] it returns |
//! | [`generate`] | Writes a plan's files in parallel |
//! | [`queue`] | Bounded FIFO job queue shared by all `generate` calls |
//! | [`source`] | Turns paths, URLs and buffers into decodable input |
//! | [`fetch`] | HTTP fetching of remote sources |
//! | [`cache`] | On-disk cache of fetched sources |
//! | [`config`] | `imgset.toml` loading, validation, and merging over defaults |
//! | [`imaging`] | Backend trait, pure-Rust codec, width/height math |
//! | [`pipeline`] | The public entry points tying it all together |
//!
//! # Design Decisions
//!
//! ## Deterministic Names
//!
//! Filenames derive from a hash of the source's identity, never from a counter
//! or timestamp. Regenerating with the same config overwrites the same files,
//! and markup referencing them stays valid.
//!
//! ## No Upscaling of Rasters
//!
//! Widths larger than a raster source are dropped; if none remain, the
//! source's own width is used. SVG sources may be rendered larger because
//! nothing is lost.
//!
//! ## Pure-Rust Codecs
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling, JPEG,
//! PNG, WebP and AVIF encoders) and `resvg` for SVG rasterization. No system
//! libraries are needed.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod format;
pub mod generate;
pub mod imaging;
pub mod naming;
pub mod pipeline;
pub mod plan;
pub mod queue;
pub mod source;

pub use config::{CacheConfig, ImageConfig};
pub use format::{Format, FormatRequest, parse_formats, resolve_formats};
pub use imaging::{FormatHook, RustBackend, Width, resolve_widths};
pub use naming::FilenameFormat;
pub use pipeline::{ImageError, ImagePipeline, Options, predict_by_dimensions};
pub use plan::{VariantPlan, VariantSpec};
pub use queue::JobQueue;
pub use source::ImageSource;
