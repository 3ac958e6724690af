//! Image processing in pure Rust, with no system codecs.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader` probing, `usvg` for SVG |
//! | **Prepare** | decode + Lanczos3 resize, `resvg` rasterization |
//! | **Save** | JPEG / PNG / WebP / AVIF encoders from `image` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for width and height math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, FormatHook, ImageBackend, SourceMetadata};
pub use calculations::{resolve_widths, scaled_height};
pub use params::{EncodeOptions, PrepareParams, Quality, Resize, SaveParams, Width};
pub use rust_backend::RustBackend;
