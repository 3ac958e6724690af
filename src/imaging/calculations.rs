//! Pure calculation functions for output dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::Width;

/// Resolve the requested widths against a source's intrinsic width.
///
/// - [`Width::Intrinsic`] becomes `intrinsic`.
/// - Widths larger than `intrinsic` are dropped unless `allow_upscale`.
/// - If every requested width was dropped, the intrinsic width is used alone.
/// - The result is sorted ascending. Duplicates are kept: a caller may ask for
///   the same width twice on purpose.
///
/// An empty request resolves to an empty list; rejecting that is up to the
/// caller.
///
/// # Examples
/// ```
/// # use imgset::{Width, resolve_widths};
/// assert_eq!(resolve_widths(800, &[Width::Px(1200)], false), vec![800]);
/// assert_eq!(resolve_widths(800, &[Width::Intrinsic, Width::Px(400)], false), vec![400, 800]);
/// ```
pub fn resolve_widths(intrinsic: u32, requested: &[Width], allow_upscale: bool) -> Vec<u32> {
    let mut widths: Vec<u32> = requested
        .iter()
        .map(|w| match w {
            Width::Intrinsic => intrinsic,
            Width::Px(px) => *px,
        })
        .filter(|&w| allow_upscale || w <= intrinsic)
        .collect();

    // Everything was larger than the source: fall back to the source itself
    if widths.is_empty() && !requested.is_empty() {
        widths.push(intrinsic);
    }

    widths.sort_unstable();
    widths
}

/// Height for an output `width`, preserving the source aspect ratio.
///
/// Floors to whole pixels, never below 1 and saturating at `u32::MAX`.
/// The intrinsic width keeps the exact source height.
pub fn scaled_height(source: (u32, u32), width: u32) -> u32 {
    let (src_w, src_h) = source;
    if width == src_w {
        return src_h;
    }
    let height = u64::from(width) * u64::from(src_h) / u64::from(src_w.max(1));
    u32::try_from(height).unwrap_or(u32::MAX).max(1)
}
