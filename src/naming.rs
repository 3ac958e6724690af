//! Output filenames, paths and URLs for generated variants.
//!
//! Every variant of a source shares a short identifier derived from the
//! source's identity (its path or URL). The identifier is a truncated SHA-256
//! of that string, so the same source always maps to the same names and
//! regenerating with the same config overwrites rather than accumulates files.
//!
//! ## Default rule
//!
//! - with a width: `{id}-{width}.{ext}` → `1b2d8c3f-400.webp`
//! - without: `{id}.{ext}` → `1b2d8c3f.webp`
//!
//! A custom [`FilenameFormat`] may replace the rule. Returning `None` from it
//! falls back to the default.

use crate::config::ImageConfig;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of hex characters kept from the source hash.
const ID_LEN: usize = 8;

/// Everything a naming strategy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct NameRequest<'a> {
    /// Short identifier derived from `src`.
    pub id: &'a str,
    /// Source identity (path or URL).
    pub src: &'a str,
    /// Width to embed, when the default rule would embed one.
    pub width: Option<u32>,
    /// Output file extension (format tag or its configured override).
    pub extension: &'a str,
    pub config: &'a ImageConfig,
}

/// User-supplied naming strategy.
#[derive(Clone)]
pub struct FilenameFormat(Arc<dyn Fn(&NameRequest<'_>) -> Option<String> + Send + Sync>);

impl FilenameFormat {
    pub fn new(f: impl Fn(&NameRequest<'_>) -> Option<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, request: &NameRequest<'_>) -> Option<String> {
        (self.0)(request)
    }
}

impl fmt::Debug for FilenameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FilenameFormat(..)")
    }
}

/// Short, stable identifier for a source identity.
pub fn short_id(src: &str) -> String {
    let digest = Sha256::digest(src.as_bytes());
    let mut hex = format!("{:x}", digest);
    hex.truncate(ID_LEN);
    hex
}

/// Derive the filename for one variant.
pub fn derive_filename(
    src: &str,
    width: Option<u32>,
    extension: &str,
    config: &ImageConfig,
    strategy: Option<&FilenameFormat>,
) -> String {
    let id = short_id(src);

    if let Some(strategy) = strategy {
        let request = NameRequest {
            id: &id,
            src,
            width,
            extension,
            config,
        };
        if let Some(name) = strategy.call(&request).filter(|n| !n.is_empty()) {
            return name;
        }
    }

    match width {
        Some(w) => format!("{id}-{w}.{extension}"),
        None => format!("{id}.{extension}"),
    }
}

/// Join a public URL prefix and a filename with exactly one slash.
pub fn join_url(prefix: &str, filename: &str) -> String {
    if prefix.is_empty() {
        return filename.to_string();
    }
    format!("{}/{}", prefix.trim_end_matches('/'), filename)
}

/// Where a variant lands on disk and how it is addressed publicly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantLocation {
    pub filename: String,
    pub output_path: PathBuf,
    pub url: String,
}

/// Derive filename, output path and URL in one go.
pub fn locate(
    src: &str,
    width: Option<u32>,
    extension: &str,
    config: &ImageConfig,
    strategy: Option<&FilenameFormat>,
) -> VariantLocation {
    let filename = derive_filename(src, width, extension, config, strategy);
    VariantLocation {
        output_path: Path::new(&config.output_dir).join(&filename),
        url: join_url(&config.url_path, &filename),
        filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_stable_and_short() {
        let a = short_id("photos/cat.jpg");
        let b = short_id("photos/cat.jpg");
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn short_id_differs_per_source() {
        assert_ne!(short_id("photos/cat.jpg"), short_id("photos/dog.jpg"));
    }

    #[test]
    fn default_name_with_width() {
        let config = ImageConfig::default();
        let id = short_id("cat.jpg");
        assert_eq!(
            derive_filename("cat.jpg", Some(400), "webp", &config, None),
            format!("{id}-400.webp")
        );
    }

    #[test]
    fn default_name_without_width() {
        let config = ImageConfig::default();
        let id = short_id("cat.jpg");
        assert_eq!(
            derive_filename("cat.jpg", None, "jpeg", &config, None),
            format!("{id}.jpeg")
        );
    }

    #[test]
    fn strategy_overrides_default() {
        let config = ImageConfig::default();
        let strategy = FilenameFormat::new(|req| {
            let stem = req.src.rsplit('/').next()?.split('.').next()?;
            Some(match req.width {
                Some(w) => format!("{stem}-{w}w.{}", req.extension),
                None => format!("{stem}.{}", req.extension),
            })
        });

        assert_eq!(
            derive_filename("photos/cat.jpg", Some(320), "webp", &config, Some(&strategy)),
            "cat-320w.webp"
        );
        assert_eq!(
            derive_filename("photos/cat.jpg", None, "png", &config, Some(&strategy)),
            "cat.png"
        );
    }

    #[test]
    fn strategy_returning_none_falls_back() {
        let config = ImageConfig::default();
        let strategy = FilenameFormat::new(|req| (req.extension == "avif").then(|| "x.avif".into()));
        let id = short_id("cat.jpg");

        assert_eq!(
            derive_filename("cat.jpg", Some(100), "webp", &config, Some(&strategy)),
            format!("{id}-100.webp")
        );
        assert_eq!(
            derive_filename("cat.jpg", Some(100), "avif", &config, Some(&strategy)),
            "x.avif"
        );
    }

    #[test]
    fn strategy_sees_id_and_config() {
        let config = ImageConfig {
            url_path: "/assets/".into(),
            ..ImageConfig::default()
        };
        let strategy =
            FilenameFormat::new(|req| Some(format!("{}{}.{}", req.config.url_path.len(), req.id, req.extension)));
        let id = short_id("a.png");
        assert_eq!(
            derive_filename("a.png", None, "png", &config, Some(&strategy)),
            format!("8{id}.png")
        );
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("/img/", "a.webp"), "/img/a.webp");
        assert_eq!(join_url("/img", "a.webp"), "/img/a.webp");
        assert_eq!(join_url("https://cdn.example.com/i/", "a.webp"), "https://cdn.example.com/i/a.webp");
        assert_eq!(join_url("", "a.webp"), "a.webp");
    }

    #[test]
    fn locate_joins_output_dir_and_url_path() {
        let config = ImageConfig {
            output_dir: "dist/img".into(),
            url_path: "/img/".into(),
            ..ImageConfig::default()
        };
        let loc = locate("cat.jpg", Some(400), "webp", &config, None);
        let id = short_id("cat.jpg");

        assert_eq!(loc.filename, format!("{id}-400.webp"));
        assert_eq!(loc.output_path, Path::new("dist/img").join(format!("{id}-400.webp")));
        assert_eq!(loc.url, format!("/img/{id}-400.webp"));
    }
}
