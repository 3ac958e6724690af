//! Source resolution: turning what the caller handed us into decodable input.
//!
//! A source is a local path, an absolute URL, or a byte buffer. URLs are
//! fetched (through the on-disk asset cache) into a buffer; paths pass through
//! unchanged. Every resolved input carries an **identity** string (the path or
//! URL it came from) because output filenames are derived from it and a bare
//! buffer has nothing to hash.

use crate::config::CacheConfig;
use crate::fetch::Fetcher;
use crate::pipeline::ImageError;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// A source as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A local path or an absolute URL.
    Location(String),
    /// Raw encoded image bytes. Needs an explicit identity.
    Buffer(Bytes),
}

impl ImageSource {
    pub fn is_empty(&self) -> bool {
        match self {
            ImageSource::Location(s) => s.trim().is_empty(),
            ImageSource::Buffer(b) => b.is_empty(),
        }
    }
}

impl From<&str> for ImageSource {
    fn from(s: &str) -> Self {
        ImageSource::Location(s.to_string())
    }
}

impl From<String> for ImageSource {
    fn from(s: String) -> Self {
        ImageSource::Location(s)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Location(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::from(path.as_path())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Buffer(Bytes::from(bytes))
    }
}

impl From<Bytes> for ImageSource {
    fn from(bytes: Bytes) -> Self {
        ImageSource::Buffer(bytes)
    }
}

/// Where the encoded bytes of a resolved source live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceData {
    File(PathBuf),
    Buffer(Bytes),
}

/// A resolved source: its identity plus its bytes (or where to find them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInput {
    pub identity: String,
    pub data: SourceData,
}

impl SourceInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            identity: path.to_string_lossy().into_owned(),
            data: SourceData::File(path),
        }
    }

    pub fn buffer(identity: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            identity: identity.into(),
            data: SourceData::Buffer(bytes.into()),
        }
    }

    /// Encoded size of the source in bytes.
    ///
    /// Free for buffers; a metadata call for files.
    pub fn byte_len(&self) -> io::Result<u64> {
        match &self.data {
            SourceData::Buffer(bytes) => Ok(bytes.len() as u64),
            SourceData::File(path) => Ok(std::fs::metadata(path)?.len()),
        }
    }

    /// Read the full encoded contents.
    pub fn read_bytes(&self) -> io::Result<Bytes> {
        match &self.data {
            SourceData::Buffer(bytes) => Ok(bytes.clone()),
            SourceData::File(path) => std::fs::read(path).map(Bytes::from),
        }
    }
}

/// True if `location` is an absolute URL with a host (`https://…`).
///
/// Relative and absolute filesystem paths fail to parse; Windows drive
/// letters parse but have no host.
pub fn is_remote_url(location: &str) -> bool {
    Url::parse(location).is_ok_and(|url| url.has_host())
}

/// Reject sources that can never produce output.
///
/// Runs before a job is queued so configuration mistakes surface immediately.
pub fn check_source(source: &ImageSource, identity: Option<&str>) -> Result<(), ImageError> {
    if source.is_empty() {
        return Err(ImageError::Configuration(
            "`src` is required (a file path, an absolute URL, or an image buffer)".into(),
        ));
    }
    if let ImageSource::Buffer(_) = source
        && identity.is_none_or(|id| id.trim().is_empty())
    {
        return Err(ImageError::Configuration(
            "buffer input requires `source_identity` to derive output filenames".into(),
        ));
    }
    Ok(())
}

/// Resolve a source into decodable input, fetching remote URLs.
pub async fn resolve_source(
    source: ImageSource,
    identity: Option<&str>,
    fetcher: &dyn Fetcher,
    cache: &CacheConfig,
) -> Result<SourceInput, ImageError> {
    check_source(&source, identity)?;

    match source {
        ImageSource::Location(location) if is_remote_url(&location) => {
            let bytes = fetcher.fetch(&location, cache).await?;
            Ok(SourceInput::buffer(location, bytes))
        }
        ImageSource::Location(location) => Ok(SourceInput {
            identity: location.clone(),
            data: SourceData::File(PathBuf::from(location)),
        }),
        ImageSource::Buffer(bytes) => {
            // check_source guarantees the identity
            let identity = identity.unwrap_or_default().to_string();
            Ok(SourceInput::buffer(identity, bytes))
        }
    }
}
