//! On-disk cache for remote source images.
//!
//! Fetching the same remote image on every run is slow and unfriendly to the
//! origin server. This module keeps fetched bytes on disk and serves them
//! again while they are fresh.
//!
//! # Design
//!
//! ## Cache keys
//!
//! Entries are keyed by the SHA-256 of the source URL. With
//! `remove_url_query_params` set, the query string is dropped before hashing,
//! so `photo.jpg?v=1` and `photo.jpg?v=2` share one entry.
//!
//! ## Freshness
//!
//! Each entry records when it was stored. It is fresh while its age is below
//! the configured duration: `<n><unit>` with unit `s`, `m`, `h`, `d`, `w` or
//! `y`, or `*` for entries that never expire. `0s` makes every entry stale.
//!
//! ## Storage
//!
//! ```text
//! .cache/
//! ├── .asset-cache.json      # manifest: key → { url, cached_at }
//! ├── 3f7a…c9.buf            # fetched bytes, one file per key
//! └── …
//! ```
//!
//! The manifest is versioned. A missing, corrupt, or outdated manifest loads as
//! empty, which simply means everything is fetched again.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tracing::trace;
use url::Url;

/// Name of the cache manifest file within the cache directory.
const MANIFEST_FILENAME: &str = ".asset-cache.json";

/// Version of the cache manifest format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const MANIFEST_VERSION: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid duration {0:?} (expected e.g. \"30s\", \"2h\", \"1d\", or \"*\")")]
pub struct InvalidDuration(pub String);

/// How long a cached entry stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDuration {
    Forever,
    For(Duration),
}

impl CacheDuration {
    /// Whether an entry stored at `cached_at` (unix seconds) is fresh at `now`.
    pub fn is_fresh(&self, cached_at: u64, now: u64) -> bool {
        match self {
            CacheDuration::Forever => true,
            CacheDuration::For(d) => now.saturating_sub(cached_at) < d.as_secs(),
        }
    }
}

/// Parse a cache duration such as `"1d"`, `"30m"` or `"*"`.
pub fn parse_duration(value: &str) -> Result<CacheDuration, InvalidDuration> {
    let value = value.trim();
    if value == "*" {
        return Ok(CacheDuration::Forever);
    }
    let invalid = || InvalidDuration(value.to_string());

    let unit = value.chars().last().ok_or_else(invalid)?;
    let amount: u64 = value[..value.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;
    let seconds = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        'y' => 365 * 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    amount
        .checked_mul(seconds)
        .map(|s| CacheDuration::For(Duration::from_secs(s)))
        .ok_or_else(invalid)
}

/// Cache key for a URL: SHA-256 hex, optionally ignoring the query string.
pub fn cache_key(url: &str, remove_query: bool) -> String {
    let normalized = match Url::parse(url) {
        Ok(mut parsed) if remove_query => {
            parsed.set_query(None);
            parsed.to_string()
        }
        _ => url.to_string(),
    };
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// A single cached download.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    /// Unix seconds when the bytes were stored.
    pub cached_at: u64,
}

/// On-disk cache manifest mapping cache keys to their entries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheManifest {
    pub version: u32,
    pub entries: HashMap<String, CacheEntry>,
}

impl CacheManifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
        }
    }

    /// Load from the cache directory. Returns an empty manifest if the
    /// file doesn't exist or can't be parsed (version mismatch, corruption).
    pub async fn load(directory: &Path) -> Self {
        let content = match fs::read_to_string(manifest_path(directory)).await {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(m) if m.version == MANIFEST_VERSION => m,
            _ => Self::empty(),
        }
    }

    /// Save to the cache directory.
    pub async fn save(&self, directory: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(manifest_path(directory), json).await
    }
}

/// Resolve the cache manifest path for a cache directory.
pub fn manifest_path(directory: &Path) -> PathBuf {
    directory.join(MANIFEST_FILENAME)
}

/// Fetched bytes plus the manifest that indexes them.
#[derive(Debug)]
pub struct AssetCache {
    directory: PathBuf,
    manifest: CacheManifest,
}

impl AssetCache {
    /// Open the cache in `directory`. Nothing is created until the first
    /// [`put`](Self::put).
    pub async fn open(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        let manifest = CacheManifest::load(&directory).await;
        Self {
            directory,
            manifest,
        }
    }

    pub fn bytes_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.buf"))
    }

    /// Cached bytes for `key`, if the entry is fresh and its file still exists.
    pub async fn get_fresh(&self, key: &str, duration: CacheDuration, now: u64) -> Option<Bytes> {
        let entry = self.manifest.entries.get(key)?;
        if !duration.is_fresh(entry.cached_at, now) {
            trace!(url = %entry.url, "Asset cache entry is stale");
            return None;
        }
        match fs::read(self.bytes_path(key)).await {
            Ok(bytes) => {
                trace!(url = %entry.url, "Asset cache hit");
                Some(Bytes::from(bytes))
            }
            Err(_) => {
                trace!(url = %entry.url, "Asset cache entry has no bytes on disk");
                None
            }
        }
    }

    /// Store bytes for `key` and persist the manifest.
    pub async fn put(&mut self, key: &str, url: &str, bytes: &[u8], now: u64) -> io::Result<()> {
        fs::create_dir_all(&self.directory).await?;
        fs::write(self.bytes_path(key), bytes).await?;
        self.manifest.entries.insert(
            key.to_string(),
            CacheEntry {
                url: url.to_string(),
                cached_at: now,
            },
        );
        self.manifest.save(&self.directory).await
    }

    pub fn len(&self) -> usize {
        self.manifest.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.entries.is_empty()
    }
}
