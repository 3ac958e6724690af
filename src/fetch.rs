//! Remote source fetching.
//!
//! [`Fetcher`] is the seam between source resolution and the network.
//! [`HttpFetcher`] is the production implementation: a `reqwest` client in
//! front of the on-disk [`AssetCache`], so a fresh cached copy is served
//! without touching the network.

use crate::cache::{AssetCache, InvalidDuration, cache_key, parse_duration, unix_now};
use crate::config::CacheConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Request timeout for remote sources.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("imgset/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache configuration error: {0}")]
    InvalidDuration(#[from] InvalidDuration),
}

/// Retrieves the bytes behind a remote URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, cache: &CacheConfig) -> Result<Bytes, FetchError>;
}

/// HTTP fetcher with an on-disk cache.
pub struct HttpFetcher {
    client: Client,
    /// Serializes manifest reads and writes across concurrent jobs.
    manifest_lock: Mutex<()>,
}

impl HttpFetcher {
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            manifest_lock: Mutex::new(()),
        }
    }

    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cache: &CacheConfig) -> Result<Bytes, FetchError> {
        let duration = parse_duration(&cache.duration)?;
        let key = cache_key(url, cache.remove_url_query_params);

        {
            let _guard = self.manifest_lock.lock().await;
            let assets = AssetCache::open(&cache.directory).await;
            if let Some(bytes) = assets.get_fresh(&key, duration, unix_now()).await {
                return Ok(bytes);
            }
        }

        debug!(url, "Fetching remote image");
        let bytes = self.download(url).await?;

        let _guard = self.manifest_lock.lock().await;
        // Reload: another job may have written the manifest meanwhile
        let mut assets = AssetCache::open(&cache.directory).await;
        if let Err(e) = assets.put(&key, url, &bytes, unix_now()).await {
            warn!(url, error = %e, "Failed to cache remote image");
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn fresh_cache_entry_is_served_without_network() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig {
            directory: tmp.path().to_path_buf(),
            ..CacheConfig::default()
        };
        // Port 9 (discard) on localhost: any real request would fail
        let url = "http://127.0.0.1:9/photo.jpg";
        let mut assets = AssetCache::open(&config.directory).await;
        assets
            .put(&cache_key(url, false), url, b"cached", unix_now())
            .await
            .unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let bytes = fetcher.fetch(url, &config).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"cached"));
    }

    #[tokio::test]
    async fn stripped_query_shares_cache_entry() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig {
            directory: tmp.path().to_path_buf(),
            remove_url_query_params: true,
            ..CacheConfig::default()
        };
        let mut assets = AssetCache::open(&config.directory).await;
        assets
            .put(
                &cache_key("http://127.0.0.1:9/photo.jpg", true),
                "http://127.0.0.1:9/photo.jpg",
                b"cached",
                unix_now(),
            )
            .await
            .unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let bytes = fetcher
            .fetch("http://127.0.0.1:9/photo.jpg?w=1", &config)
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from_static(b"cached"));
    }

    #[tokio::test]
    async fn stale_entry_goes_to_network() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig {
            duration: "0s".into(),
            directory: tmp.path().to_path_buf(),
            ..CacheConfig::default()
        };
        let url = "http://127.0.0.1:9/photo.jpg";
        let mut assets = AssetCache::open(&config.directory).await;
        assets
            .put(&cache_key(url, false), url, b"cached", unix_now())
            .await
            .unwrap();

        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(url, &config).await.unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }

    #[tokio::test]
    async fn invalid_duration_is_reported() {
        let config = CacheConfig {
            duration: "later".into(),
            ..CacheConfig::default()
        };
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher
            .fetch("http://127.0.0.1:9/photo.jpg", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidDuration(_)));
    }
}
