//! HTTP client for upstream fetching with rate limiting and error handling
//!
//! One client serves both page fetches and binary downloads, so the
//! rate limit applies to everything we send at the upstream host.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use reqwest::{Client, Response, header::{HeaderMap, HeaderValue, USER_AGENT}};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::domain::services::{DownloadNaming, TempDownload, UpstreamFetcher};
use crate::infrastructure::config::Settings;

/// HTTP client configuration for upstream access
#[derive(Debug, Clone, serde::Serialize)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("appmirror/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_seconds: 30,
            max_requests_per_second: 5,
        }
    }
}

impl HttpClientConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            user_agent: settings.user_agent.clone(),
            timeout_seconds: settings.http_timeout_secs,
            max_requests_per_second: settings.http_max_rps,
        }
    }
}

/// Rate-limited HTTP client for polite upstream crawling
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    /// Fetch a URL with rate limiting and error handling
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        tracing::debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "HTTP request failed with status {}: {}",
                response.status(),
                url
            );
        }

        Ok(response)
    }

    /// Fetch URL and return text content
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from: {url}"))?;

        tracing::debug!("Fetched {} ({} chars)", url, text.len());
        Ok(text)
    }

    /// Stream a URL into a fresh scoped temporary directory.
    ///
    /// The directory (and the file inside it) is removed when the returned
    /// handle is dropped, on success and failure paths alike.
    pub async fn download_to_temp(
        &self,
        url: &str,
        naming: &DownloadNaming,
    ) -> Result<TempDownload> {
        let dir = tempfile::Builder::new()
            .prefix("appmirror-sync-")
            .tempdir()
            .context("Failed to create temporary download directory")?;
        let filename = derive_filename(url, naming);
        let file_path = dir.path().join(&filename);

        let response = self.get(url).await?;
        let mut file = tokio::fs::File::create(&file_path)
            .await
            .with_context(|| format!("Failed to create {}", file_path.display()))?;

        let mut stream = response.bytes_stream();
        let mut total: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Download stream broke for: {url}"))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", file_path.display()))?;
            total += chunk.len() as u64;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", file_path.display()))?;

        tracing::debug!("Downloaded {} -> {} ({} bytes)", url, filename, total);
        Ok(TempDownload::new(dir, file_path, filename))
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[async_trait]
impl UpstreamFetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }

    async fn download(&self, url: &str, naming: DownloadNaming) -> Result<TempDownload> {
        self.download_to_temp(url, &naming).await
    }
}

/// Pick a local filename for a download.
///
/// The last URL path segment wins when it exists. Otherwise the caller's
/// fallback basename (or a random one) is used, with the fallback extension
/// appended unless the name already ends with it.
fn derive_filename(url: &str, naming: &DownloadNaming) -> String {
    let from_path = Url::parse(url).ok().and_then(|u| {
        u.path_segments().and_then(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .next_back()
                .map(ToString::to_string)
        })
    });
    if let Some(base) = from_path {
        return base;
    }

    let ext = naming.fallback_ext.as_deref().unwrap_or("");
    let name = naming
        .fallback_basename
        .clone()
        .unwrap_or_else(|| format!("download-{}", uuid::Uuid::new_v4()));
    if !ext.is_empty() && !name.ends_with(ext) {
        format!("{name}{ext}")
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let config = HttpClientConfig::default();
        let client = HttpClient::new(config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let config = HttpClientConfig {
            max_requests_per_second: 0,
            ..Default::default()
        };
        assert!(HttpClient::new(config).is_err());
    }

    #[test]
    fn test_filename_from_url_path() {
        let naming = DownloadNaming::default();
        assert_eq!(
            derive_filename("https://cdn.example.com/files/app_61907.apk?sig=abc", &naming),
            "app_61907.apk"
        );
    }

    #[test]
    fn test_filename_ignores_trailing_slash() {
        let naming = DownloadNaming {
            fallback_ext: Some(".apk".into()),
            fallback_basename: None,
        };
        assert_eq!(
            derive_filename("https://cdn.example.com/files/", &naming),
            "files"
        );
    }

    #[test]
    fn test_filename_fallback_appends_ext() {
        let naming = DownloadNaming {
            fallback_ext: Some(".png".into()),
            fallback_basename: Some("icon-my-app".into()),
        };
        assert_eq!(
            derive_filename("https://cdn.example.com/", &naming),
            "icon-my-app.png"
        );
    }

    #[test]
    fn test_filename_fallback_does_not_double_ext() {
        let naming = DownloadNaming {
            fallback_ext: Some(".png".into()),
            fallback_basename: Some("icon.png".into()),
        };
        assert_eq!(
            derive_filename("https://cdn.example.com/", &naming),
            "icon.png"
        );
    }

    #[test]
    fn test_filename_fallback_random_when_unnamed() {
        let naming = DownloadNaming {
            fallback_ext: Some(".apk".into()),
            fallback_basename: None,
        };
        let name = derive_filename("https://cdn.example.com/", &naming);
        assert!(name.starts_with("download-"));
        assert!(name.ends_with(".apk"));
    }
}
