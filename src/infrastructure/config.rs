//! Configuration infrastructure
//!
//! All runtime configuration comes from the environment (12-factor style):
//! upstream listing URL, database, optional queue transport and object
//! store credentials. Object-store settings that still look like un-edited
//! template defaults are demoted to "not configured" here, before any
//! network call is attempted.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment-derived service settings.
///
/// Every field has a default so a bare environment still yields a working
/// inline-mode service (no queue, no object store).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Upstream listing page enumerating all currently offered apps.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Queue transport target. When present sync runs are enqueued for the
    /// worker; when absent the dispatch layer runs them inline.
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default)]
    pub oss_region: String,
    #[serde(default)]
    pub oss_bucket: String,
    #[serde(default)]
    pub oss_access_key_id: String,
    #[serde(default)]
    pub oss_access_key_secret: String,
    /// Explicit public base URL for uploaded objects. When unset, a
    /// conventional bucket/region URL is derived instead.
    #[serde(default)]
    pub oss_public_base_url: Option<String>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_http_max_rps")]
    pub http_max_rps: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_upstream_url() -> String {
    "https://down.imai.work/app/app.php".to_string()
}

fn default_database_url() -> String {
    "sqlite:appmirror.db".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_http_max_rps() -> u32 {
    5
}

fn default_user_agent() -> String {
    format!("appmirror/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upstream_url: default_upstream_url(),
            database_url: default_database_url(),
            redis_url: None,
            oss_region: String::new(),
            oss_bucket: String::new(),
            oss_access_key_id: String::new(),
            oss_access_key_secret: String::new(),
            oss_public_base_url: None,
            http_timeout_secs: default_http_timeout_secs(),
            http_max_rps: default_http_max_rps(),
            user_agent: default_user_agent(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables (`UPSTREAM_URL`,
    /// `DATABASE_URL`, `REDIS_URL`, `OSS_*`, `HTTP_*`).
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("assembling environment configuration")?;
        cfg.try_deserialize()
            .context("parsing environment configuration")
    }

    /// Queue transport target, if one is actually usable.
    pub fn queue_url(&self) -> Option<&str> {
        self.redis_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Object-store configuration, or `None` when the environment is
    /// missing values or still carries template placeholders.
    pub fn object_store(&self) -> Option<ObjectStoreConfig> {
        let bucket = self.oss_bucket.trim().to_lowercase();
        let key_id = self.oss_access_key_id.trim().to_lowercase();
        let key_secret = self.oss_access_key_secret.trim().to_lowercase();
        let region = self.oss_region.trim().to_lowercase();

        let looks_placeholder = bucket.is_empty()
            || key_id.is_empty()
            || key_secret.is_empty()
            || region.is_empty()
            || bucket.contains("your-bucket")
            || key_id.contains("your-access-key")
            || key_secret.contains("your-access-key")
            // The sample env ships this region; an un-edited value is far
            // more likely a leftover template than a real deployment.
            || region.contains("oss-cn-hangzhou");
        if looks_placeholder {
            return None;
        }

        Some(ObjectStoreConfig {
            region: self.oss_region.trim().to_string(),
            bucket: self.oss_bucket.trim().to_string(),
            access_key_id: self.oss_access_key_id.trim().to_string(),
            access_key_secret: self.oss_access_key_secret.trim().to_string(),
            public_base_url: self
                .oss_public_base_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
        })
    }
}

/// Validated object-store connection settings.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub public_base_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Settings {
        Settings {
            oss_region: "oss-cn-shenzhen".to_string(),
            oss_bucket: "mirror-assets".to_string(),
            oss_access_key_id: "LTAI5tExample".to_string(),
            oss_access_key_secret: "secret-value".to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_object_store_accepts_real_looking_config() {
        let cfg = configured().object_store().expect("configured");
        assert_eq!(cfg.bucket, "mirror-assets");
        assert_eq!(cfg.region, "oss-cn-shenzhen");
        assert!(cfg.public_base_url.is_none());
    }

    #[test]
    fn test_object_store_rejects_empty_and_placeholder_values() {
        assert!(Settings::default().object_store().is_none());

        let mut s = configured();
        s.oss_bucket = "your-bucket-name".to_string();
        assert!(s.object_store().is_none());

        let mut s = configured();
        s.oss_access_key_id = "YOUR-ACCESS-KEY-ID".to_string();
        assert!(s.object_store().is_none());

        // Template default region is treated as never edited.
        let mut s = configured();
        s.oss_region = "oss-cn-hangzhou".to_string();
        assert!(s.object_store().is_none());
    }

    #[test]
    fn test_queue_url_ignores_blank_values() {
        let mut s = Settings::default();
        assert!(s.queue_url().is_none());
        s.redis_url = Some("   ".to_string());
        assert!(s.queue_url().is_none());
        s.redis_url = Some("redis://127.0.0.1:6379".to_string());
        assert_eq!(s.queue_url(), Some("redis://127.0.0.1:6379"));
    }

    #[test]
    fn test_public_base_url_blank_is_none() {
        let mut s = configured();
        s.oss_public_base_url = Some("  ".to_string());
        assert!(s.object_store().unwrap().public_base_url.is_none());
        s.oss_public_base_url = Some("https://cdn.example.com".to_string());
        assert_eq!(
            s.object_store().unwrap().public_base_url.as_deref(),
            Some("https://cdn.example.com")
        );
    }
}
