//! Domain entities
//!
//! Core catalog entities (categories, apps, releases) plus the per-run
//! sync audit record and its statistics payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candidate app extracted from the upstream listing page.
///
/// Ephemeral: lives for a single sync run. `name` is the dedup key within
/// a run; every URL is already resolved to an absolute form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamApp {
    pub name: String,
    /// Short category label from the fixed upstream vocabulary, when detected.
    pub label: Option<String>,
    pub description: Option<String>,
    pub detail_url: Option<String>,
    pub icon_url: Option<String>,
}

/// Lifecycle status of a catalog app.
///
/// Only `Active` apps are visible to a consuming catalog; reconciliation
/// flips apps that disappeared from upstream to `Inactive` instead of
/// deleting them, preserving release history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AppStatus {
    Active,
    Inactive,
}

impl AppStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::Active => "ACTIVE",
            AppStatus::Inactive => "INACTIVE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub developer: String,
    pub tags: Vec<String>,
    pub icon_url: String,
    pub status: AppStatus,
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One published binary of an app. Append-only from the sync pipeline's
/// perspective; `apk_sha256` is the per-app dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub app_id: String,
    pub version_name: String,
    pub version_code: i64,
    pub changelog: String,
    pub download_url: String,
    pub upstream_url: String,
    pub apk_sha256: String,
    pub apk_size: i64,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Status of one sync run. `Running` is transient; a finished log is never
/// mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Running,
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Running => "RUNNING",
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Failed => "FAILED",
        }
    }
}

/// Aggregate statistics of a sync run, stored as JSON on the sync log.
///
/// Field names serialize camelCase — the audit format consumed by the
/// admin surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub upstream_url: String,
    pub apps_seen: u32,
    pub apps_upserted: u32,
    pub apps_deactivated: u32,
    pub icons_updated: u32,
    pub icons_uploaded: u32,
    pub releases_created: u32,
    pub releases_skipped: u32,
    /// Short reason the object store was disabled mid-run, empty otherwise.
    pub oss_upload_disabled_reason: String,
    pub errors: u32,
    pub oss_available: bool,
}

impl SyncStats {
    pub fn new(upstream_url: impl Into<String>, oss_available: bool) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            oss_available,
            ..Self::default()
        }
    }
}

/// Immutable audit record of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: String,
    pub status: SyncStatus,
    pub message: String,
    pub stats: Option<SyncStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
