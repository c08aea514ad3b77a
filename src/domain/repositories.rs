//! Repository interfaces for the mirrored catalog
//!
//! Trait contracts for the persistence operations the sync pipeline issues.
//! The pipeline never touches schema; it only upserts categories/apps,
//! appends releases and drives the sync-log lifecycle through these traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{App, Category, Release, SyncLog, SyncStats, SyncStatus};

/// Fields the pipeline writes when upserting an app. Admin-owned fields
/// (developer, tags, manually set icon) are deliberately absent: an upsert
/// must never clobber them.
#[derive(Debug, Clone)]
pub struct AppUpsert {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub category_id: Option<String>,
}

/// Payload for appending a release; id and row timestamp are assigned by
/// the repository.
#[derive(Debug, Clone)]
pub struct NewRelease {
    pub app_id: String,
    pub version_name: String,
    pub version_code: i64,
    pub changelog: String,
    pub download_url: String,
    pub upstream_url: String,
    pub apk_sha256: String,
    pub apk_size: i64,
    pub published_at: DateTime<Utc>,
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Upsert by slug: refresh the name if the category exists, create it
    /// otherwise.
    async fn upsert(&self, name: &str, slug: &str) -> Result<Category>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Category>>;
}

#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Slugs of existing apps that may be the same identity as an upstream
    /// name: matched by canonical slug, exact name, or name containment.
    /// Bounded to a handful of rows; ordering follows insertion order.
    async fn find_slug_candidates(&self, name: &str, canonical_slug: &str) -> Result<Vec<String>>;

    /// Upsert by slug. The update path only touches pipeline-owned fields
    /// and always reactivates the app.
    async fn upsert(&self, fields: &AppUpsert) -> Result<App>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<App>>;

    async fn update_icon_url(&self, app_id: &str, icon_url: &str) -> Result<()>;

    /// Reconciliation step: set every ACTIVE app whose slug is not in
    /// `seen_slugs` to INACTIVE. Returns the number of rows changed.
    async fn deactivate_missing(&self, seen_slugs: &[String]) -> Result<u64>;
}

#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    /// Digest-based dedup probe: does this app already carry a release with
    /// this content hash?
    async fn exists_by_digest(&self, app_id: &str, apk_sha256: &str) -> Result<bool>;

    /// Highest version code recorded for the app, if any. Drives the
    /// auto-numbering fallback when a filename carries no version.
    async fn max_version_code(&self, app_id: &str) -> Result<Option<i64>>;

    async fn create(&self, release: &NewRelease) -> Result<Release>;

    /// Releases of one app, newest version code first.
    async fn find_by_app(&self, app_id: &str) -> Result<Vec<Release>>;
}

#[async_trait]
pub trait SyncLogRepository: Send + Sync {
    /// Open the audit record for a run in RUNNING state. Persisted before
    /// any upstream fetch so a crash mid-run still leaves a trace.
    async fn create_running(&self, message: &str) -> Result<SyncLog>;

    /// Close the audit record exactly once: terminal status, message and
    /// final statistics. Never called twice for the same id by the pipeline.
    async fn finish(
        &self,
        id: &str,
        status: SyncStatus,
        message: &str,
        stats: &SyncStats,
    ) -> Result<()>;

    /// Most recent runs, newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<SyncLog>>;
}
