//! Sync dispatch
//!
//! Entry point shared by the trigger CLI and anything else that wants a
//! sync "now": with Redis configured the run is handed to the worker,
//! otherwise it executes in-process. Callers only see the outcome.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::domain::services::ObjectStore;
use crate::infrastructure::{
    DatabaseConnection, HttpClient, HttpClientConfig, OssClient, Settings, SqliteAppRepository,
    SqliteCategoryRepository, SqliteReleaseRepository, SqliteSyncLogRepository, SyncQueue,
};

use super::sync_service::SyncService;

/// How a requested sync was carried out.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DispatchOutcome {
    /// Enqueued for the worker; the job id can be used to track it.
    Queue {
        #[serde(rename = "jobId")]
        job_id: String,
    },
    /// Ran to completion in this process.
    Inline,
}

/// Wire a [`SyncService`] from settings: open (and migrate) the catalog
/// database, build the rate-limited HTTP client, and attach object storage
/// when the OSS settings are usable.
pub async fn build_sync_service(settings: &Settings) -> Result<SyncService> {
    let db = DatabaseConnection::new(&settings.database_url)
        .await
        .context("Failed to open catalog database")?;
    db.migrate().await.context("Failed to run migrations")?;
    let pool = db.pool().clone();

    let fetcher = Arc::new(HttpClient::new(HttpClientConfig::from_settings(settings))?);
    let storage = settings
        .object_store()
        .map(OssClient::new)
        .transpose()?
        .map(|client| Arc::new(client) as Arc<dyn ObjectStore>);
    if storage.is_none() {
        info!("Object storage not configured; uploads will be skipped");
    }

    SyncService::new(
        settings.upstream_url.clone(),
        fetcher,
        storage,
        Arc::new(SqliteCategoryRepository::new(pool.clone())),
        Arc::new(SqliteAppRepository::new(pool.clone())),
        Arc::new(SqliteReleaseRepository::new(pool.clone())),
        Arc::new(SqliteSyncLogRepository::new(pool)),
    )
}

/// Trigger a sync, preferring the queue when one is configured.
pub async fn run_sync_now(settings: &Settings) -> Result<DispatchOutcome> {
    if let Some(redis_url) = settings.queue_url() {
        let mut queue = SyncQueue::connect(redis_url)
            .await
            .context("Failed to connect to Redis queue")?;
        let job_id = queue.enqueue_sync().await?;
        info!("Sync job enqueued: {}", job_id);
        return Ok(DispatchOutcome::Queue { job_id });
    }

    info!("No queue configured; running sync inline");
    let service = build_sync_service(settings).await?;
    service.run_once().await?;
    Ok(DispatchOutcome::Inline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_outcome_serializes_with_mode_tag() {
        let queued = DispatchOutcome::Queue {
            job_id: "j-1".to_string(),
        };
        let json = serde_json::to_value(&queued).unwrap();
        assert_eq!(json["mode"], "queue");
        assert_eq!(json["jobId"], "j-1");

        let inline = serde_json::to_value(DispatchOutcome::Inline).unwrap();
        assert_eq!(inline["mode"], "inline");
    }
}
