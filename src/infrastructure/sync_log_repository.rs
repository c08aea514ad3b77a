//! Sync audit log persistence
//!
//! Each sync run opens a RUNNING row before touching anything upstream and
//! closes it exactly once with a terminal status, a message and the run's
//! statistics serialized as JSON.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::domain::entities::{SyncLog, SyncStats, SyncStatus};
use crate::domain::repositories::SyncLogRepository;

#[derive(Clone)]
pub struct SqliteSyncLogRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteSyncLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncLog>> {
        let row = sqlx::query(
            "SELECT id, status, message, stats, started_at, finished_at FROM sync_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.as_ref().map(map_sync_log))
    }
}

#[async_trait]
impl SyncLogRepository for SqliteSyncLogRepository {
    async fn create_running(&self, message: &str) -> Result<SyncLog> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO sync_logs (id, status, message, started_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(SyncStatus::Running)
        .bind(message)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| anyhow!("sync log row missing after insert: {id}"))
    }

    async fn finish(
        &self,
        id: &str,
        status: SyncStatus,
        message: &str,
        stats: &SyncStats,
    ) -> Result<()> {
        let stats_json = serde_json::to_string(stats)?;
        sqlx::query(
            "UPDATE sync_logs SET status = ?, message = ?, stats = ?, finished_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(message)
        .bind(stats_json)
        .bind(Utc::now())
        .bind(id)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<SyncLog>> {
        let rows = sqlx::query(
            "SELECT id, status, message, stats, started_at, finished_at \
             FROM sync_logs ORDER BY started_at DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.iter().map(map_sync_log).collect())
    }
}

fn map_sync_log(row: &SqliteRow) -> SyncLog {
    let stats_json: Option<String> = row.get("stats");
    SyncLog {
        id: row.get("id"),
        status: row.get("status"),
        message: row.get("message"),
        stats: stats_json.and_then(|s| serde_json::from_str(&s).ok()),
        started_at: row.get("started_at"),
        finished_at: row.get("finished_at"),
    }
}
