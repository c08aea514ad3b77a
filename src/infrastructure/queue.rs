//! Redis-backed sync job queue
//!
//! A pending list plus one hash per job. The trigger side pushes job ids,
//! the worker pops them with a blocking read. Finished job hashes expire on
//! their own (an hour for completed, a day for failed) and the finished-id
//! lists are trimmed to a fixed length.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use uuid::Uuid;

/// The only job name the worker accepts.
pub const SYNC_JOB_NAME: &str = "upstream:sync";

const PENDING_KEY: &str = "appmirror:sync:pending";
const COMPLETED_KEY: &str = "appmirror:sync:completed";
const FAILED_KEY: &str = "appmirror:sync:failed";

const COMPLETED_TTL_SECS: i64 = 3600;
const FAILED_TTL_SECS: i64 = 24 * 3600;
const KEEP_FINISHED: isize = 1000;

fn job_key(job_id: &str) -> String {
    format!("appmirror:sync:job:{job_id}")
}

/// A job popped from the pending list.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub id: String,
    pub name: String,
}

/// Queue handle over one Redis connection.
///
/// The worker dedicates a connection to this queue; `next_job` blocks it
/// for up to the poll timeout.
pub struct SyncQueue {
    conn: MultiplexedConnection,
}

impl SyncQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }

    /// Enqueue one sync job and return its id.
    pub async fn enqueue_sync(&mut self) -> Result<String> {
        let job_id = Uuid::new_v4().to_string();
        let key = job_key(&job_id);
        let now = Utc::now().to_rfc3339();

        let _: () = self
            .conn
            .hset_multiple(
                &key,
                &[
                    ("name", SYNC_JOB_NAME),
                    ("state", "waiting"),
                    ("enqueued_at", now.as_str()),
                ],
            )
            .await?;
        let _: () = self.conn.lpush(PENDING_KEY, &job_id).await?;

        Ok(job_id)
    }

    /// Block up to `timeout` waiting for the next job.
    pub async fn next_job(&mut self, timeout: Duration) -> Result<Option<SyncJob>> {
        let popped: Option<(String, String)> = self
            .conn
            .brpop(PENDING_KEY, timeout.as_secs_f64())
            .await?;

        let Some((_, job_id)) = popped else {
            return Ok(None);
        };

        let name: Option<String> = self.conn.hget(job_key(&job_id), "name").await?;
        let _: () = self
            .conn
            .hset(job_key(&job_id), "state", "active")
            .await?;

        Ok(Some(SyncJob {
            id: job_id,
            // A missing hash (expired or foreign producer) yields an empty
            // name, which the worker rejects as unknown.
            name: name.unwrap_or_default(),
        }))
    }

    pub async fn mark_completed(&mut self, job_id: &str) -> Result<()> {
        let key = job_key(job_id);
        let now = Utc::now().to_rfc3339();
        let _: () = self
            .conn
            .hset_multiple(
                &key,
                &[("state", "completed"), ("finished_at", now.as_str())],
            )
            .await?;
        let _: bool = self.conn.expire(&key, COMPLETED_TTL_SECS).await?;
        let _: () = self.conn.lpush(COMPLETED_KEY, job_id).await?;
        let _: () = self.conn.ltrim(COMPLETED_KEY, 0, KEEP_FINISHED - 1).await?;
        Ok(())
    }

    pub async fn mark_failed(&mut self, job_id: &str, error: &str) -> Result<()> {
        let key = job_key(job_id);
        let now = Utc::now().to_rfc3339();
        let _: () = self
            .conn
            .hset_multiple(
                &key,
                &[
                    ("state", "failed"),
                    ("error", error),
                    ("finished_at", now.as_str()),
                ],
            )
            .await?;
        let _: bool = self.conn.expire(&key, FAILED_TTL_SECS).await?;
        let _: () = self.conn.lpush(FAILED_KEY, job_id).await?;
        let _: () = self.conn.ltrim(FAILED_KEY, 0, KEEP_FINISHED - 1).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_keys_are_namespaced() {
        assert_eq!(job_key("abc-123"), "appmirror:sync:job:abc-123");
        assert!(PENDING_KEY.starts_with("appmirror:sync:"));
        assert!(COMPLETED_KEY.starts_with("appmirror:sync:"));
        assert!(FAILED_KEY.starts_with("appmirror:sync:"));
    }

    #[test]
    fn test_retention_windows() {
        assert_eq!(COMPLETED_TTL_SECS, 3600);
        assert_eq!(FAILED_TTL_SECS, 86_400);
        assert_eq!(KEEP_FINISHED, 1000);
    }
}
