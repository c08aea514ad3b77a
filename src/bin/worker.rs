//! Queue worker
//!
//! Long-running process that drains the Redis sync queue one job at a
//! time. Refuses to start without a queue configured; a worker with no
//! Redis has nothing to do.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use appmirror::application::build_sync_service;
use appmirror::infrastructure::{SYNC_JOB_NAME, Settings, SyncQueue, init_logging_with_file};

const POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging_with_file("appmirror-worker.log") {
        eprintln!("failed to initialise logging: {e}");
    }

    if let Err(e) = run().await {
        error!("Worker stopped: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let settings = Settings::from_env()?;
    let Some(redis_url) = settings.queue_url() else {
        error!("REDIS_URL is not set; worker cannot start.");
        std::process::exit(1);
    };

    info!("Worker starting. redis: {}", redis_url);
    let mut queue = SyncQueue::connect(redis_url).await?;
    let service = build_sync_service(&settings).await?;

    // Jobs run strictly one at a time. A sync is a whole-catalog pass;
    // two concurrent passes would race each other on slugs and releases.
    loop {
        let job = tokio::select! {
            job = queue.next_job(POLL_TIMEOUT) => job?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received; worker exiting");
                return Ok(());
            }
        };
        let Some(job) = job else {
            continue;
        };

        if job.name != SYNC_JOB_NAME {
            let message = format!("Unknown job: {}", job.name);
            error!("job failed: {} {} {}", job.id, job.name, message);
            queue.mark_failed(&job.id, &message).await?;
            continue;
        }

        match service.run_once().await {
            Ok(_) => {
                info!("job completed: {} {}", job.id, job.name);
                queue.mark_completed(&job.id).await?;
            }
            Err(e) => {
                error!("job failed: {} {} {:#}", job.id, job.name, e);
                queue.mark_failed(&job.id, &format!("{e:#}")).await?;
            }
        }
    }
}
