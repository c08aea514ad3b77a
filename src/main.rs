//! Sync trigger CLI
//!
//! Counterpart of the admin "run sync" action: enqueues a sync job when a
//! Redis queue is configured, otherwise runs the whole sync in-process.
//! Prints a one-line JSON outcome either way so scripts can consume it.

use serde_json::json;
use tracing::error;

use appmirror::application::DispatchOutcome;
use appmirror::infrastructure::{Settings, init_logging};

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("failed to initialise logging: {e}");
    }

    match run().await {
        Ok(body) => println!("{body}"),
        Err(e) => {
            error!("Sync trigger failed: {:#}", e);
            println!("{}", json!({ "ok": false, "error": format!("{e:#}") }));
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<serde_json::Value> {
    let settings = Settings::from_env()?;
    let outcome = appmirror::run_sync_now(&settings).await?;
    Ok(match outcome {
        DispatchOutcome::Queue { job_id } => {
            json!({ "ok": true, "mode": "queue", "jobId": job_id })
        }
        DispatchOutcome::Inline => json!({ "ok": true, "mode": "inline" }),
    })
}
