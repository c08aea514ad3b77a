//! Sync log inspection CLI
//!
//! Prints the most recent sync runs with their persisted statistics:
//! `appmirror-synclogs [count]` (default 5).

use anyhow::Result;

use appmirror::domain::repositories::SyncLogRepository;
use appmirror::infrastructure::{
    DatabaseConnection, Settings, SqliteSyncLogRepository, init_logging,
};

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("failed to initialise logging: {e}");
    }

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let limit: u32 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(5);

    let settings = Settings::from_env()?;
    let db = DatabaseConnection::new(&settings.database_url).await?;
    db.migrate().await?;
    let sync_logs = SqliteSyncLogRepository::new(db.pool().clone());

    let logs = sync_logs.recent(limit).await?;
    if logs.is_empty() {
        println!("no sync logs yet");
        return Ok(());
    }

    println!("最近 {} 条同步日志：", logs.len());
    for (index, log) in logs.iter().enumerate() {
        println!("\n--- 日志 {} ---", index + 1);
        println!("ID: {}", log.id);
        println!("状态: {}", log.status.as_str());
        println!("开始时间: {}", log.started_at);
        match &log.finished_at {
            Some(finished) => println!("结束时间: {finished}"),
            None => println!("结束时间: 未完成"),
        }
        println!("消息: {}", log.message);
        if let Some(stats) = &log.stats {
            println!("统计信息: {}", serde_json::to_string_pretty(stats)?);
        }
    }

    Ok(())
}
