//! Logging system configuration and initialization
//!
//! Console logging by default, with an optional daily-rolling file layer
//! for the long-running worker. Log level comes from `RUST_LOG`, falling
//! back to `info` with noisy crates turned down.

use anyhow::Result;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
    fmt,
};

// Keeps the non-blocking file writers alive for the process lifetime.
static LOG_GUARDS: Lazy<Mutex<Vec<non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn,reqwest=warn,html5ever=error";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log directory next to the executable, falling back to the working directory.
pub fn get_log_directory() -> PathBuf {
    let base = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    base.join("logs")
}

/// Initialize console-only logging. Suitable for one-shot commands.
pub fn init_logging() -> Result<()> {
    Registry::default()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

/// Initialize console logging plus a daily-rolling log file.
///
/// Used by the worker, where runs happen unattended and the console
/// scrollback is gone by the time anyone looks.
pub fn init_logging_with_file(file_prefix: &str) -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, file_prefix);
    let (file_writer, guard) = non_blocking(file_appender);
    if let Ok(mut guards) = LOG_GUARDS.lock() {
        guards.push(guard);
    }

    Registry::default()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    tracing::info!("File logging enabled: {}", log_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_under_a_real_base() {
        let dir = get_log_directory();
        assert!(dir.ends_with("logs"));
        assert!(dir.parent().is_some());
    }

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }
}
