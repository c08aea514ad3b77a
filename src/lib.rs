//! appmirror - upstream app catalog mirror
//!
//! Scrapes an upstream Android app listing, mirrors icons and APK
//! binaries into Aliyun OSS under content-addressed keys, and keeps a
//! local SQLite catalog (categories, apps, releases) aligned with what
//! the upstream currently serves.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the surface the binaries and tests use most.
pub use application::{DispatchOutcome, SyncService, build_sync_service, run_sync_now};
pub use infrastructure::Settings;
