//! Domain module - catalog entities and sync-run business logic
//!
//! Everything here is persistence- and transport-agnostic: entity types,
//! repository/service contracts, and the pure helpers (slug derivation,
//! version inference) the pipeline builds on.

pub mod entities;
pub mod repositories;
pub mod services;
pub mod slug;
pub mod version;

// Re-export commonly used items for convenience
pub use entities::{
    App, AppStatus, Category, Release, SyncLog, SyncStats, SyncStatus, UpstreamApp,
};
pub use services::{DownloadNaming, ObjectStore, StorageError, StoredObject, TempDownload, UpstreamFetcher};
