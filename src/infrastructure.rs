//! Infrastructure layer for database access, parsing, and external integrations
//!
//! Concrete implementations behind the domain traits: the upstream HTTP
//! client, HTML extraction, hashing, object storage, SQLite repositories and
//! the Redis job queue.

pub mod config;
pub mod database_connection;
pub mod catalog_repository;
pub mod hashing;
pub mod html_parser;
pub mod http_client;
pub mod logging;
pub mod object_storage;
pub mod queue;
pub mod sync_log_repository;

// Re-export commonly used items
pub use config::{ObjectStoreConfig, Settings};
pub use database_connection::DatabaseConnection;
pub use catalog_repository::{SqliteAppRepository, SqliteCategoryRepository, SqliteReleaseRepository};
pub use hashing::{FileDigest, sha256_file};
pub use html_parser::ListingExtractor;
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_file};
pub use object_storage::OssClient;
pub use queue::{SYNC_JOB_NAME, SyncJob, SyncQueue};
pub use sync_log_repository::SqliteSyncLogRepository;
