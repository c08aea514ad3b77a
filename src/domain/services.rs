//! Domain service seams
//!
//! Interfaces for the two external collaborators the asset pipeline talks
//! to: the upstream site (page fetch + binary download) and the object
//! store. Production implementations live in `infrastructure`; tests
//! substitute stubs.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Naming fallback for downloads whose URL path carries no usable basename.
#[derive(Debug, Clone, Default)]
pub struct DownloadNaming {
    /// Extension (with dot) appended to a fallback basename, e.g. `.apk`.
    pub fallback_ext: Option<String>,
    /// Basename used when the URL path has none, e.g. `icon-my-app`.
    pub fallback_basename: Option<String>,
}

/// A file downloaded into its own scoped temporary directory.
///
/// The directory is removed when this value is dropped, on every exit path.
/// Callers hash/upload the file and simply let the handle fall out of scope.
#[derive(Debug)]
pub struct TempDownload {
    dir: tempfile::TempDir,
    file_path: PathBuf,
    filename: String,
}

impl TempDownload {
    pub fn new(dir: tempfile::TempDir, file_path: PathBuf, filename: String) -> Self {
        Self {
            dir,
            file_path,
            filename,
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Filename the asset was saved under; feeds version inference.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }
}

/// Fetches upstream pages and downloads upstream assets.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Fetch a page as text. Non-2xx responses are errors.
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Stream a URL into a fresh scoped temporary directory.
    async fn download(&self, url: &str, naming: DownloadNaming) -> Result<TempDownload>;
}

/// Failure of an object-store operation.
///
/// Any variant trips the run-scoped storage circuit breaker; `code()` is
/// the short reason recorded in the run statistics.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store answered with a non-success status. `code` is the
    /// service-level error code when one was present in the response body
    /// (e.g. `NoSuchBucket`, `AccessDenied`).
    #[error("object store rejected request ({status}): {code}")]
    Rejected { status: u16, code: String },

    #[error("object store transport failure: {0}")]
    Transport(String),

    #[error("reading upload source failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn code(&self) -> String {
        match self {
            StorageError::Rejected { code, status } => {
                if code.is_empty() {
                    format!("HTTP {status}")
                } else {
                    code.clone()
                }
            }
            StorageError::Transport(_) => "transport error".to_string(),
            StorageError::Io(_) => "io error".to_string(),
        }
    }
}

/// Successful upload result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub object_key: String,
    /// Stable public URL of the object.
    pub url: String,
}

/// Uploads local files to durable object storage.
///
/// Availability is decided before a run starts (placeholder-looking
/// configuration never reaches this trait); failure signals are typed so
/// the orchestrator can downgrade the rest of the run.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        object_key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_code() {
        let err = StorageError::Rejected {
            status: 404,
            code: "NoSuchBucket".to_string(),
        };
        assert_eq!(err.code(), "NoSuchBucket");

        let bare = StorageError::Rejected {
            status: 503,
            code: String::new(),
        };
        assert_eq!(bare.code(), "HTTP 503");
    }

    #[test]
    fn test_temp_download_cleans_up_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.bin");
        std::fs::write(&file_path, b"payload").unwrap();
        let kept = dir.path().to_path_buf();

        let download = TempDownload::new(dir, file_path, "a.bin".to_string());
        assert!(download.path().exists());
        drop(download);
        assert!(!kept.exists());
    }
}
