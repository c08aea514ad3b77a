//! Streaming file digests
//!
//! Downloads can be hundreds of megabytes, so hashing reads the file in
//! fixed-size chunks instead of loading it whole.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest and byte length of a file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex SHA-256.
    pub sha256: String,
    pub size: u64,
}

/// Compute the SHA-256 and size of a file in one pass.
pub async fn sha256_file(path: &Path) -> Result<FileDigest> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {} for hashing", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut size: u64 = 0;
    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed to read {} while hashing", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok(FileDigest {
        sha256: hex::encode(hasher.finalize()),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_sha256_of_known_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"hello world")
            .unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(
            digest.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(digest.size, 11);
    }

    #[tokio::test]
    async fn test_sha256_of_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::File::create(&path).unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(
            digest.sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(digest.size, 0);
    }

    #[tokio::test]
    async fn test_sha256_spans_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![0xabu8; CHUNK_SIZE * 2 + 17];
        std::fs::write(&path, &data).unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(digest.size, data.len() as u64);

        let expected = hex::encode(Sha256::digest(&data));
        assert_eq!(digest.sha256, expected);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.bin");
        assert!(sha256_file(&path).await.is_err());
    }
}
