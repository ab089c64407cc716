//! # Report Blob Storage
//!
//! Content-addressed storage for original report bytes. Keys are the
//! SHA-256 hex of the content, so blobs are write-once: a second put of the
//! same key is a no-op and a differing body under an existing key is
//! impossible by construction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Storage backend for notarized report bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a content-hash key, returning the storage location.
    /// Existing keys are left untouched.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String>;

    /// Fetch the bytes stored under a key, if present.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Filesystem-backed blob store rooted at a configurable directory.
///
/// Blobs are sharded into subdirectories by the first two hex characters of
/// the key to keep directory fan-out bounded.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Creates a store rooted at the given directory, creating it if needed.
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create blob store directory {:?}", root))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let shard = if key.len() >= 2 { &key[..2] } else { "00" };
        self.root.join(shard).join(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_for(key);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            // Content-addressed: same key means same bytes
            return Ok(path.to_string_lossy().into_owned());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create blob shard directory {:?}", parent))?;
        }

        // Write to a temp file and rename so readers never observe a
        // partially written blob
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, bytes)
            .await
            .with_context(|| format!("Failed to write blob {:?}", tmp_path))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to finalize blob {:?}", path))?;

        Ok(path.to_string_lossy().into_owned())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to read blob {:?}", path))
            }
        }
    }
}
