//! Object-store abstraction for index artifacts.
//!
//! The index persists through this trait only; it never touches the
//! filesystem or network directly. Implementations are expected to be
//! cheap to clone behind `Arc` and safe to share across tasks.

use crate::error::{GeoIndexError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Keyed blob storage.
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync {
    /// Read the blob at `path`.
    ///
    /// Returns `BlobNotFound` if nothing is stored there.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `bytes` to `path`, replacing any existing blob.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// List blobs under `prefix` with their byte sizes.
    async fn list_with_sizes(&self, prefix: &str) -> Result<BTreeMap<String, u64>>;
}

/// In-memory object store, used in tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| GeoIndexError::BlobNotFound(path.to_string()))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn list_with_sizes(&self, prefix: &str) -> Result<BTreeMap<String, u64>> {
        Ok(self
            .blobs
            .read()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, bytes)| (path.clone(), bytes.len() as u64))
            .collect())
    }
}

/// Filesystem-backed object store rooted at a directory.
///
/// Blob paths map to files under the root; intermediate directories are
/// created on write.
#[derive(Debug)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn relative_key(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            GeoIndexError::Format(format!("path {} escapes store root", path.display()))
        })?;
        Ok(rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GeoIndexError::BlobNotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;
        Ok(())
    }

    async fn list_with_sizes(&self, prefix: &str) -> Result<BTreeMap<String, u64>> {
        let mut out = BTreeMap::new();
        if !self.root.exists() {
            return Ok(out);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                } else {
                    let key = self.relative_key(&path)?;
                    if key.starts_with(prefix) {
                        out.insert(key, meta.len());
                    }
                }
            }
        }
        Ok(out)
    }
}
