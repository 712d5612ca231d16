//! In-memory storage backend
//!
//! Same staging semantics as the local backend, without touching disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use run_core::{Error, Result};
use tracing::debug;

use crate::{DirectoryLister, StagedWrite, StorageBackend};

/// In-memory storage backend
///
/// Clones share the same contents, so a test can keep a handle while the
/// component under test owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    committed: Arc<DashMap<String, Bytes>>,
    staged: Arc<DashMap<String, (String, Bytes)>>,
    staging_counter: Arc<AtomicU64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged writes that were neither promoted nor discarded
    pub fn pending_stages(&self) -> usize {
        self.staged.len()
    }

    /// Replace promoted contents in place, bypassing staging.
    ///
    /// Lets tests simulate on-disk corruption.
    pub fn overwrite_raw(&self, path: &str, data: Bytes) {
        self.committed.insert(path.to_string(), data);
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn read(&self, path: &str) -> Result<Bytes> {
        self.committed
            .get(path)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::StoragePathNotFound {
                path: path.to_string(),
            })
    }

    async fn write_staged(&self, path: &str, data: Bytes) -> Result<StagedWrite> {
        let id = self.staging_counter.fetch_add(1, Ordering::SeqCst);
        let key = format!("{}.{}.tmp", path, id);
        let size = data.len() as u64;

        self.staged.insert(key.clone(), (path.to_string(), data));
        debug!(path, staging_key = %key, size, "Staged in memory");

        Ok(StagedWrite::new(path, key, size))
    }

    async fn promote(&self, staged: StagedWrite) -> Result<u64> {
        let (_, (path, data)) = self.staged.remove(staged.staging_key()).ok_or_else(|| {
            Error::persistence(format!(
                "Staged write {} no longer exists",
                staged.staging_key()
            ))
        })?;

        self.committed.insert(path, data);
        Ok(staged.size())
    }

    async fn discard(&self, staged: StagedWrite) -> Result<()> {
        self.staged.remove(staged.staging_key());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.committed
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::StoragePathNotFound {
                path: path.to_string(),
            })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.committed.contains_key(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut results: Vec<String> = self
            .committed
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        results.sort();
        Ok(results)
    }

    async fn create_dir(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

/// Directory lister over a fixed set of directories
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectoryLister {
    dirs: Arc<DashMap<PathBuf, Vec<String>>>,
}

impl MemoryDirectoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry name under `dir`
    pub fn add(&self, dir: impl AsRef<Path>, name: impl Into<String>) {
        self.dirs
            .entry(dir.as_ref().to_path_buf())
            .or_default()
            .push(name.into());
    }
}

#[async_trait]
impl DirectoryLister for MemoryDirectoryLister {
    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut names = self
            .dirs
            .get(dir)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_promote_read() {
        let storage = MemoryStorage::new();

        let staged = storage
            .write_staged("ckpt-1.ckpt", Bytes::from("abc"))
            .await
            .unwrap();
        assert!(!storage.exists("ckpt-1.ckpt").await.unwrap());
        assert_eq!(storage.pending_stages(), 1);

        assert_eq!(storage.promote(staged).await.unwrap(), 3);
        assert_eq!(storage.read("ckpt-1.ckpt").await.unwrap(), Bytes::from("abc"));
        assert_eq!(storage.pending_stages(), 0);
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let storage = MemoryStorage::new();
        let handle = storage.clone();

        storage.write("finished.txt", Bytes::new()).await.unwrap();
        assert!(handle.exists("finished.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_prefix_sorted() {
        let storage = MemoryStorage::new();
        storage.write("ckpt-2", Bytes::from("b")).await.unwrap();
        storage.write("ckpt-1", Bytes::from("a")).await.unwrap();
        storage.write("best/ckpt-1", Bytes::from("a")).await.unwrap();

        assert_eq!(storage.list("ckpt-").await.unwrap(), vec!["ckpt-1", "ckpt-2"]);
    }

    #[tokio::test]
    async fn test_memory_lister() {
        let lister = MemoryDirectoryLister::new();
        lister.add("logs", "run-2");
        lister.add("logs", "run-1");

        let names = lister.list_dir(Path::new("logs")).await.unwrap();
        assert_eq!(names, vec!["run-1", "run-2"]);
        assert!(lister.list_dir(Path::new("other")).await.unwrap().is_empty());
    }
}
