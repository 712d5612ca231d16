//! Local filesystem storage backend
//!
//! Provides async file I/O with atomic writes to prevent partial/corrupt files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use run_core::{Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{DirectoryLister, StagedWrite, StorageBackend};

/// Local filesystem storage backend
///
/// Stores data in a local directory with support for:
/// - Staged writes to a hidden `.name.<uuid>.tmp` file, promoted by rename
/// - Automatic directory creation
/// - Recursive file listing that never reports staged files
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Base path for all storage operations
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Directory to use as the storage root
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Get the base path
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a relative path to an absolute path
    fn resolve_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Generate a unique temporary file path next to the target
    fn temp_path(&self, path: &str) -> PathBuf {
        let full_path = self.resolve_path(path);
        let temp_name = format!(
            ".{}.{}.tmp",
            full_path.file_name().unwrap_or_default().to_string_lossy(),
            Uuid::new_v4()
        );
        full_path.with_file_name(temp_name)
    }

    fn is_staging_file(name: &str) -> bool {
        name.starts_with('.') && name.ends_with(".tmp")
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    #[instrument(skip(self), fields(backend = "local"))]
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.resolve_path(path);
        debug!(?full_path, "Reading file");

        match fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Error::persistence(format!("Failed to read {}: {}", path, e))),
        }
    }

    #[instrument(skip(self, data), fields(backend = "local", size = data.len()))]
    async fn write_staged(&self, path: &str, data: Bytes) -> Result<StagedWrite> {
        let full_path = self.resolve_path(path);
        let temp_path = self.temp_path(path);
        let size = data.len() as u64;

        debug!(?full_path, ?temp_path, size, "Staging file");

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::persistence(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            Error::persistence(format!("Failed to create temp file {:?}: {}", temp_path, e))
        })?;

        file.write_all(&data)
            .await
            .map_err(|e| Error::persistence(format!("Failed to write data: {}", e)))?;

        // Durable before it can be promoted
        file.sync_all()
            .await
            .map_err(|e| Error::persistence(format!("Failed to sync file: {}", e)))?;

        Ok(StagedWrite::new(
            path,
            temp_path.to_string_lossy().to_string(),
            size,
        ))
    }

    #[instrument(skip(self, staged), fields(backend = "local", path = staged.path()))]
    async fn promote(&self, staged: StagedWrite) -> Result<u64> {
        let full_path = self.resolve_path(staged.path());

        fs::rename(staged.staging_key(), &full_path)
            .await
            .map_err(|e| {
                Error::persistence(format!(
                    "Failed to rename {:?} to {:?}: {}",
                    staged.staging_key(),
                    full_path,
                    e
                ))
            })?;

        debug!(?full_path, size = staged.size(), "File promoted");
        Ok(staged.size())
    }

    #[instrument(skip(self, staged), fields(backend = "local", path = staged.path()))]
    async fn discard(&self, staged: StagedWrite) -> Result<()> {
        match fs::remove_file(staged.staging_key()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::persistence(format!(
                "Failed to discard {}: {}",
                staged.staging_key(),
                e
            ))),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        debug!(?full_path, "Deleting file");

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::StoragePathNotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(Error::persistence(format!("Failed to delete {}: {}", path, e))),
        }
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.resolve_path(path);
        Ok(fs::metadata(&full_path).await.is_ok())
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let search_path = self.resolve_path(prefix);
        let mut results = Vec::new();

        debug!(?search_path, "Listing files with prefix");

        // Determine the directory to scan
        let dir_to_scan = if search_path.is_dir() {
            search_path.clone()
        } else if let Some(parent) = search_path.parent() {
            if parent.is_dir() {
                parent.to_path_buf()
            } else {
                return Ok(results);
            }
        } else {
            return Ok(results);
        };

        // Recursively walk the directory
        let mut stack = vec![dir_to_scan];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            while let Ok(Some(entry)) = entries.next_entry().await {
                let entry_path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                if metadata.is_dir() {
                    stack.push(entry_path);
                } else if metadata.is_file() {
                    if Self::is_staging_file(&entry.file_name().to_string_lossy()) {
                        continue;
                    }
                    // Convert to relative path
                    if let Ok(relative) = entry_path.strip_prefix(&self.base_path) {
                        let relative_str = relative.to_string_lossy().to_string();
                        if relative_str.starts_with(prefix) {
                            results.push(relative_str);
                        }
                    }
                }
            }
        }

        results.sort();
        debug!(count = results.len(), "Found files");
        Ok(results)
    }

    #[instrument(skip(self), fields(backend = "local"))]
    async fn create_dir(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::create_dir_all(&full_path).await.map_err(|e| {
            Error::persistence(format!("Failed to create directory {:?}: {}", full_path, e))
        })
    }
}

/// Lists real directories
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDirectoryLister;

#[async_trait]
impl DirectoryLister for LocalDirectoryLister {
    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list directory");
                return Err(Error::Io(e));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, LocalStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());
        (temp_dir, storage)
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (_temp_dir, storage) = setup().await;
        let data = Bytes::from("hello world");

        let written = storage.write("test.txt", data.clone()).await.unwrap();
        assert_eq!(written, 11);

        let read_data = storage.read("test.txt").await.unwrap();
        assert_eq!(read_data, data);
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let (_temp_dir, storage) = setup().await;
        let data = Bytes::from("nested content");

        storage.write("best/deep.ckpt", data.clone()).await.unwrap();

        let read_data = storage.read("best/deep.ckpt").await.unwrap();
        assert_eq!(read_data, data);
    }

    #[tokio::test]
    async fn test_staged_write_invisible_until_promoted() {
        let (_temp_dir, storage) = setup().await;

        let staged = storage
            .write_staged("ckpt-1.ckpt", Bytes::from("payload"))
            .await
            .unwrap();
        assert!(!storage.exists("ckpt-1.ckpt").await.unwrap());
        assert!(storage.list("").await.unwrap().is_empty());

        storage.promote(staged).await.unwrap();
        assert!(storage.exists("ckpt-1.ckpt").await.unwrap());
        assert_eq!(storage.list("").await.unwrap(), vec!["ckpt-1.ckpt"]);
    }

    #[tokio::test]
    async fn test_abandoned_stage_is_never_listed() {
        let (temp_dir, storage) = setup().await;

        // A crash between staging and promotion leaves only the temp file
        let staged = storage
            .write_staged("ckpt-2.ckpt", Bytes::from("partial"))
            .await
            .unwrap();
        drop(staged);

        let temp_files = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(temp_files, 1);
        assert!(storage.list("ckpt-").await.unwrap().is_empty());
        assert!(matches!(
            storage.read("ckpt-2.ckpt").await,
            Err(Error::StoragePathNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_discard() {
        let (temp_dir, storage) = setup().await;

        let staged = storage
            .write_staged("gone.bin", Bytes::from("x"))
            .await
            .unwrap();
        storage.discard(staged).await.unwrap();

        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_delete_not_found() {
        let (_temp_dir, storage) = setup().await;

        let result = storage.delete("missing.txt").await;
        assert!(matches!(result, Err(Error::StoragePathNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list() {
        let (_temp_dir, storage) = setup().await;

        storage
            .write("ckpt-0000000001.ckpt", Bytes::from("1"))
            .await
            .unwrap();
        storage
            .write("ckpt-0000000002.ckpt", Bytes::from("2"))
            .await
            .unwrap();
        storage
            .write("best/ckpt-0000000002.ckpt", Bytes::from("2"))
            .await
            .unwrap();

        let latest = storage.list("ckpt-").await.unwrap();
        assert_eq!(
            latest,
            vec!["ckpt-0000000001.ckpt", "ckpt-0000000002.ckpt"]
        );

        let best = storage.list("best/").await.unwrap();
        assert_eq!(best, vec!["best/ckpt-0000000002.ckpt"]);

        let all = storage.list("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_create_dir_is_idempotent() {
        let (temp_dir, storage) = setup().await;

        storage.create_dir("a/b").await.unwrap();
        storage.create_dir("a/b").await.unwrap();
        assert!(temp_dir.path().join("a/b").is_dir());
    }

    #[tokio::test]
    async fn test_directory_lister() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("ucihar-0-dann-1")).unwrap();
        std::fs::create_dir(temp_dir.path().join("ucihar-0-dann-2")).unwrap();

        let names = LocalDirectoryLister.list_dir(temp_dir.path()).await.unwrap();
        assert_eq!(names, vec!["ucihar-0-dann-1", "ucihar-0-dann-2"]);

        let missing = LocalDirectoryLister
            .list_dir(&temp_dir.path().join("nope"))
            .await
            .unwrap();
        assert!(missing.is_empty());
    }
}
