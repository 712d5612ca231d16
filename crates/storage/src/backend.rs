//! Storage backend trait definitions
//!
//! Defines the async interface that all storage backends must implement, plus
//! the directory-listing capability used when numbering debug runs.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use run_core::Result;

/// Handle to data written to a staging location but not yet visible
///
/// Dropping the handle without promoting it leaves the committed view
/// untouched, which is what a crash mid-write looks like.
#[derive(Debug)]
pub struct StagedWrite {
    path: String,
    staging_key: String,
    size: u64,
}

impl StagedWrite {
    /// Create a handle for `path` staged under `staging_key`
    pub fn new(path: impl Into<String>, staging_key: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            staging_key: staging_key.into(),
            size,
        }
    }

    /// Final path the data is promoted to
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Backend-specific staging location
    pub fn staging_key(&self) -> &str {
        &self.staging_key
    }

    /// Number of bytes staged
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Async trait for storage backends
///
/// Implementors provide basic CRUD operations for binary data. Listing and
/// reading only ever observe promoted data.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read data from the given path
    ///
    /// # Errors
    /// `StoragePathNotFound` if the path was never promoted, `Persistence` if
    /// the read fails
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Write data to a staging location for `path`
    ///
    /// Creates parent directories if they don't exist. Nothing becomes visible
    /// under `path` until [`StorageBackend::promote`] is called.
    async fn write_staged(&self, path: &str, data: Bytes) -> Result<StagedWrite>;

    /// Atomically publish staged data under its final path
    ///
    /// # Returns
    /// Number of bytes published
    async fn promote(&self, staged: StagedWrite) -> Result<u64>;

    /// Throw away staged data
    async fn discard(&self, staged: StagedWrite) -> Result<()>;

    /// Stage then promote in one call
    async fn write(&self, path: &str, data: Bytes) -> Result<u64> {
        let staged = self.write_staged(path, data).await?;
        self.promote(staged).await
    }

    /// Delete data at the given path
    ///
    /// # Errors
    /// Returns error if path doesn't exist or deletion fails
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if a path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// List all promoted paths under a given prefix, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Create a directory, succeeding if it already exists
    async fn create_dir(&self, path: &str) -> Result<()>;
}

/// Lists the entry names directly inside a directory
///
/// Used to find the highest attempt number of a debug run. Backed by the
/// filesystem in production and by a fixed list in tests.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// Names (not paths) of the entries in `dir`. A missing directory is empty.
    async fn list_dir(&self, dir: &Path) -> Result<Vec<String>>;
}
