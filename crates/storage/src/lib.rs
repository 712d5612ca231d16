//! Storage - Pluggable storage backends for the experiment-run controller
//!
//! Provides async storage operations with support for:
//! - Local filesystem, staging to hidden temp files and promoting by rename
//! - An in-memory backend for tests and dry runs
//!
//! Writes are split in two phases so callers can guarantee that a partially
//! written file is never visible: `write_staged` followed by `promote`.
//!
//! # Example
//!
//! ```no_run
//! use storage::{StorageBackend, LocalStorage};
//! use bytes::Bytes;
//!
//! # async fn example() -> run_core::Result<()> {
//! let storage = LocalStorage::new("/tmp/models/ucihar-0-dann");
//! let staged = storage.write_staged("ckpt-0000000001.ckpt", Bytes::from(vec![1, 2, 3])).await?;
//! storage.promote(staged).await?;
//! let data = storage.read("ckpt-0000000001.ckpt").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod local;
mod memory;

pub use backend::{DirectoryLister, StagedWrite, StorageBackend};
pub use local::{LocalDirectoryLister, LocalStorage};
pub use memory::{MemoryDirectoryLister, MemoryStorage};
