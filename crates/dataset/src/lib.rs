//! Dataset files for domain adaptation runs
//!
//! This crate provides:
//! - **Naming policy** for canonical, order-independent file names per domain pair
//! - **Record files** holding (input, label, domain) examples with corpus-wide compression
//!
//! # Example
//!
//! ```rust
//! use dataset::NamingPolicy;
//!
//! let policy = NamingPolicy::default();
//! let forward = policy.file_name("A", Some("B"), "A", "test").unwrap();
//! let backward = policy.file_name("B", Some("A"), "A", "test").unwrap();
//! assert_eq!(forward, "A_and_B_A_test.tfrecord");
//! assert_eq!(forward, backward);
//! ```

mod naming;
mod record;
mod writer;

pub use naming::{NamingPolicy, DEFAULT_EXTENSION, DEFAULT_PAIRING_INSENSITIVE, PAIR_SEPARATOR};
pub use record::{Example, Tensor, TensorData};
pub use writer::{RecordReader, RecordWriter, WriteSummary, COMPRESSION_LEVEL};

// Re-export types from run-core for convenience
pub use run_core::types::{DomainPairKey, Split};
