//! Checkpoint management for training runs
//!
//! Provides checkpoint encoding, atomic persistence, best-score tracking and
//! recovery of the latest committed state.

pub mod manager;
pub mod writer;

pub use manager::{CheckpointManager, CheckpointManagerConfig, Restored, SaveOutcome};
pub use writer::{CheckpointWriter, WriteRequest};
