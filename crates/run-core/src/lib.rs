//! Run Core - Foundation for the experiment-run controller
//!
//! Provides core types, error handling, and configuration shared by the
//! storage, checkpoint, dataset and controller crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    CheckpointConfig, DebugMode, IdentityConfig, RunConfig, ScheduleConfig, KNOWN_METHODS,
};
pub use error::{Error, Result};
pub use types::*;
