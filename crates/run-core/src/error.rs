//! Error types for the experiment-run controller

use thiserror::Error;

/// Result type alias using the run Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the experiment-run controller
#[derive(Error, Debug)]
pub enum Error {
    // Caller errors
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // Persistence errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Checkpoint corrupted: {path} - {reason}")]
    CheckpointCorrupted { path: String, reason: String },

    #[error("Storage path not found: {path}")]
    StoragePathNotFound { path: String },

    // Dataset writer errors
    #[error("Shape mismatch: {inputs} inputs, {labels} labels, {domains} domain tags")]
    ShapeMismatch {
        inputs: usize,
        labels: usize,
        domains: usize,
    },

    // Collaborator errors
    #[error("Hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Shorthand for an `InvalidArgument` error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            message: message.into(),
        }
    }

    /// Shorthand for an `InvalidConfiguration` error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Shorthand for a `Persistence` error
    pub fn persistence(message: impl Into<String>) -> Self {
        Error::Persistence {
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure for the named hook
    pub fn hook(hook: &str, err: impl std::fmt::Display) -> Self {
        Error::Hook {
            hook: hook.to_string(),
            message: err.to_string(),
        }
    }

    /// Returns true if this error must abort the whole run
    ///
    /// `InvalidArgument` and `ShapeMismatch` only abort the offending call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfiguration { .. }
                | Error::Persistence { .. }
                | Error::Hook { .. }
                | Error::Io(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
