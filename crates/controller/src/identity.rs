//! Run identity and directory resolution
//!
//! A run is named `"{dataset}-{uid}-{method}"`. Debug numbering appends
//! `-{n}`, either fixed or one past the highest number already present in the
//! log root.
//!
//! Auto-increment reads the log root and then creates the directory without
//! any lock, so two processes starting together can pick the same number.
//! Runs are expected to be launched one at a time per base name.

use std::path::Path;

use run_core::{DebugMode, Error, IdentityConfig, Result, RunDirs};
use storage::DirectoryLister;
use tracing::{debug, info};

/// Identity of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIdentity {
    dataset: String,
    uid: String,
    method: String,
    debug: DebugMode,
}

impl RunIdentity {
    /// Build an identity, rejecting empty fields
    pub fn new(
        dataset: impl Into<String>,
        uid: impl Into<String>,
        method: impl Into<String>,
        debug: DebugMode,
    ) -> Result<Self> {
        let identity = Self {
            dataset: dataset.into(),
            uid: uid.into(),
            method: method.into(),
            debug,
        };

        for (name, value) in [
            ("dataset", &identity.dataset),
            ("uid", &identity.uid),
            ("method", &identity.method),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(format!(
                    "run identity requires a non-empty {}",
                    name
                )));
            }
        }

        Ok(identity)
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        Self::new(&config.dataset, &config.uid, &config.method, config.debug)
    }

    /// `"{dataset}-{uid}-{method}"`
    pub fn base_name(&self) -> String {
        format!("{}-{}-{}", self.dataset, self.uid, self.method)
    }

    /// Resolve the model and log directories.
    ///
    /// Precedence: explicit debug number, then auto-increment, then the
    /// per-run subdirectory, then the roots themselves. Only auto-increment
    /// consults `lister`.
    pub async fn resolve(
        &self,
        model_root: &Path,
        log_root: &Path,
        subdir: bool,
        lister: &dyn DirectoryLister,
    ) -> Result<RunDirs> {
        let base = self.base_name();

        let run_name = match self.debug {
            DebugMode::Explicit { number } => Some(format!("{}-{}", base, number)),
            DebugMode::AutoIncrement => {
                let entries = lister.list_dir(log_root).await?;
                let next = next_debug_number(&base, &entries);
                debug!(base = %base, next, existing = entries.len(), "Auto-incremented debug number");
                Some(format!("{}-{}", base, next))
            }
            DebugMode::Off if subdir => Some(base),
            DebugMode::Off => None,
        };

        let dirs = match &run_name {
            Some(name) => RunDirs {
                run_name: run_name.clone(),
                model_dir: model_root.join(name),
                log_dir: log_root.join(name),
            },
            None => RunDirs {
                run_name: None,
                model_dir: model_root.to_path_buf(),
                log_dir: log_root.to_path_buf(),
            },
        };

        info!(
            run_name = ?dirs.run_name,
            model_dir = %dirs.model_dir.display(),
            log_dir = %dirs.log_dir.display(),
            "Resolved run directories"
        );
        Ok(dirs)
    }
}

/// One past the highest `{base}-{digits}` entry, or 1 when there is none
pub fn next_debug_number(base: &str, entries: &[String]) -> u64 {
    let prefix = format!("{}-", base);
    entries
        .iter()
        .filter_map(|name| name.strip_prefix(&prefix))
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .map_or(1, |max| max + 1)
}

/// Create both run directories; existing directories are fine
pub async fn create_dirs(dirs: &RunDirs) -> Result<()> {
    for dir in [&dirs.model_dir, &dirs.log_dir] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::persistence(format!("Failed to create directory {:?}: {}", dir, e))
        })?;
    }
    Ok(())
}
