//! Run configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::{CadenceConfig, Error, MetricDirection, Result, Split, Step};

/// Adaptation methods a run may name
pub const KNOWN_METHODS: &[&str] = &[
    "none", "upper", "dann", "cycada", "deepjdot", "rdann", "vrada", "daws",
];

/// Main run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Run identity and directory settings
    pub identity: IdentityConfig,

    /// Step loop settings
    pub schedule: ScheduleConfig,

    /// Checkpoint settings
    pub checkpoint: CheckpointConfig,
}

impl RunConfig {
    /// Check every field needed before any directory or checkpoint I/O
    pub fn validate(&self) -> Result<()> {
        self.identity.validate()?;
        self.schedule.validate()?;
        self.checkpoint.validate()
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Pretty JSON used for the config snapshot in the log directory
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// How the per-run directory name gets a numeric suffix
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DebugMode {
    /// No suffix
    #[default]
    Off,

    /// One more than the highest suffix already in the log root
    AutoIncrement,

    /// A fixed suffix
    Explicit { number: u32 },
}

impl DebugMode {
    /// Combine the `--debug` and `--debugnum` flags. A non-negative number wins.
    ///
    /// # Errors
    /// `InvalidConfiguration` if the number does not fit a run suffix.
    pub fn from_flags(debug: bool, debug_number: i64) -> Result<Self> {
        if debug_number < 0 {
            return Ok(if debug {
                DebugMode::AutoIncrement
            } else {
                DebugMode::Off
            });
        }

        let number = u32::try_from(debug_number).map_err(|_| {
            Error::invalid_config(format!(
                "debug number {} exceeds the largest run suffix {}",
                debug_number,
                u32::MAX
            ))
        })?;
        if debug {
            warn!(
                debug_number,
                "Both debug and an explicit debug number given, using the number"
            );
        }
        Ok(DebugMode::Explicit { number })
    }
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityConfig {
    /// Dataset name (e.g. "ucihar")
    pub dataset: String,

    /// Unique run identifier
    pub uid: String,

    /// Adaptation method, one of `KNOWN_METHODS`
    pub method: String,

    /// Source domains
    pub sources: Vec<String>,

    /// Target domain, if any
    pub target: Option<String>,

    /// Root for model directories
    pub model_root: PathBuf,

    /// Root for log directories
    pub log_root: PathBuf,

    /// Use a per-run subdirectory under each root
    pub subdir: bool,

    /// Debug numbering
    pub debug: DebugMode,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            uid: String::new(),
            method: String::new(),
            sources: Vec::new(),
            target: None,
            model_root: PathBuf::from("models"),
            log_root: PathBuf::from("logs"),
            subdir: true,
            debug: DebugMode::Off,
        }
    }
}

impl IdentityConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("dataset", &self.dataset),
            ("uid", &self.uid),
            ("method", &self.method),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(format!("{} is required", name)));
            }
        }

        if !KNOWN_METHODS.contains(&self.method.as_str()) {
            return Err(Error::invalid_config(format!(
                "unknown method '{}', expected one of {:?}",
                self.method, KNOWN_METHODS
            )));
        }

        if self.sources.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::invalid_config("at least one source domain is required"));
        }

        Ok(())
    }
}

/// Step loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    /// Last training step (inclusive)
    pub total_steps: Step,

    /// Cadences of the periodic actions
    pub cadence: CadenceConfig,

    /// Only time the training steps, skipping metrics, checkpoints and plots
    pub time_only: bool,

    /// Evaluate on the test split instead of the validation split
    pub eval_on_test: bool,

    /// Log the step duration every N steps
    pub step_log_every: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            total_steps: 80_000,
            cadence: CadenceConfig::default(),
            time_only: false,
            eval_on_test: false,
            step_log_every: 100,
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        self.cadence.validate()?;
        if self.step_log_every == 0 {
            return Err(Error::invalid_config("step_log_every must be positive"));
        }
        Ok(())
    }

    /// Split handed to the validation hook
    pub fn evaluation_split(&self) -> Split {
        if self.eval_on_test {
            Split::Test
        } else {
            Split::Valid
        }
    }
}

/// Checkpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointConfig {
    /// Number of checkpoints to keep in the latest slot
    pub keep_count: usize,

    /// Number of checkpoints to keep in the best slot
    pub keep_best: usize,

    /// Enable compression
    pub compression: bool,

    /// Compression level (1-21)
    pub compression_level: i32,

    /// Which way the validation score improves
    pub direction: MetricDirection,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            keep_count: 5,
            keep_best: 1,
            compression: true,
            compression_level: 3,
            direction: MetricDirection::HigherIsBetter,
        }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<()> {
        if self.keep_count == 0 || self.keep_best == 0 {
            return Err(Error::invalid_config(
                "keep_count and keep_best must be at least 1",
            ));
        }
        if !(1..=21).contains(&self.compression_level) {
            return Err(Error::invalid_config(format!(
                "compression_level must be in 1..=21, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}
