//! Core type definitions for the experiment-run controller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Result};

/// Training step counter
pub type Step = u64;

/// Append-order ordinal assigned to each saved checkpoint
pub type SeqNo = u64;

/// Checkpoint record as persisted by the checkpoint manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRecord {
    /// Append-order ordinal (the "saved at" position)
    pub seq: SeqNo,

    /// Number of completed steps recorded with this checkpoint
    pub step: Step,

    /// Validation score, if a validation ran for this save
    pub validation_score: Option<f64>,

    /// Slot the record lives in
    pub slot: CheckpointSlot,

    /// Storage path, relative to the model directory
    pub path: String,

    /// Checkpoint size in bytes
    pub size_bytes: u64,

    /// Timestamp when checkpoint was created
    pub created_at: DateTime<Utc>,

    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

/// Independently recoverable checkpoint slots
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSlot {
    /// Most recent saves, used for resumption
    Latest,

    /// Saves that improved the validation score
    Best,
}

impl CheckpointSlot {
    /// Path prefix of this slot inside the model directory
    pub fn prefix(&self) -> &'static str {
        match self {
            CheckpointSlot::Latest => "",
            CheckpointSlot::Best => "best/",
        }
    }
}

impl fmt::Display for CheckpointSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointSlot::Latest => write!(f, "latest"),
            CheckpointSlot::Best => write!(f, "best"),
        }
    }
}

/// Direction in which a validation score improves
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    /// Larger scores are better (accuracy)
    #[default]
    HigherIsBetter,

    /// Smaller scores are better (loss)
    LowerIsBetter,
}

impl MetricDirection {
    /// Returns true if `candidate` should replace `current` as the best score.
    ///
    /// Equal scores count as an improvement so the most recent save wins ties.
    pub fn improves(&self, candidate: f64, current: Option<f64>) -> bool {
        let Some(current) = current else {
            return true;
        };
        match self {
            MetricDirection::HigherIsBetter => candidate >= current,
            MetricDirection::LowerIsBetter => candidate <= current,
        }
    }
}

/// Loop position of the step scheduler
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleState {
    /// Next step to run
    pub current_step: Step,

    /// Last step of the run (inclusive)
    pub total_steps: Step,
}

impl ScheduleState {
    /// Create a schedule state starting at `current_step`
    pub fn new(current_step: Step, total_steps: Step) -> Self {
        Self {
            current_step,
            total_steps,
        }
    }

    /// Returns true once every step up to `total_steps` has run
    pub fn is_finished(&self) -> bool {
        self.current_step > self.total_steps
    }

    /// Advance by exactly one step, returning the new step value
    pub fn advance(&mut self) -> Step {
        self.current_step += 1;
        self.current_step
    }

    /// Number of loop iterations left
    pub fn remaining(&self) -> u64 {
        (self.total_steps + 1).saturating_sub(self.current_step)
    }
}

/// Intervals at which periodic actions fire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CadenceConfig {
    /// Train metrics every N steps
    pub train_every: u64,

    /// Validation every N steps (and at the last step)
    pub val_every: u64,

    /// Checkpoint every N steps
    pub model_every: u64,

    /// Plots every N steps
    pub plots_every: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            train_every: 500,
            val_every: 4000,
            model_every: 4000,
            plots_every: 4000,
        }
    }
}

impl CadenceConfig {
    /// Reject zero intervals
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("train_every", self.train_every),
            ("val_every", self.val_every),
            ("model_every", self.model_every),
            ("plots_every", self.plots_every),
        ] {
            if value == 0 {
                return Err(Error::invalid_config(format!(
                    "cadence {} must be a positive integer",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn train_due(&self, step: Step) -> bool {
        step % self.train_every == 0
    }

    pub fn validation_due(&self, step: Step, total_steps: Step) -> bool {
        step % self.val_every == 0 || step == total_steps
    }

    pub fn model_due(&self, step: Step) -> bool {
        step % self.model_every == 0
    }

    pub fn plots_due(&self, step: Step) -> bool {
        step % self.plots_every == 0
    }
}

/// Dataset split
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Valid => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "valid" => Ok(Split::Valid),
            "test" => Ok(Split::Test),
            other => Err(Error::invalid_argument(format!(
                "split must be train, valid, or test, got '{}'",
                other
            ))),
        }
    }
}

/// Pair of domains a dataset file is prepared for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainPairKey {
    pub domain1: String,
    pub domain2: Option<String>,
}

impl DomainPairKey {
    /// A key for a source/target pair
    pub fn pair(domain1: impl Into<String>, domain2: impl Into<String>) -> Self {
        Self {
            domain1: domain1.into(),
            domain2: Some(domain2.into()),
        }
    }

    /// A key for a single, unpaired domain
    pub fn single(domain1: impl Into<String>) -> Self {
        Self {
            domain1: domain1.into(),
            domain2: None,
        }
    }

    /// Returns true if `name` is one of the two domains
    pub fn contains(&self, name: &str) -> bool {
        self.domain1 == name || self.domain2.as_deref() == Some(name)
    }
}

/// Directories resolved for one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunDirs {
    /// Per-run directory name, `None` in flat mode
    pub run_name: Option<String>,

    /// Checkpoint store
    pub model_dir: PathBuf,

    /// Logs, config snapshot and completion marker
    pub log_dir: PathBuf,
}
