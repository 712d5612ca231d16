//! Step scheduler
//!
//! Drives the training loop from the restored step to the configured total.
//! Each iteration runs one training step, advances the counter, and then fires
//! the cadence-gated actions for the new step value `i`:
//!
//! | Action        | Fires when                                  |
//! |---------------|---------------------------------------------|
//! | train metrics | `i % train_every == 0`                      |
//! | validation    | `i % val_every == 0` or `i == total_steps`  |
//! | checkpoint    | `i % model_every == 0` or a score came back |
//! | plots         | `i % plots_every == 0`                      |
//!
//! Checkpoints are saved at step `i - 1`. In time-only mode only a timing
//! record is emitted per step.
//!
//! A restart resumes at the step after the newest checkpoint, so a completed
//! run restarts one step back unless its last save landed on `total_steps`.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use checkpoint::CheckpointManager;
use run_core::{
    CadenceConfig, CheckpointRecord, Error, Result, ScheduleConfig, ScheduleState, Split, Step,
};
use storage::StorageBackend;
use tracing::{debug, info, instrument};

use crate::hooks::RunHooks;

/// Zero-byte file written to the log directory when a run completes
pub const FINISHED_MARKER: &str = "finished.txt";

/// Scheduler settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Last step of the run (inclusive)
    pub total_steps: Step,

    /// Action intervals
    pub cadence: CadenceConfig,

    /// Only time steps, skipping metrics, validation, checkpoints and plots
    pub time_only: bool,

    /// Split handed to the validation hook
    pub eval_split: Split,

    /// Interval for logging step duration
    pub step_log_every: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&ScheduleConfig::default())
    }
}

impl From<&ScheduleConfig> for SchedulerConfig {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            total_steps: config.total_steps,
            cadence: config.cadence,
            time_only: config.time_only,
            eval_split: config.evaluation_split(),
            step_log_every: config.step_log_every,
        }
    }
}

/// What a finished run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Schedule state after the loop
    pub final_state: ScheduleState,

    /// Iterations executed by this invocation
    pub iterations: u64,

    /// Checkpoints saved by this invocation
    pub checkpoints_saved: u64,

    /// Best checkpoint at the end of the run
    pub best: Option<CheckpointRecord>,
}

/// Runs the training loop against a checkpoint manager
pub struct StepScheduler {
    config: SchedulerConfig,
    manager: CheckpointManager,
    log_storage: Arc<dyn StorageBackend>,
}

impl StepScheduler {
    /// Create a scheduler; `log_storage` receives the completion marker.
    ///
    /// # Errors
    /// `InvalidConfiguration` if any interval is zero.
    pub fn new(
        config: SchedulerConfig,
        manager: CheckpointManager,
        log_storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        config.cadence.validate()?;
        if config.step_log_every == 0 {
            return Err(Error::invalid_config("step_log_every must be positive"));
        }
        Ok(Self {
            config,
            manager,
            log_storage,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn manager(&self) -> &CheckpointManager {
        &self.manager
    }

    /// Restore the latest checkpoint and run to completion
    #[instrument(skip(self, hooks), fields(total_steps = self.config.total_steps))]
    pub async fn run<H>(&mut self, hooks: &mut H) -> Result<RunSummary>
    where
        H: RunHooks + ?Sized,
    {
        let restored = self.manager.restore_latest(self.config.total_steps).await?;
        if let Some(blob) = restored.blob {
            hooks.restore(blob).await?;
        }

        let mut state = restored.state;
        info!(
            resume_step = state.current_step,
            remaining = state.remaining(),
            "Starting training loop"
        );

        let mut iterations = 0u64;
        let mut checkpoints_saved = 0u64;

        while !state.is_finished() {
            let started = Instant::now();
            hooks.train_step(state.current_step).await?;
            let i = state.advance();
            let elapsed = started.elapsed();
            iterations += 1;

            if self.config.time_only {
                hooks.timing(i, elapsed).await?;
                continue;
            }

            if i % self.config.step_log_every == 0 {
                info!(step = i, elapsed_secs = elapsed.as_secs_f64(), "Step finished");
            }

            let cadence = &self.config.cadence;

            if cadence.train_due(i) {
                hooks.train_metrics(i, elapsed).await?;
            }

            let score = if cadence.validation_due(i, self.config.total_steps) {
                let score = hooks.validate(i, self.config.eval_split).await?;
                debug!(step = i, score = ?score, "Validation finished");
                score
            } else {
                None
            };

            if cadence.model_due(i) || score.is_some() {
                let blob: Bytes = hooks.snapshot().await?;
                self.manager.save(i - 1, score, blob).await?;
                checkpoints_saved += 1;
            }

            if cadence.plots_due(i) {
                hooks.plots(i).await?;
            }
        }

        self.log_storage.write(FINISHED_MARKER, Bytes::new()).await?;
        hooks.finished(&state).await?;

        info!(
            final_step = state.current_step,
            iterations,
            checkpoints_saved,
            best_score = ?self.manager.best_score(),
            "Training loop finished"
        );

        Ok(RunSummary {
            final_state: state,
            iterations,
            checkpoints_saved,
            best: self.manager.best().cloned(),
        })
    }
}
