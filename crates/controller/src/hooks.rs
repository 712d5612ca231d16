//! Training collaborator interface driven by the scheduler

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use run_core::{Result, ScheduleState, Split, Step};
use tracing::info;

/// Callbacks the scheduler invokes, in order, from a single task.
///
/// Any error returned aborts the run.
#[async_trait]
pub trait RunHooks: Send {
    /// Run one optimization step
    async fn train_step(&mut self, step: Step) -> Result<()>;

    /// Report training metrics; `elapsed` is the duration of the last step
    async fn train_metrics(&mut self, step: Step, elapsed: Duration) -> Result<()>;

    /// Evaluate on `split`, optionally returning a score for best tracking
    async fn validate(&mut self, step: Step, split: Split) -> Result<Option<f64>>;

    async fn plots(&mut self, step: Step) -> Result<()>;

    /// Opaque state to persist in a checkpoint
    async fn snapshot(&mut self) -> Result<Bytes>;

    /// Load state from a restored checkpoint before the first step
    async fn restore(&mut self, blob: Bytes) -> Result<()>;

    /// Timing record in time-only mode
    async fn timing(&mut self, step: Step, elapsed: Duration) -> Result<()> {
        info!(step, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "Step timing");
        Ok(())
    }

    /// Called once after the loop, whether or not any step ran
    async fn finished(&mut self, _state: &ScheduleState) -> Result<()> {
        Ok(())
    }
}
