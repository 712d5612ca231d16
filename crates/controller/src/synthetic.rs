//! Deterministic stand-in trainer
//!
//! Produces a noisy, slowly rising accuracy curve from a seeded RNG so the
//! controller can be exercised end to end without a model. Its state
//! serializes to JSON and survives checkpoint restore.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use run_core::{Error, Result, ScheduleState, Split, Step};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::hooks::RunHooks;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrainerState {
    seed: u64,
    steps_trained: u64,
    loss: f64,
}

/// Synthetic [`RunHooks`] implementation
pub struct SyntheticTrainer {
    state: TrainerState,
    rng: ChaCha8Rng,
    total_steps: Step,
}

impl SyntheticTrainer {
    pub fn new(seed: u64, total_steps: Step) -> Self {
        Self {
            state: TrainerState {
                seed,
                steps_trained: 0,
                loss: 2.5,
            },
            rng: ChaCha8Rng::seed_from_u64(seed),
            total_steps,
        }
    }

    /// Training steps applied so far, including restored ones
    pub fn steps_trained(&self) -> u64 {
        self.state.steps_trained
    }

    pub fn loss(&self) -> f64 {
        self.state.loss
    }

    fn accuracy(&mut self) -> f64 {
        let progress = self.state.steps_trained as f64 / self.total_steps.max(1) as f64;
        let noise: f64 = self.rng.gen_range(-0.02..0.02);
        (0.5 + 0.45 * progress.min(1.0) + noise).clamp(0.0, 1.0)
    }
}

#[async_trait]
impl RunHooks for SyntheticTrainer {
    async fn train_step(&mut self, _step: Step) -> Result<()> {
        let decay: f64 = self.rng.gen_range(0.9990..0.9999);
        self.state.loss *= decay;
        self.state.steps_trained += 1;
        Ok(())
    }

    async fn train_metrics(&mut self, step: Step, elapsed: Duration) -> Result<()> {
        info!(
            step,
            loss = self.state.loss,
            step_secs = elapsed.as_secs_f64(),
            "Training metrics"
        );
        Ok(())
    }

    async fn validate(&mut self, step: Step, split: Split) -> Result<Option<f64>> {
        let accuracy = self.accuracy();
        info!(step, %split, accuracy, "Evaluation");
        Ok(Some(accuracy))
    }

    async fn plots(&mut self, step: Step) -> Result<()> {
        debug!(step, "Plots skipped for synthetic trainer");
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(&self.state)?))
    }

    async fn restore(&mut self, blob: Bytes) -> Result<()> {
        let state: TrainerState =
            serde_json::from_slice(&blob).map_err(|e| Error::hook("restore", e))?;
        // Reseed from the restored position so a resumed run stays deterministic
        self.rng = ChaCha8Rng::seed_from_u64(state.seed ^ state.steps_trained);
        info!(steps_trained = state.steps_trained, loss = state.loss, "Trainer state restored");
        self.state = state;
        Ok(())
    }

    async fn finished(&mut self, state: &ScheduleState) -> Result<()> {
        info!(
            final_step = state.current_step,
            steps_trained = self.state.steps_trained,
            loss = self.state.loss,
            "Synthetic training finished"
        );
        Ok(())
    }
}
