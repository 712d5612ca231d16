//! End-to-end training simulation tests
//!
//! These tests drive full runs on a real filesystem with:
//! - A trainer that crashes part way through and is relaunched
//! - Restarts of completed runs
//! - Leftover staging files and corrupt checkpoints in the model directory
//! - Best-checkpoint tracking across process restarts

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use checkpoint::{CheckpointManager, CheckpointManagerConfig};
use controller::{Launch, RunHooks, SyntheticTrainer, FINISHED_MARKER};
use run_core::{
    CheckpointSlot, DebugMode, Error, IdentityConfig, RunConfig, ScheduleState, Split, Step,
};
use std::sync::Arc;
use std::time::Duration;
use storage::{LocalStorage, StorageBackend};
use tempfile::TempDir;

/// Synthetic trainer that fails its training step at a chosen step
struct CrashingTrainer {
    inner: SyntheticTrainer,
    crash_at: Option<Step>,
    trained: Vec<Step>,
    finished: u32,
}

impl CrashingTrainer {
    fn new(total_steps: Step, crash_at: Option<Step>) -> Self {
        Self {
            inner: SyntheticTrainer::new(42, total_steps),
            crash_at,
            trained: Vec::new(),
            finished: 0,
        }
    }
}

#[async_trait]
impl RunHooks for CrashingTrainer {
    async fn train_step(&mut self, step: Step) -> run_core::Result<()> {
        if self.crash_at == Some(step) {
            return Err(Error::hook("train_step", format!("simulated crash at step {}", step)));
        }
        self.trained.push(step);
        self.inner.train_step(step).await
    }

    async fn train_metrics(&mut self, step: Step, elapsed: Duration) -> run_core::Result<()> {
        self.inner.train_metrics(step, elapsed).await
    }

    async fn validate(&mut self, step: Step, split: Split) -> run_core::Result<Option<f64>> {
        self.inner.validate(step, split).await
    }

    async fn plots(&mut self, step: Step) -> run_core::Result<()> {
        self.inner.plots(step).await
    }

    async fn snapshot(&mut self) -> run_core::Result<Bytes> {
        self.inner.snapshot().await
    }

    async fn restore(&mut self, blob: Bytes) -> run_core::Result<()> {
        self.inner.restore(blob).await
    }

    async fn finished(&mut self, state: &ScheduleState) -> run_core::Result<()> {
        self.finished += 1;
        self.inner.finished(state).await
    }
}

fn run_config(root: &TempDir, total_steps: Step, every: u64) -> RunConfig {
    let mut config = RunConfig {
        identity: IdentityConfig {
            dataset: "ucihar".to_string(),
            uid: "e2e".to_string(),
            method: "dann".to_string(),
            sources: vec!["14".to_string(), "15".to_string()],
            target: Some("19".to_string()),
            model_root: root.path().join("models"),
            log_root: root.path().join("logs"),
            debug: DebugMode::Explicit { number: 0 },
            ..Default::default()
        },
        ..Default::default()
    };
    config.schedule.total_steps = total_steps;
    config.schedule.cadence.train_every = every / 2;
    config.schedule.cadence.val_every = every;
    config.schedule.cadence.model_every = every;
    config.schedule.cadence.plots_every = every;
    config
}

async fn saved_steps(model_dir: &std::path::Path) -> Result<Vec<Step>> {
    let manager = CheckpointManager::open(
        CheckpointManagerConfig::default(),
        Arc::new(LocalStorage::new(model_dir)),
    )
    .await?;
    Ok(manager
        .list_saved(CheckpointSlot::Latest)
        .await?
        .iter()
        .map(|r| r.step)
        .collect())
}

#[tokio::test]
async fn test_crash_and_resume() -> Result<()> {
    let root = TempDir::new()?;
    let config = run_config(&root, 30, 10);

    // First attempt dies at step 25, after checkpoints at steps 9 and 19
    let launch = Launch::prepare(&config).await?;
    let dirs = launch.dirs().clone();
    let mut first = CrashingTrainer::new(30, Some(25));
    let err = launch.run(&mut first).await.unwrap_err();
    assert!(matches!(err, Error::Hook { .. }));
    assert_eq!(first.trained.last(), Some(&24));
    assert_eq!(first.finished, 0);
    assert!(!dirs.log_dir.join(FINISHED_MARKER).exists());
    assert_eq!(saved_steps(&dirs.model_dir).await?, vec![9, 19]);

    // Relaunch with the same identity picks up after the step 19 checkpoint
    let launch = Launch::prepare(&config).await?;
    assert_eq!(launch.dirs(), &dirs);
    let mut second = CrashingTrainer::new(30, None);
    let summary = launch.run(&mut second).await?;

    assert_eq!(second.trained, (20..=30).collect::<Vec<_>>());
    assert_eq!(summary.iterations, 11);
    assert_eq!(summary.final_state.current_step, 31);
    assert_eq!(second.finished, 1);
    assert!(dirs.log_dir.join(FINISHED_MARKER).exists());

    // Restored trainer state carried the 20 steps trained before the checkpoint
    assert_eq!(second.inner.steps_trained(), 31);
    assert_eq!(saved_steps(&dirs.model_dir).await?, vec![9, 19, 29]);

    Ok(())
}

#[tokio::test]
async fn test_restart_of_completed_run_runs_nothing() -> Result<()> {
    let root = TempDir::new()?;
    // With total 9 and a model step of 5, the final iteration (i = 10) saves step 9
    let config = run_config(&root, 9, 5);

    let launch = Launch::prepare(&config).await?;
    let dirs = launch.dirs().clone();
    let mut first = CrashingTrainer::new(9, None);
    launch.run(&mut first).await?;
    assert_eq!(first.trained, (0..=9).collect::<Vec<_>>());
    assert_eq!(saved_steps(&dirs.model_dir).await?.last(), Some(&9));

    std::fs::remove_file(dirs.log_dir.join(FINISHED_MARKER))?;

    let mut second = CrashingTrainer::new(9, None);
    let summary = Launch::prepare(&config).await?.run(&mut second).await?;
    assert!(second.trained.is_empty());
    assert_eq!(summary.iterations, 0);
    assert_eq!(summary.checkpoints_saved, 0);
    assert_eq!(second.finished, 1);
    assert!(dirs.log_dir.join(FINISHED_MARKER).exists());

    Ok(())
}

#[tokio::test]
async fn test_interrupted_stage_is_never_restored() -> Result<()> {
    let root = TempDir::new()?;
    let config = run_config(&root, 20, 10);

    let launch = Launch::prepare(&config).await?;
    let dirs = launch.dirs().clone();
    launch.run(&mut CrashingTrainer::new(20, Some(15))).await.unwrap_err();

    // A newer checkpoint staged but never promoted
    let storage = LocalStorage::new(&dirs.model_dir);
    storage
        .write_staged("ckpt-0000000099.ckpt", Bytes::from_static(b"half written"))
        .await?;

    let mut trainer = CrashingTrainer::new(20, None);
    Launch::prepare(&config).await?.run(&mut trainer).await?;
    assert_eq!(trainer.trained.first(), Some(&10));

    Ok(())
}

#[tokio::test]
async fn test_corrupt_newest_checkpoint_falls_back() -> Result<()> {
    let root = TempDir::new()?;
    let config = run_config(&root, 40, 10);

    let launch = Launch::prepare(&config).await?;
    let dirs = launch.dirs().clone();
    launch.run(&mut CrashingTrainer::new(40, Some(35))).await.unwrap_err();
    assert_eq!(saved_steps(&dirs.model_dir).await?, vec![9, 19, 29]);

    // Truncate the newest committed checkpoint in place
    let newest = std::fs::read_dir(&dirs.model_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "ckpt"))
        .max()
        .ok_or_else(|| anyhow::anyhow!("no checkpoint written"))?;
    let raw = std::fs::read(&newest)?;
    std::fs::write(&newest, &raw[..raw.len() / 2])?;

    let mut trainer = CrashingTrainer::new(40, None);
    Launch::prepare(&config).await?.run(&mut trainer).await?;
    assert_eq!(trainer.trained.first(), Some(&20));
    assert_eq!(trainer.trained.last(), Some(&40));

    Ok(())
}

#[tokio::test]
async fn test_best_checkpoint_survives_restart() -> Result<()> {
    let root = TempDir::new()?;
    let config = run_config(&root, 40, 10);

    let launch = Launch::prepare(&config).await?;
    let dirs = launch.dirs().clone();
    launch.run(&mut CrashingTrainer::new(40, Some(25))).await.unwrap_err();

    let before = {
        let manager = CheckpointManager::open(
            CheckpointManagerConfig::default(),
            Arc::new(LocalStorage::new(&dirs.model_dir)),
        )
        .await?;
        manager.best().cloned()
    };
    let before = before.ok_or_else(|| anyhow::anyhow!("no best checkpoint"))?;

    let summary = Launch::prepare(&config)
        .await?
        .run(&mut CrashingTrainer::new(40, None))
        .await?;
    let after = summary.best.ok_or_else(|| anyhow::anyhow!("no best checkpoint"))?;

    // Best never gets worse across the restart
    assert!(after.validation_score >= before.validation_score);
    assert!(after.seq >= before.seq);

    let manager = CheckpointManager::open(
        CheckpointManagerConfig::default(),
        Arc::new(LocalStorage::new(&dirs.model_dir)),
    )
    .await?;
    let (record, blob) = manager
        .restore_best()
        .await?
        .ok_or_else(|| anyhow::anyhow!("best slot empty"))?;
    assert_eq!(record.step, after.step);
    assert!(serde_json::from_slice::<serde_json::Value>(&blob).is_ok());

    Ok(())
}
