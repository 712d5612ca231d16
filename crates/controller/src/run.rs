//! Run launcher
//!
//! Wires a validated [`RunConfig`] into directories, storage, the checkpoint
//! manager and the scheduler, then drives the run.

use std::sync::Arc;

use bytes::Bytes;
use checkpoint::{CheckpointManager, CheckpointManagerConfig};
use run_core::{Result, RunConfig, RunDirs};
use storage::{DirectoryLister, LocalDirectoryLister, LocalStorage, StorageBackend};
use tracing::info;

use crate::hooks::RunHooks;
use crate::identity::{create_dirs, RunIdentity};
use crate::scheduler::{RunSummary, SchedulerConfig, StepScheduler};

/// Name of the config snapshot written to the log directory
pub const CONFIG_SNAPSHOT: &str = "config.json";

/// A prepared run: directories exist and the config snapshot is written
pub struct Launch {
    dirs: RunDirs,
    scheduler: StepScheduler,
}

impl Launch {
    /// Prepare a run on the local filesystem
    pub async fn prepare(config: &RunConfig) -> Result<Self> {
        Self::prepare_with_lister(config, &LocalDirectoryLister).await
    }

    /// Prepare a run, resolving auto-increment numbering through `lister`
    pub async fn prepare_with_lister(
        config: &RunConfig,
        lister: &dyn DirectoryLister,
    ) -> Result<Self> {
        config.validate()?;

        let identity = RunIdentity::from_config(&config.identity)?;
        let dirs = identity
            .resolve(
                &config.identity.model_root,
                &config.identity.log_root,
                config.identity.subdir,
                lister,
            )
            .await?;
        create_dirs(&dirs).await?;

        let model_storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&dirs.model_dir));
        let log_storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&dirs.log_dir));

        let snapshot = config.to_json_pretty()?;
        log_storage
            .write(CONFIG_SNAPSHOT, Bytes::from(snapshot.into_bytes()))
            .await?;

        let manager = CheckpointManager::open(
            CheckpointManagerConfig::from(&config.checkpoint),
            model_storage,
        )
        .await?;
        let scheduler =
            StepScheduler::new(SchedulerConfig::from(&config.schedule), manager, log_storage)?;

        info!(
            run_name = ?dirs.run_name,
            method = %config.identity.method,
            total_steps = config.schedule.total_steps,
            "Run prepared"
        );

        Ok(Self { dirs, scheduler })
    }

    pub fn dirs(&self) -> &RunDirs {
        &self.dirs
    }

    pub fn scheduler(&self) -> &StepScheduler {
        &self.scheduler
    }

    /// Run to completion
    pub async fn run<H>(mut self, hooks: &mut H) -> Result<RunSummary>
    where
        H: RunHooks + ?Sized,
    {
        self.scheduler.run(hooks).await
    }
}

/// Prepare and run in one call
pub async fn launch<H>(config: &RunConfig, hooks: &mut H) -> Result<RunSummary>
where
    H: RunHooks + ?Sized,
{
    Launch::prepare(config).await?.run(hooks).await
}
