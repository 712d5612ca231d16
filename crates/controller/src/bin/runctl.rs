//! runctl binary entry point
//!
//! Resolves the run directories, restores the latest checkpoint and drives the
//! step loop with the synthetic trainer.
//!
//! Usage: runctl --method dann --dataset ucihar --sources 14,15 --target 19 --uid 0 [options]

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use controller::{Launch, SyntheticTrainer};
use dataset::NamingPolicy;
use run_core::{
    CadenceConfig, CheckpointConfig, DebugMode, IdentityConfig, RunConfig, ScheduleConfig, Split,
    KNOWN_METHODS,
};

#[derive(Parser, Debug)]
#[command(name = "runctl", about = "Run a resumable domain adaptation experiment")]
struct Args {
    /// Directory for saving model checkpoints
    #[arg(long, default_value = "models")]
    modeldir: PathBuf,

    /// Directory for saving logs
    #[arg(long, default_value = "logs")]
    logdir: PathBuf,

    /// Adaptation method
    #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(KNOWN_METHODS.iter().copied()))]
    method: String,

    /// Dataset name
    #[arg(long)]
    dataset: String,

    /// Source domains, comma separated
    #[arg(long, value_delimiter = ',', required = true)]
    sources: Vec<String>,

    /// Target domain, if any
    #[arg(long, default_value = "")]
    target: String,

    /// Unique run identifier
    #[arg(long)]
    uid: String,

    /// Number of training steps
    #[arg(long, default_value_t = 80000)]
    steps: u64,

    /// Save a checkpoint every this many steps
    #[arg(long, default_value_t = 4000)]
    model_steps: u64,

    /// Log training metrics every this many steps
    #[arg(long, default_value_t = 500)]
    log_train_steps: u64,

    /// Validate every this many steps, and at the last step
    #[arg(long, default_value_t = 4000)]
    log_val_steps: u64,

    /// Log plots every this many steps
    #[arg(long, default_value_t = 4000)]
    log_plots_steps: u64,

    /// Evaluate on the test split instead of the validation split
    #[arg(long)]
    test: bool,

    /// Use a per-run subdirectory under modeldir and logdir
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    subdir: bool,

    /// Number the run directory one past the highest existing number
    #[arg(long)]
    debug: bool,

    /// Use this run directory number (overrides --debug when >= 0)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    debugnum: i64,

    /// Only time each training step, skipping evaluation and checkpoints
    #[arg(long)]
    time_training: bool,

    /// Seed for the synthetic trainer
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn into_config(self) -> run_core::Result<RunConfig> {
        let target = Some(self.target).filter(|t| !t.is_empty());
        let debug = DebugMode::from_flags(self.debug, self.debugnum)?;

        Ok(RunConfig {
            identity: IdentityConfig {
                dataset: self.dataset,
                uid: self.uid,
                method: self.method,
                sources: self.sources,
                target,
                model_root: self.modeldir,
                log_root: self.logdir,
                subdir: self.subdir,
                debug,
            },
            schedule: ScheduleConfig {
                total_steps: self.steps,
                cadence: CadenceConfig {
                    train_every: self.log_train_steps,
                    val_every: self.log_val_steps,
                    model_every: self.model_steps,
                    plots_every: self.log_plots_steps,
                },
                time_only: self.time_training,
                eval_on_test: self.test,
                ..Default::default()
            },
            checkpoint: CheckpointConfig::default(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runctl=info,controller=info,checkpoint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let seed = args.seed;
    let config = args.into_config()?;

    let policy = NamingPolicy::default();
    let files = policy.run_files(
        &config.identity.sources,
        config.identity.target.as_deref(),
        Split::Train,
    )?;
    tracing::info!(dataset = %config.identity.dataset, ?files, "Training data files");

    let launch = Launch::prepare(&config).await?;
    tracing::info!(
        model_dir = %launch.dirs().model_dir.display(),
        log_dir = %launch.dirs().log_dir.display(),
        "Starting run"
    );

    let mut trainer = SyntheticTrainer::new(seed, config.schedule.total_steps);
    let summary = launch.run(&mut trainer).await?;

    tracing::info!(
        iterations = summary.iterations,
        checkpoints_saved = summary.checkpoints_saved,
        best_step = ?summary.best.as_ref().map(|b| b.step),
        best_score = ?summary.best.as_ref().and_then(|b| b.validation_score),
        "Run complete"
    );

    Ok(())
}
