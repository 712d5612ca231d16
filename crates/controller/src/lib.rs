//! Experiment-run controller
//!
//! This crate ties the pieces of a training run together:
//! - **Run identity**: run naming, debug numbering and directory resolution
//! - **Step scheduling**: cadence-gated metrics, validation, checkpoints and plots
//! - **Launch**: config validation, config snapshot and checkpoint restore
//!
//! # Example
//!
//! ```ignore
//! use controller::{launch, SyntheticTrainer};
//! use run_core::RunConfig;
//!
//! #[tokio::main]
//! async fn main() -> run_core::Result<()> {
//!     let config = RunConfig::from_json_file("run.json".as_ref())?;
//!     let mut trainer = SyntheticTrainer::new(0, config.schedule.total_steps);
//!     let summary = launch(&config, &mut trainer).await?;
//!     println!("best: {:?}", summary.best);
//!     Ok(())
//! }
//! ```

pub mod hooks;
pub mod identity;
pub mod run;
pub mod scheduler;
pub mod synthetic;

pub use hooks::RunHooks;
pub use identity::{create_dirs, next_debug_number, RunIdentity};
pub use run::{launch, Launch, CONFIG_SNAPSHOT};
pub use scheduler::{RunSummary, SchedulerConfig, StepScheduler, FINISHED_MARKER};
pub use synthetic::SyntheticTrainer;
