//! Checkpoint lifecycle manager: latest/best slots, recovery and retention

use bytes::Bytes;
use run_core::{
    CheckpointConfig, CheckpointRecord, CheckpointSlot, Error, MetricDirection, Result,
    ScheduleState, SeqNo, Step,
};
use std::collections::HashMap;
use std::sync::Arc;
use storage::StorageBackend;
use tracing::{debug, info, warn};

use crate::writer::{CheckpointWriter, WriteRequest};

/// Checkpoint manager configuration
#[derive(Debug, Clone)]
pub struct CheckpointManagerConfig {
    /// Number of checkpoints to keep in the latest slot
    pub keep_count: usize,

    /// Number of checkpoints to keep in the best slot
    pub keep_best: usize,

    /// Enable compression
    pub compression: bool,

    /// Compression level
    pub compression_level: i32,

    /// Which way validation scores improve
    pub direction: MetricDirection,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        Self::from(&CheckpointConfig::default())
    }
}

impl From<&CheckpointConfig> for CheckpointManagerConfig {
    fn from(config: &CheckpointConfig) -> Self {
        Self {
            keep_count: config.keep_count.max(1),
            keep_best: config.keep_best.max(1),
            compression: config.compression,
            compression_level: config.compression_level,
            direction: config.direction,
        }
    }
}

/// Result of restoring the latest checkpoint
#[derive(Debug, Clone)]
pub struct Restored {
    /// Where the step loop resumes
    pub state: ScheduleState,

    /// Record the state came from, `None` on a cold start
    pub record: Option<CheckpointRecord>,

    /// Trainable state to hand back to the training collaborator
    pub blob: Option<Bytes>,
}

/// Result of a save
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Record written to the latest slot
    pub record: CheckpointRecord,

    /// Whether this save also became the best checkpoint
    pub is_best: bool,
}

/// Owns the checkpoint history of one run
///
/// The manager is the only component that reads checkpoint files. Saves are
/// awaited to completion: when `save` returns, the checkpoint is promoted.
pub struct CheckpointManager {
    config: CheckpointManagerConfig,
    storage: Arc<dyn StorageBackend>,
    writer: CheckpointWriter,
    latest: Option<CheckpointRecord>,
    best: Option<CheckpointRecord>,
    next_seq: SeqNo,
}

impl CheckpointManager {
    /// Open the checkpoint store and rebuild the latest/best view from it
    pub async fn open(
        config: CheckpointManagerConfig,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        storage.create_dir(CheckpointSlot::Best.prefix()).await?;

        let writer = CheckpointWriter::new(
            storage.clone(),
            config.compression,
            config.compression_level,
        );

        let mut manager = Self {
            config,
            storage,
            writer,
            latest: None,
            best: None,
            next_seq: 1,
        };

        let latest = manager.list_saved(CheckpointSlot::Latest).await?;
        let best = manager.list_saved(CheckpointSlot::Best).await?;

        // Never reuse a sequence number, even one whose file is unreadable
        let mut max_seq = 0;
        for slot in [CheckpointSlot::Latest, CheckpointSlot::Best] {
            let paths = manager
                .storage
                .list(&CheckpointWriter::slot_prefix(slot))
                .await?;
            max_seq = paths
                .iter()
                .filter_map(|p| CheckpointWriter::parse_seq(p))
                .fold(max_seq, SeqNo::max);
        }

        manager.next_seq = max_seq + 1;
        manager.latest = latest.last().cloned();
        manager.best = manager.reconcile_best(&latest, &best).await?;

        info!(
            checkpoints = latest.len(),
            next_seq = manager.next_seq,
            best_score = ?manager.best_score(),
            "Checkpoint store opened"
        );

        Ok(manager)
    }

    /// Best-scored record across both slots. A winner held only by the latest
    /// slot is copied into the best slot before it is returned.
    async fn reconcile_best(
        &self,
        latest: &[CheckpointRecord],
        best: &[CheckpointRecord],
    ) -> Result<Option<CheckpointRecord>> {
        let mut candidates: Vec<&CheckpointRecord> = latest.iter().chain(best).collect();
        // Same seq: the best-slot copy comes last and wins the tie
        candidates.sort_by_key(|r| (r.seq, r.slot == CheckpointSlot::Best));

        let mut winner: Option<&CheckpointRecord> = None;
        for record in candidates {
            let Some(score) = record.validation_score.filter(|s| !s.is_nan()) else {
                continue;
            };
            let current = winner.and_then(|w| w.validation_score);
            if self.config.direction.improves(score, current) {
                winner = Some(record);
            }
        }

        let Some(winner) = winner else {
            return Ok(None);
        };
        if winner.slot == CheckpointSlot::Best {
            return Ok(Some(winner.clone()));
        }

        let path = CheckpointWriter::path_for(CheckpointSlot::Best, winner.seq);
        warn!(
            seq = winner.seq,
            step = winner.step,
            score = ?winner.validation_score,
            "Best checkpoint missing from best slot, republishing"
        );
        let raw = self.storage.read(&winner.path).await?;
        self.storage.write(&path, raw).await?;

        let record = CheckpointRecord {
            slot: CheckpointSlot::Best,
            path,
            ..winner.clone()
        };
        self.cleanup_old_checkpoints().await;
        Ok(Some(record))
    }

    /// Committed records in `slot`, in append order. Unreadable files are skipped.
    pub async fn list_saved(&self, slot: CheckpointSlot) -> Result<Vec<CheckpointRecord>> {
        let paths = self
            .storage
            .list(&CheckpointWriter::slot_prefix(slot))
            .await?;

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if CheckpointWriter::parse_seq(&path).is_none() {
                continue;
            }
            match self.writer.read_record(&path, slot).await {
                Ok(record) => records.push(record),
                Err(e @ Error::CheckpointCorrupted { .. }) => {
                    warn!(path = %path, error = %e, "Skipping unreadable checkpoint");
                }
                Err(e) => return Err(e),
            }
        }

        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    /// Restore the most recently appended checkpoint.
    ///
    /// A missing checkpoint is a cold start (step 0), not an error. A corrupt
    /// newest checkpoint falls back to the one before it.
    pub async fn restore_latest(&mut self, total_steps: Step) -> Result<Restored> {
        let paths = self
            .storage
            .list(&CheckpointWriter::slot_prefix(CheckpointSlot::Latest))
            .await?;

        for path in paths.iter().rev() {
            if CheckpointWriter::parse_seq(path).is_none() {
                continue;
            }
            match self.writer.read(path, CheckpointSlot::Latest).await {
                Ok((record, blob)) => {
                    let state = ScheduleState::new(record.step + 1, total_steps);
                    info!(
                        seq = record.seq,
                        step = record.step,
                        resume_step = state.current_step,
                        "Restored checkpoint"
                    );
                    self.latest = Some(record.clone());
                    return Ok(Restored {
                        state,
                        record: Some(record),
                        blob: Some(blob),
                    });
                }
                Err(e @ Error::CheckpointCorrupted { .. }) => {
                    warn!(path = %path, error = %e, "Checkpoint unreadable, trying previous");
                }
                Err(e) => return Err(e),
            }
        }

        info!("No checkpoint found, starting from step 0");
        Ok(Restored {
            state: ScheduleState::new(0, total_steps),
            record: None,
            blob: None,
        })
    }

    /// Load the best checkpoint, if any validation score was ever saved
    pub async fn restore_best(&self) -> Result<Option<(CheckpointRecord, Bytes)>> {
        match &self.best {
            Some(best) => Ok(Some(
                self.writer.read(&best.path, CheckpointSlot::Best).await?,
            )),
            None => Ok(None),
        }
    }

    /// Persist `data` as the checkpoint for `step`.
    ///
    /// A score at least as good as the current best also goes to the best slot,
    /// so the most recent of equally scored saves wins.
    pub async fn save(
        &mut self,
        step: Step,
        validation_score: Option<f64>,
        data: Bytes,
    ) -> Result<SaveOutcome> {
        self.save_with_metadata(step, validation_score, data, HashMap::new())
            .await
    }

    /// Same as [`CheckpointManager::save`] with extra metadata stored in the header
    pub async fn save_with_metadata(
        &mut self,
        step: Step,
        validation_score: Option<f64>,
        data: Bytes,
        metadata: HashMap<String, String>,
    ) -> Result<SaveOutcome> {
        if let Some(latest) = &self.latest {
            if step < latest.step {
                return Err(Error::invalid_argument(format!(
                    "checkpoint step {} is behind the latest checkpoint at step {}",
                    step, latest.step
                )));
            }
        }

        let is_best = match validation_score {
            Some(score) if score.is_nan() => {
                warn!(step, "Validation score is NaN, not considered for best");
                false
            }
            Some(score) => self.config.direction.improves(score, self.best_score()),
            None => false,
        };

        let request = WriteRequest {
            seq: self.next_seq,
            step,
            validation_score,
            data,
            metadata,
        };

        // Best slot first, so a latest record is never ahead of the best slot
        let slots: &[CheckpointSlot] = if is_best {
            &[CheckpointSlot::Best, CheckpointSlot::Latest]
        } else {
            &[CheckpointSlot::Latest]
        };

        let records = self.writer.write(&request, slots).await?;
        self.next_seq += 1;

        let mut latest = None;
        let mut best = None;
        for record in records {
            match record.slot {
                CheckpointSlot::Latest => latest = Some(record),
                CheckpointSlot::Best => best = Some(record),
            }
        }

        let record =
            latest.ok_or_else(|| Error::persistence("checkpoint writer returned no record"))?;
        self.latest = Some(record.clone());

        if let Some(best) = best {
            info!(
                step,
                score = ?best.validation_score,
                previous = ?self.best_score(),
                "New best checkpoint"
            );
            self.best = Some(best);
        }

        self.cleanup_old_checkpoints().await;

        Ok(SaveOutcome { record, is_best })
    }

    /// Latest committed checkpoint
    pub fn latest(&self) -> Option<&CheckpointRecord> {
        self.latest.as_ref()
    }

    /// Best committed checkpoint
    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.best.as_ref()
    }

    /// Best validation score seen by this run
    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().and_then(|b| b.validation_score)
    }

    /// Cleanup old checkpoints beyond the retention limits
    async fn cleanup_old_checkpoints(&self) {
        for (slot, keep) in [
            (CheckpointSlot::Latest, self.config.keep_count),
            (CheckpointSlot::Best, self.config.keep_best),
        ] {
            let paths = match self
                .storage
                .list(&CheckpointWriter::slot_prefix(slot))
                .await
            {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(slot = %slot, error = %e, "Failed to list checkpoints for cleanup");
                    continue;
                }
            };

            let excess = paths.len().saturating_sub(keep);
            for path in paths.iter().take(excess) {
                if let Err(e) = self.storage.delete(path).await {
                    warn!(path = %path, error = %e, "Failed to delete old checkpoint");
                } else {
                    debug!(path = %path, "Deleted old checkpoint");
                }
            }
        }
    }
}
