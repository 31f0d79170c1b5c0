//! Validation-driven checkpoint selection and early stopping.
//!
//! The selector owns the run's single checkpoint path. Parameters are
//! persisted only when the validation F1 strictly improves; an equal score
//! is a miss, not an improvement, so ties never rewrite the checkpoint.
//! After more consecutive misses than the configured patience, the
//! selector signals the loop to stop.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::Result;
use crate::model::GatedGraphNet;
use crate::training::metrics::ClassificationMetrics;

/// What one validation round did to the training state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochOutcome {
    /// Validation F1 strictly improved; parameters were persisted.
    ImprovedCheckpoint,
    /// No improvement; the patience counter advanced.
    NoImprovement,
}

pub struct CheckpointSelector {
    checkpoint_path: PathBuf,
    patience_limit: u32,
    best_f1: f64,
    misses: u32,
    checkpoints_written: u32,
}

impl CheckpointSelector {
    pub fn new(checkpoint_path: PathBuf, patience_limit: u32) -> CheckpointSelector {
        CheckpointSelector {
            checkpoint_path,
            patience_limit,
            // Worst possible starting point: even an F1 of exactly 0.0 on
            // the first epoch counts as an improvement and gets persisted.
            best_f1: f64::NEG_INFINITY,
            misses: 0,
            checkpoints_written: 0,
        }
    }

    /// Feed one epoch's validation metrics; persists the model on strict
    /// improvement of F1 and advances the patience counter otherwise.
    pub fn observe(
        &mut self,
        metrics: &ClassificationMetrics,
        model: &GatedGraphNet,
    ) -> Result<EpochOutcome> {
        if metrics.f1 > self.best_f1 {
            model.save_checkpoint(&self.checkpoint_path)?;
            self.best_f1 = metrics.f1;
            self.misses = 0;
            self.checkpoints_written += 1;
            debug!(f1 = metrics.f1, path = %self.checkpoint_path.display(), "best model saved");
            Ok(EpochOutcome::ImprovedCheckpoint)
        } else {
            self.misses += 1;
            debug!(f1 = metrics.f1, misses = self.misses, "no improvement");
            Ok(EpochOutcome::NoImprovement)
        }
    }

    /// True once more consecutive misses than the limit have accumulated.
    pub fn should_stop(&self) -> bool {
        self.misses > self.patience_limit
    }

    pub fn best_f1(&self) -> f64 {
        self.best_f1
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    pub fn checkpoints_written(&self) -> u32 {
        self.checkpoints_written
    }
}
