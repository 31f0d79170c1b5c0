//! The training loop.
//!
//! One epoch is a full reshuffled pass over the training split; each batch
//! goes through forward, cross-entropy, backward and exactly one optimizer
//! step before the next batch is drawn. After every epoch the model is
//! scored on the validation split and the result handed to the
//! [`CheckpointSelector`], which decides between persisting and counting a
//! miss. The run walks
//! `Training(e) -> ValidatingEpoch -> {ImprovedCheckpoint | NoImprovement}`
//! and leaves to `Stopped` when patience runs out or the epoch cap is hit,
//! whichever comes first.
//!
//! A batch that produces a NaN loss is not caught anywhere: it poisons the
//! parameters and the run is expected to die with them. Reproducibility
//! beats resilience for a research loop.

pub mod checkpoint;
pub mod loss;
pub mod metrics;
pub mod optimizer;

pub use checkpoint::{CheckpointSelector, EpochOutcome};
pub use metrics::{evaluate, ClassificationMetrics};
pub use optimizer::Adam;

use tracing::{debug, info};

use crate::data::GraphDataLoader;
use crate::errors::{Result, VulngraphError};
use crate::model::GatedGraphNet;
use loss::cross_entropy_with_grad;

/// Summary of a finished training run.
#[derive(Debug, Clone)]
pub struct FitSummary {
    /// Epochs actually run (1-based count).
    pub epochs_run: u32,
    /// Mean training loss per epoch, in order.
    pub epoch_losses: Vec<f32>,
    /// Best validation F1 seen across the run.
    pub best_val_f1: f64,
    /// True when patience stopped the run before the epoch cap.
    pub stopped_early: bool,
}

/// Drives epochs over the training split with validation-gated
/// checkpointing.
pub struct TrainingLoop {
    max_epochs: u32,
}

impl TrainingLoop {
    pub fn new(max_epochs: u32) -> TrainingLoop {
        TrainingLoop { max_epochs }
    }

    /// Train until patience is exhausted or the epoch cap is reached.
    ///
    /// Both loaders must be non-empty: an empty training split would leave
    /// the mean epoch loss dividing by zero and an empty validation split
    /// would make every F1 trivially 0, so both are rejected up front.
    pub fn fit(
        &self,
        model: &mut GatedGraphNet,
        optimizer: &mut Adam,
        selector: &mut CheckpointSelector,
        train_loader: &mut GraphDataLoader<'_>,
        val_loader: &mut GraphDataLoader<'_>,
    ) -> Result<FitSummary> {
        if train_loader.is_empty() {
            return Err(VulngraphError::EmptySplit { split: "train" });
        }
        if val_loader.is_empty() {
            return Err(VulngraphError::EmptySplit { split: "validation" });
        }

        let mut epoch_losses = Vec::new();
        let mut epochs_run = 0;
        let mut stopped_early = false;

        for epoch in 0..self.max_epochs {
            let mut epoch_loss = 0.0f32;
            let mut steps = 0usize;
            for batch in train_loader.epoch()? {
                let trace = model.forward_cached(&batch)?;
                let (loss, grad_logits) = cross_entropy_with_grad(trace.logits(), &batch.labels);
                let grads = model.backward(&batch, &trace, &grad_logits)?;
                model.apply_gradients(&grads, optimizer);
                epoch_loss += loss;
                steps += 1;
            }
            let mean_loss = epoch_loss / steps as f32;
            epoch_losses.push(mean_loss);
            epochs_run = epoch + 1;

            let scores = evaluate(&*model, val_loader)?;
            debug!(
                epoch,
                loss = mean_loss,
                val_f1 = scores.f1,
                val_accuracy = scores.accuracy,
                "epoch finished"
            );

            selector.observe(&scores, model)?;
            if selector.should_stop() {
                info!(epoch, best_f1 = selector.best_f1(), "patience exhausted, training complete");
                stopped_early = true;
                break;
            }
        }

        Ok(FitSummary {
            epochs_run,
            epoch_losses,
            best_val_f1: selector.best_f1(),
            stopped_early,
        })
    }
}
