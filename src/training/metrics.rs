//! Aggregate classification metrics.
//!
//! Scores are always computed over a whole split: predictions and labels
//! are concatenated across batches first, then counted once. Averaging
//! per-batch scores would weight small trailing batches the same as full
//! ones and skew every ratio.

use serde::{Deserialize, Serialize};

use crate::data::GraphDataLoader;
use crate::errors::Result;
use crate::model::GraphClassifier;

/// Binary classification scores for one split. Positive class is
/// "vulnerable" (label 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationMetrics {
    /// Score predictions against labels. Both slices must already cover
    /// the whole split. Undefined ratios (no positive predictions, no
    /// positive labels) fall back to 0.0.
    pub fn from_predictions(predictions: &[u8], labels: &[u8]) -> ClassificationMetrics {
        let mut tp = 0u64;
        let mut fp = 0u64;
        let mut tn = 0u64;
        let mut fn_ = 0u64;
        for (&pred, &label) in predictions.iter().zip(labels) {
            match (pred, label) {
                (1, 1) => tp += 1,
                (1, 0) => fp += 1,
                (0, 0) => tn += 1,
                _ => fn_ += 1,
            }
        }

        let total = (tp + fp + tn + fn_) as f64;
        let accuracy = if total > 0.0 {
            (tp + tn) as f64 / total
        } else {
            0.0
        };
        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fn_ > 0 {
            tp as f64 / (tp + fn_) as f64
        } else {
            0.0
        };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ClassificationMetrics {
            accuracy,
            precision,
            recall,
            f1,
        }
    }
}

/// Run the model over a full split in inference mode and score it.
///
/// The model is taken by shared reference; nothing here can touch its
/// parameters.
pub fn evaluate<M: GraphClassifier>(
    model: &M,
    loader: &mut GraphDataLoader<'_>,
) -> Result<ClassificationMetrics> {
    let mut predictions = Vec::with_capacity(loader.num_samples());
    let mut labels = Vec::with_capacity(loader.num_samples());
    for batch in loader.epoch()? {
        let logits = model.classify(&batch)?;
        for (i, &label) in batch.labels.iter().enumerate() {
            let row = logits.row(i);
            predictions.push(u8::from(row[1] > row[0]));
            labels.push(label);
        }
    }
    Ok(ClassificationMetrics::from_predictions(&predictions, &labels))
}
