//! Post-training representation extraction and results logging.
//!
//! After the loop terminates, the best checkpoint is reloaded and run in
//! embedding mode over every split, in split order, so the downstream
//! representation-learning evaluator can align rows with labels by
//! position. One JSON collection is written per split; the train and test
//! files are then handed to the external evaluator's entry point.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::GraphDataLoader;
use crate::errors::{Result, VulngraphError};
use crate::model::{GatedGraphNet, GraphClassifier};
use crate::training::metrics::ClassificationMetrics;

/// One extracted embedding with its ground-truth label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepresentationRecord {
    pub embedding: Vec<f32>,
    pub label: u8,
}

/// Metric record returned by the downstream evaluator, keyed by metric
/// name. A `BTreeMap` keeps the JSON encoding stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepresentationMetrics {
    pub scores: BTreeMap<String, f64>,
}

/// Entry point of the external representation-learning evaluator: given
/// the train and test representation files it fits its own classifiers on
/// the frozen embeddings and reports how much signal they carry.
pub trait RepresentationEvaluator {
    fn evaluate(
        &self,
        train_path: &Path,
        test_path: &Path,
    ) -> Result<(RepresentationMetrics, RepresentationMetrics)>;
}

/// Re-runs the best checkpoint in embedding mode and serializes one
/// collection per split.
pub struct RepresentationExporter {
    checkpoint_path: PathBuf,
    train_path: PathBuf,
    val_path: PathBuf,
    test_path: PathBuf,
}

impl RepresentationExporter {
    pub fn new(
        checkpoint_path: PathBuf,
        train_path: PathBuf,
        val_path: PathBuf,
        test_path: PathBuf,
    ) -> RepresentationExporter {
        RepresentationExporter {
            checkpoint_path,
            train_path,
            val_path,
            test_path,
        }
    }

    /// Extract embeddings for one split and write them as JSON.
    ///
    /// The loader must not shuffle: row order in the output file is the
    /// contract that lets the downstream evaluator align labels.
    pub fn export_split(
        model: &GatedGraphNet,
        loader: &mut GraphDataLoader<'_>,
        path: &Path,
    ) -> Result<usize> {
        if loader.is_shuffled() {
            return Err(VulngraphError::InvalidInput(
                "representation export requires a non-shuffled loader".to_string(),
            ));
        }
        let mut records = Vec::with_capacity(loader.num_samples());
        for batch in loader.epoch()? {
            let hidden = model.embed(&batch)?;
            for (i, &label) in batch.labels.iter().enumerate() {
                records.push(RepresentationRecord {
                    embedding: hidden.row(i).to_vec(),
                    label,
                });
            }
        }
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), &records)?;
        Ok(records.len())
    }

    /// Reload the best checkpoint into `model`, export all three splits
    /// and run the downstream evaluator on the train and test files.
    pub fn run(
        &self,
        model: &mut GatedGraphNet,
        train_loader: &mut GraphDataLoader<'_>,
        val_loader: &mut GraphDataLoader<'_>,
        test_loader: &mut GraphDataLoader<'_>,
        evaluator: &dyn RepresentationEvaluator,
    ) -> Result<(RepresentationMetrics, RepresentationMetrics)> {
        model.restore_checkpoint(&self.checkpoint_path)?;

        let train_rows = Self::export_split(model, train_loader, &self.train_path)?;
        let val_rows = Self::export_split(model, val_loader, &self.val_path)?;
        let test_rows = Self::export_split(model, test_loader, &self.test_path)?;
        info!(
            train_rows,
            val_rows, test_rows, "intermediate representations exported"
        );

        evaluator.evaluate(&self.train_path, &self.test_path)
    }
}

/// Append one run's results line:
/// `run_id,<train>,<val>,<test>,<rep train>,<rep test>` where every field
/// after the run id is a JSON-encoded metric record.
pub fn append_results_line(
    path: &Path,
    run_id: &str,
    train: &ClassificationMetrics,
    val: &ClassificationMetrics,
    test: &ClassificationMetrics,
    rep_train: &RepresentationMetrics,
    rep_test: &RepresentationMetrics,
) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = [
        run_id.to_string(),
        serde_json::to_string(train)?,
        serde_json::to_string(val)?,
        serde_json::to_string(test)?,
        serde_json::to_string(rep_train)?,
        serde_json::to_string(rep_test)?,
    ]
    .join(",");
    writeln!(file, "{line}")?;
    Ok(())
}
