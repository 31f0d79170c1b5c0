//! Gated graph network training for function-level vulnerability
//! detection over code-property graphs.
//!
//! The crate takes a directory of extracted per-function graph samples,
//! deterministically splits it, trains a gated graph classifier with
//! validation-driven early stopping, and exports the learned graph
//! embeddings for a downstream representation-learning evaluator.
//!
//! ## Module map
//!
//! - [`graph`]: samples, typed edges and mini-batch collation
//! - [`data`]: corpus discovery, deterministic splitting, batch loading
//! - [`model`]: the classifier capability trait and the gated network
//! - [`training`]: the loop, loss, optimizer, metrics and early stopping
//! - [`export`]: representation extraction and the results log
//!
//! ## Running an experiment
//!
//! ```rust,no_run
//! use vulngraph::{run_experiment, RunConfig};
//! # struct NoopEvaluator;
//! # impl vulngraph::RepresentationEvaluator for NoopEvaluator {
//! #     fn evaluate(&self, _: &std::path::Path, _: &std::path::Path)
//! #         -> vulngraph::Result<(vulngraph::RepresentationMetrics, vulngraph::RepresentationMetrics)>
//! #     { unimplemented!() }
//! # }
//!
//! let config = RunConfig::default().with_batch_size(64).with_split_seed(0);
//! let report = run_experiment(&config, &NoopEvaluator)?;
//! println!("test F1: {}", report.test_metrics.f1);
//! # Ok::<(), vulngraph::VulngraphError>(())
//! ```

pub mod config;
pub mod data;
pub mod errors;
pub mod export;
pub mod graph;
pub mod model;
pub mod training;

pub use config::{Dataset, GraphVariation, RunConfig};
pub use errors::{Result, VulngraphError};
pub use export::{
    RepresentationEvaluator, RepresentationExporter, RepresentationMetrics, RepresentationRecord,
};
pub use graph::batch::{collate, GraphBatch};
pub use graph::{EdgeType, GraphSample};
pub use model::{GatedGraphNet, GraphClassifier};
pub use training::{
    evaluate, Adam, CheckpointSelector, ClassificationMetrics, EpochOutcome, FitSummary,
    TrainingLoop,
};

use std::path::PathBuf;

use tracing::info;

use data::{discover_samples, train_val_test, GraphDataLoader, GraphDataset};

/// Everything one finished run produced.
#[derive(Debug)]
pub struct ExperimentReport {
    pub run_id: String,
    pub fit: FitSummary,
    /// Scores of the best checkpoint on each split.
    pub train_metrics: ClassificationMetrics,
    pub val_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
    /// Downstream representation-learning scores on train and test.
    pub representation_train: RepresentationMetrics,
    pub representation_test: RepresentationMetrics,
    pub checkpoint_path: PathBuf,
    /// Representation files in train/val/test order.
    pub representation_paths: [PathBuf; 3],
    pub split_sizes: (usize, usize, usize),
}

/// Run one full experiment: split, train with early stopping, re-score the
/// best checkpoint on every split, export embeddings, hand them to the
/// downstream evaluator and append the results line.
pub fn run_experiment(
    config: &RunConfig,
    evaluator: &dyn RepresentationEvaluator,
) -> Result<ExperimentReport> {
    config.validate()?;
    let run_id = config.run_id();
    info!(%run_id, "starting experiment");

    let files = discover_samples(&config.graph_dir())?;
    let (train_files, val_files, test_files) = train_val_test(&files, config.split_seed);
    if train_files.is_empty() {
        return Err(VulngraphError::EmptySplit { split: "train" });
    }
    if val_files.is_empty() {
        return Err(VulngraphError::EmptySplit { split: "validation" });
    }
    if test_files.is_empty() {
        return Err(VulngraphError::EmptySplit { split: "test" });
    }
    info!(
        train = train_files.len(),
        val = val_files.len(),
        test = test_files.len(),
        "corpus split"
    );

    let train_set = GraphDataset::load(&train_files)?;
    let val_set = GraphDataset::load(&val_files)?;
    let test_set = GraphDataset::load(&test_files)?;

    std::fs::create_dir_all(&config.output_dir)?;
    let checkpoint_path = config.checkpoint_path(&run_id);

    let mut model = GatedGraphNet::new(
        config.input_dim,
        config.hidden_dim,
        config.propagation_steps,
        config.split_seed,
    )?;
    let mut optimizer = Adam::new(config.learning_rate, 1e-3);
    let mut selector = CheckpointSelector::new(checkpoint_path.clone(), config.patience);

    let mut train_loader =
        GraphDataLoader::new(train_set.samples(), config.batch_size, true, config.split_seed)?;
    let mut val_loader = GraphDataLoader::new(val_set.samples(), config.batch_size, false, 0)?;
    let mut test_loader = GraphDataLoader::new(test_set.samples(), config.batch_size, false, 0)?;

    let fit = TrainingLoop::new(config.max_epochs).fit(
        &mut model,
        &mut optimizer,
        &mut selector,
        &mut train_loader,
        &mut val_loader,
    )?;

    // Score all three splits with the best parameters, not the last ones.
    model.restore_checkpoint(&checkpoint_path)?;
    let mut train_eval_loader =
        GraphDataLoader::new(train_set.samples(), config.batch_size, false, 0)?;
    let train_metrics = evaluate(&model, &mut train_eval_loader)?;
    let val_metrics = evaluate(&model, &mut val_loader)?;
    let test_metrics = evaluate(&model, &mut test_loader)?;
    info!(
        train_f1 = train_metrics.f1,
        val_f1 = val_metrics.f1,
        test_f1 = test_metrics.f1,
        "best checkpoint scored"
    );

    let representation_paths = [
        config.representation_path(&run_id, "train"),
        config.representation_path(&run_id, "val"),
        config.representation_path(&run_id, "test"),
    ];
    let exporter = RepresentationExporter::new(
        checkpoint_path.clone(),
        representation_paths[0].clone(),
        representation_paths[1].clone(),
        representation_paths[2].clone(),
    );
    let (representation_train, representation_test) = exporter.run(
        &mut model,
        &mut train_eval_loader,
        &mut val_loader,
        &mut test_loader,
        evaluator,
    )?;

    export::append_results_line(
        &config.results_path(),
        &run_id,
        &train_metrics,
        &val_metrics,
        &test_metrics,
        &representation_train,
        &representation_test,
    )?;
    info!(results = %config.results_path().display(), "results recorded");

    Ok(ExperimentReport {
        run_id,
        fit,
        train_metrics,
        val_metrics,
        test_metrics,
        representation_train,
        representation_test,
        checkpoint_path,
        representation_paths,
        split_sizes: (train_set.len(), val_set.len(), test_set.len()),
    })
}
