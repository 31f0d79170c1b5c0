//! Full experiment over a toy corpus: train with early stopping, export
//! representations, record results.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use ndarray::Array2;
use tempfile::TempDir;

use vulngraph::{
    run_experiment, Dataset, EdgeType, GraphSample, GraphVariation, RepresentationEvaluator,
    RepresentationMetrics, RepresentationRecord, Result, RunConfig,
};

/// Stand-in for the external representation-learning evaluator: checks the
/// hand-off files exist and returns canned scores.
struct StubEvaluator;

impl RepresentationEvaluator for StubEvaluator {
    fn evaluate(
        &self,
        train_path: &Path,
        test_path: &Path,
    ) -> Result<(RepresentationMetrics, RepresentationMetrics)> {
        assert!(train_path.exists(), "train representations missing");
        assert!(test_path.exists(), "test representations missing");
        let canned = |f1: f64| RepresentationMetrics {
            scores: BTreeMap::from([("f1".to_string(), f1), ("acc".to_string(), f1)]),
        };
        Ok((canned(0.9), canned(0.8)))
    }
}

fn toy_sample(index: usize, vulnerable: bool) -> GraphSample {
    let base = if vulnerable { 1.0 } else { -1.0 };
    let jitter = index as f32 * 0.01;
    GraphSample {
        node_features: Array2::from_shape_fn((3, 4), |(i, j)| {
            base + jitter + (i + j) as f32 * 0.05
        }),
        edges: vec![
            (0, 1, EdgeType::Controls),
            (1, 2, EdgeType::FlowsTo),
            (2, 0, EdgeType::Reaches),
        ],
        label: u8::from(vulnerable),
    }
}

fn write_toy_corpus(graph_dir: &Path) {
    std::fs::create_dir_all(graph_dir).unwrap();
    for index in 0..10 {
        let vulnerable = index < 5;
        let sample = toy_sample(index, vulnerable);
        sample
            .save(&graph_dir.join(format!("sample_{index:02}.json")))
            .unwrap();
    }
}

#[test]
fn toy_corpus_experiment_produces_all_artifacts() {
    let workspace = TempDir::new().unwrap();
    let data_dir = workspace.path().join("processed");
    let output_dir = workspace.path().join("outputs");

    let config = RunConfig {
        dataset: Dataset::DevignFfmpegQemu,
        variation: GraphVariation::Cpg,
        batch_size: 2,
        learning_rate: 0.01,
        input_dim: 4,
        hidden_dim: 8,
        propagation_steps: 2,
        split_seed: 0,
        patience: 2,
        max_epochs: 5,
        data_dir: data_dir.clone(),
        output_dir: output_dir.clone(),
    };
    write_toy_corpus(&config.graph_dir());

    let report = run_experiment(&config, &StubEvaluator).unwrap();

    // Terminates within the cap and covers the whole corpus 8/1/1.
    assert!(report.fit.epochs_run >= 1 && report.fit.epochs_run <= 5);
    assert_eq!(report.fit.epoch_losses.len(), report.fit.epochs_run as usize);
    assert_eq!(report.split_sizes, (8, 1, 1));

    // Exactly one checkpoint file.
    let checkpoints: Vec<_> = std::fs::read_dir(&output_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with("best_ggnn_") && name.ends_with(".bin")
        })
        .collect();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].path(), report.checkpoint_path);

    // Three representation files with row counts matching the splits.
    let expected_rows = [8usize, 1, 1];
    for (path, expected) in report.representation_paths.iter().zip(expected_rows) {
        let records: Vec<RepresentationRecord> =
            serde_json::from_reader(File::open(path).unwrap()).unwrap();
        assert_eq!(records.len(), expected, "row count mismatch for {path:?}");
        assert!(records.iter().all(|r| r.embedding.len() == 8));
    }

    // One appended results line: run id plus five JSON metric fields.
    let results = std::fs::read_to_string(config.results_path()).unwrap();
    let lines: Vec<&str> = results.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(&report.run_id));
    assert_eq!(lines[0].matches('{').count(), 5);

    // The downstream scores came back through the report.
    assert_eq!(report.representation_train.scores["f1"], 0.9);
    assert_eq!(report.representation_test.scores["f1"], 0.8);
}

#[test]
fn missing_corpus_directory_is_fatal() {
    let workspace = TempDir::new().unwrap();
    let config = RunConfig {
        batch_size: 2,
        input_dim: 4,
        hidden_dim: 8,
        data_dir: workspace.path().join("nowhere"),
        output_dir: workspace.path().join("outputs"),
        ..RunConfig::default()
    };
    assert!(run_experiment(&config, &StubEvaluator).is_err());
}

#[test]
fn repeated_runs_with_the_same_seed_split_identically() {
    let workspace = TempDir::new().unwrap();
    let data_dir = workspace.path().join("processed");

    let config = RunConfig {
        batch_size: 2,
        learning_rate: 0.01,
        input_dim: 4,
        hidden_dim: 8,
        propagation_steps: 2,
        split_seed: 3,
        patience: 1,
        max_epochs: 2,
        data_dir: data_dir.clone(),
        output_dir: workspace.path().join("out_a"),
        ..RunConfig::default()
    };
    write_toy_corpus(&config.graph_dir());

    let first = run_experiment(&config, &StubEvaluator).unwrap();
    let second_config = RunConfig {
        output_dir: workspace.path().join("out_b"),
        ..config
    };
    let second = run_experiment(&second_config, &StubEvaluator).unwrap();

    assert_eq!(first.split_sizes, second.split_sizes);
    // Same seed, same corpus: the validation split sees the same sample,
    // so the val representation files match row for row.
    let read = |path: &Path| -> Vec<RepresentationRecord> {
        serde_json::from_reader(File::open(path).unwrap()).unwrap()
    };
    let first_val = read(&first.representation_paths[1]);
    let second_val = read(&second.representation_paths[1]);
    assert_eq!(first_val.len(), second_val.len());
    for (a, b) in first_val.iter().zip(&second_val) {
        assert_eq!(a.label, b.label);
        assert_eq!(a.embedding, b.embedding);
    }
}
