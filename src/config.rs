//! Run configuration.
//!
//! A [`RunConfig`] carries everything one training run needs: dataset and
//! graph-variation selection, hyperparameters, split seed and the
//! directories the run reads from and writes into. It is built once,
//! validated, and threaded through the loop by shared reference; nothing
//! in the crate keeps ambient global state.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VulngraphError};

/// Datasets with extracted code-property graphs available on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dataset {
    /// Function-level vulnerability labels over FFmpeg and QEMU commits.
    DevignFfmpegQemu,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::DevignFfmpegQemu => "devign_ffmpeg_qemu",
        }
    }
}

/// Which edge families the graph-construction stage kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphVariation {
    /// Control-flow structure only.
    Cfg,
    /// Control flow plus data-flow edges.
    CfgDfg,
    /// The full code-property graph: AST, control flow and data flow.
    Cpg,
}

impl GraphVariation {
    pub fn name(&self) -> &'static str {
        match self {
            GraphVariation::Cfg => "cfg",
            GraphVariation::CfgDfg => "cfgdfg",
            GraphVariation::Cpg => "cpg",
        }
    }
}

/// Immutable configuration for one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset: Dataset,
    pub variation: GraphVariation,
    /// Mini-batch size for training and evaluation loaders.
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Width of the per-node feature vectors produced by graph extraction.
    pub input_dim: usize,
    /// Node state width inside the network; must be >= `input_dim`.
    pub hidden_dim: usize,
    /// Rounds of gated message passing per forward pass.
    pub propagation_steps: usize,
    /// Seed driving the train/val/test partition and weight init.
    pub split_seed: u64,
    /// Consecutive non-improving validation epochs tolerated before stopping.
    pub patience: u32,
    /// Hard epoch cap; training stops here even if patience never runs out.
    pub max_epochs: u32,
    /// Directory containing `<dataset>_<variation>/` sample files.
    pub data_dir: PathBuf,
    /// Directory receiving checkpoints, representation files and the results log.
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: Dataset::DevignFfmpegQemu,
            variation: GraphVariation::CfgDfg,
            batch_size: 64,
            learning_rate: 1e-4,
            input_dim: 169,
            hidden_dim: 200,
            propagation_steps: 5,
            split_seed: 0,
            patience: 30,
            max_epochs: 500,
            data_dir: PathBuf::from("data/processed"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl RunConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_split_seed(mut self, split_seed: u64) -> Self {
        self.split_seed = split_seed;
        self
    }

    pub fn with_patience(mut self, patience: u32) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_max_epochs(mut self, max_epochs: u32) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    /// Check the invariants the loop depends on before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(VulngraphError::InvalidConfiguration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.input_dim == 0 || self.hidden_dim == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "input_dim and hidden_dim must be positive".to_string(),
            ));
        }
        if self.input_dim > self.hidden_dim {
            return Err(VulngraphError::InvalidConfiguration(format!(
                "input features are zero-padded to the hidden width, so input_dim ({}) \
                 cannot exceed hidden_dim ({})",
                self.input_dim, self.hidden_dim
            )));
        }
        if self.propagation_steps == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "propagation_steps must be at least 1".to_string(),
            ));
        }
        if self.max_epochs == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "max_epochs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Identifier tying together dataset, variation, hyperparameters and a
    /// minute-resolution timestamp. Checkpoint and representation paths are
    /// derived from it so one run never clobbers another's artifacts.
    pub fn run_id(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}_{}_{}",
            Utc::now().format("%Y%m%d%H%M"),
            self.dataset.name(),
            self.variation.name(),
            self.batch_size,
            self.learning_rate,
            self.input_dim,
            self.hidden_dim,
            self.split_seed,
            self.patience,
        )
    }

    /// Directory holding this dataset/variation's graph-sample files.
    pub fn graph_dir(&self) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}", self.dataset.name(), self.variation.name()))
    }

    pub fn checkpoint_path(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(format!("best_ggnn_{run_id}.bin"))
    }

    pub fn representation_path(&self, run_id: &str, split: &str) -> PathBuf {
        self.output_dir
            .join(format!("ggnn_{run_id}_hidden_{split}.json"))
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("ggnn_results.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RunConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let config = RunConfig::default().with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_input_wider_than_hidden() {
        let mut config = RunConfig::default();
        config.input_dim = 300;
        config.hidden_dim = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn run_id_encodes_hyperparameters() {
        let config = RunConfig::default().with_batch_size(16).with_split_seed(7);
        let id = config.run_id();
        assert!(id.contains("devign_ffmpeg_qemu"));
        assert!(id.contains("cfgdfg"));
        assert!(id.contains("_16_"));
        assert!(id.contains("_7_"));
    }

    #[test]
    fn graph_dir_joins_dataset_and_variation() {
        let config = RunConfig::default();
        assert!(config
            .graph_dir()
            .ends_with("devign_ffmpeg_qemu_cfgdfg"));
    }
}
