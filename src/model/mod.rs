//! The graph classifier seam.
//!
//! Everything downstream of the model (evaluation, export, metric
//! computation) depends only on [`GraphClassifier`], so propagation
//! internals stay swappable behind the trait.

pub mod ggnn;

pub use ggnn::GatedGraphNet;

use ndarray::Array2;

use crate::errors::Result;
use crate::graph::batch::GraphBatch;

/// Output classes: not vulnerable (0) and vulnerable (1).
pub const NUM_CLASSES: usize = 2;

/// Capability interface of a trained graph model.
///
/// Both operations run the same propagation and pooling; they differ only
/// in whether the pooled state is pushed through the classification head.
/// Implementations must be deterministic: identical parameters and input
/// produce identical output.
pub trait GraphClassifier {
    /// Per-graph class logits `[num_graphs, NUM_CLASSES]`.
    fn classify(&self, batch: &GraphBatch) -> Result<Array2<f32>>;

    /// Pooled hidden vectors `[num_graphs, hidden_dim]`, taken just before
    /// the classification head.
    fn embed(&self, batch: &GraphBatch) -> Result<Array2<f32>>;
}
