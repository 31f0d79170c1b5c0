//! Crate-wide error type.
//!
//! Every fallible operation in this crate surfaces a [`VulngraphError`].
//! There are no retries anywhere: transient failures (disk I/O, corrupt
//! files) abort the run immediately, since silently retried steps would
//! make training runs unreproducible.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VulngraphError>;

/// Errors produced while loading data, training, or exporting.
#[derive(Debug, Error)]
pub enum VulngraphError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A split ended up with zero samples. Training on an empty loader
    /// would divide by zero when averaging the epoch loss, so this is
    /// checked before the loop starts.
    #[error("{split} split is empty; every split must contain at least one sample")]
    EmptySplit { split: &'static str },

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("representation-learning evaluation failed: {0}")]
    Evaluation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
