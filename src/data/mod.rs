//! Corpus discovery, deterministic splitting and batch loading.
//!
//! The corpus is a directory of per-function graph files. Discovery sorts
//! by file name so that the partition depends only on the seed, never on
//! filesystem enumeration order. The split policy is fixed at 80/10/10;
//! only the seed varies between runs.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::errors::{Result, VulngraphError};
use crate::graph::batch::{collate, GraphBatch};
use crate::graph::GraphSample;

/// List every sample file in a corpus directory, sorted by name.
pub fn discover_samples(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Deterministically partition `items` into train/val/test at 80/10/10.
///
/// The three parts are pairwise disjoint and cover the input exactly once;
/// the same seed always reproduces the same partition, element for element.
pub fn train_val_test<T: Clone>(items: &[T], seed: u64) -> (Vec<T>, Vec<T>, Vec<T>) {
    let mut shuffled: Vec<T> = items.to_vec();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let n = shuffled.len();
    let train_end = n * 8 / 10;
    let val_end = n * 9 / 10;
    let test = shuffled.split_off(val_end);
    let val = shuffled.split_off(train_end);
    (shuffled, val, test)
}

/// All samples of one split, loaded into memory. Immutable after load.
#[derive(Debug)]
pub struct GraphDataset {
    samples: Vec<GraphSample>,
}

impl GraphDataset {
    pub fn load(paths: &[PathBuf]) -> Result<GraphDataset> {
        let samples = paths
            .iter()
            .map(|p| GraphSample::load(p))
            .collect::<Result<Vec<_>>>()?;
        let dataset = GraphDataset { samples };
        let (neg, pos) = dataset.label_counts();
        debug!(samples = dataset.len(), negative = neg, positive = pos, "split loaded");
        Ok(dataset)
    }

    pub fn from_samples(samples: Vec<GraphSample>) -> GraphDataset {
        GraphDataset { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[GraphSample] {
        &self.samples
    }

    /// `(negative, positive)` label tally.
    pub fn label_counts(&self) -> (usize, usize) {
        let positive = self.samples.iter().filter(|s| s.label == 1).count();
        (self.samples.len() - positive, positive)
    }
}

/// Draws collated mini-batches from one split.
///
/// With `shuffle` on, the sample order is re-drawn from the internal seeded
/// RNG at the start of every epoch; with it off, batches always follow the
/// split order, which exporters rely on for row alignment.
pub struct GraphDataLoader<'a> {
    samples: &'a [GraphSample],
    batch_size: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl<'a> GraphDataLoader<'a> {
    pub fn new(
        samples: &'a [GraphSample],
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Result<GraphDataLoader<'a>> {
        if batch_size == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "loader batch_size must be at least 1".to_string(),
            ));
        }
        Ok(GraphDataLoader {
            samples,
            batch_size,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        self.shuffle
    }

    /// Collate one full pass over the split.
    pub fn epoch(&mut self) -> Result<Vec<GraphBatch>> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        order
            .chunks(self.batch_size)
            .map(|chunk| {
                let members: Vec<&GraphSample> =
                    chunk.iter().map(|&i| &self.samples[i]).collect();
                collate(&members)
            })
            .collect()
    }
}
