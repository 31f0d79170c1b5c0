//! Gated graph network over typed edges.
//!
//! One message transform per edge-type code, a GRU-style gate merging the
//! aggregated messages into the node states, a fixed number of propagation
//! rounds, then mean pooling per graph. `classify` pushes the pooled state
//! through a linear head; `embed` returns it as-is.
//!
//! Training support lives alongside the forward pass: `forward_cached`
//! records the per-step activations a later `backward` call needs to push
//! loss gradients through every round of propagation back onto each
//! parameter. Inference (`classify`/`embed`) records nothing.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{s, Array1, Array2, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{GraphClassifier, NUM_CLASSES};
use crate::errors::{Result, VulngraphError};
use crate::graph::batch::GraphBatch;
use crate::graph::EDGE_TYPE_COUNT;
use crate::training::optimizer::Adam;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Learnable parameters. Mutated in place by the optimizer during
/// training and snapshotted to the checkpoint file on improvement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GgnnParams {
    /// Per-edge-type message transforms, `EDGE_TYPE_COUNT` x `[H, H]`.
    pub msg_weight: Vec<Array2<f32>>,
    pub msg_bias: Vec<Array1<f32>>,
    /// Update gate: message path, state path, bias.
    pub update_msg: Array2<f32>,
    pub update_state: Array2<f32>,
    pub update_bias: Array1<f32>,
    /// Reset gate.
    pub reset_msg: Array2<f32>,
    pub reset_state: Array2<f32>,
    pub reset_bias: Array1<f32>,
    /// Candidate state.
    pub cand_msg: Array2<f32>,
    pub cand_state: Array2<f32>,
    pub cand_bias: Array1<f32>,
    /// Classification head `[H, NUM_CLASSES]`.
    pub out_weight: Array2<f32>,
    pub out_bias: Array1<f32>,
}

impl GgnnParams {
    fn shapes_match(&self, hidden_dim: usize) -> bool {
        let square = (hidden_dim, hidden_dim);
        self.msg_weight.len() == EDGE_TYPE_COUNT
            && self.msg_bias.len() == EDGE_TYPE_COUNT
            && self.msg_weight.iter().all(|w| w.dim() == square)
            && self.msg_bias.iter().all(|b| b.len() == hidden_dim)
            && self.update_msg.dim() == square
            && self.update_state.dim() == square
            && self.update_bias.len() == hidden_dim
            && self.reset_msg.dim() == square
            && self.reset_state.dim() == square
            && self.reset_bias.len() == hidden_dim
            && self.cand_msg.dim() == square
            && self.cand_state.dim() == square
            && self.cand_bias.len() == hidden_dim
            && self.out_weight.dim() == (hidden_dim, NUM_CLASSES)
            && self.out_bias.len() == NUM_CLASSES
    }
}

/// Parameter gradients from one backward pass, mirroring [`GgnnParams`].
#[derive(Debug, Clone)]
pub struct GgnnGrads {
    pub msg_weight: Vec<Array2<f32>>,
    pub msg_bias: Vec<Array1<f32>>,
    pub update_msg: Array2<f32>,
    pub update_state: Array2<f32>,
    pub update_bias: Array1<f32>,
    pub reset_msg: Array2<f32>,
    pub reset_state: Array2<f32>,
    pub reset_bias: Array1<f32>,
    pub cand_msg: Array2<f32>,
    pub cand_state: Array2<f32>,
    pub cand_bias: Array1<f32>,
    pub out_weight: Array2<f32>,
    pub out_bias: Array1<f32>,
}

impl GgnnGrads {
    fn zeros(hidden_dim: usize) -> GgnnGrads {
        let square = (hidden_dim, hidden_dim);
        GgnnGrads {
            msg_weight: (0..EDGE_TYPE_COUNT).map(|_| Array2::zeros(square)).collect(),
            msg_bias: (0..EDGE_TYPE_COUNT).map(|_| Array1::zeros(hidden_dim)).collect(),
            update_msg: Array2::zeros(square),
            update_state: Array2::zeros(square),
            update_bias: Array1::zeros(hidden_dim),
            reset_msg: Array2::zeros(square),
            reset_state: Array2::zeros(square),
            reset_bias: Array1::zeros(hidden_dim),
            cand_msg: Array2::zeros(square),
            cand_state: Array2::zeros(square),
            cand_bias: Array1::zeros(hidden_dim),
            out_weight: Array2::zeros((hidden_dim, NUM_CLASSES)),
            out_bias: Array1::zeros(NUM_CLASSES),
        }
    }
}

/// Activations recorded for one propagation round.
struct StepTrace {
    h_prev: Array2<f32>,
    agg: Array2<f32>,
    update: Array2<f32>,
    reset: Array2<f32>,
    cand: Array2<f32>,
}

/// Everything `backward` needs from one forward pass over a batch.
///
/// A trace is only meaningful together with the batch it was produced
/// from; mixing traces across batches is a caller bug.
pub struct ForwardTrace {
    steps: Vec<StepTrace>,
    pooled: Array2<f32>,
    logits: Array2<f32>,
}

impl ForwardTrace {
    pub fn logits(&self) -> &Array2<f32> {
        &self.logits
    }

    pub fn pooled(&self) -> &Array2<f32> {
        &self.pooled
    }
}

/// The gated graph classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatedGraphNet {
    input_dim: usize,
    hidden_dim: usize,
    steps: usize,
    params: GgnnParams,
}

impl GatedGraphNet {
    /// Build a freshly initialized network. Weights are Xavier-uniform,
    /// drawn from a ChaCha stream seeded with `seed`, so construction is
    /// reproducible; biases start at zero.
    pub fn new(input_dim: usize, hidden_dim: usize, steps: usize, seed: u64) -> Result<Self> {
        if input_dim == 0 || hidden_dim == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "input_dim and hidden_dim must be positive".to_string(),
            ));
        }
        if input_dim > hidden_dim {
            return Err(VulngraphError::InvalidConfiguration(format!(
                "input features are zero-padded to the hidden width, so input_dim ({input_dim}) \
                 cannot exceed hidden_dim ({hidden_dim})"
            )));
        }
        if steps == 0 {
            return Err(VulngraphError::InvalidConfiguration(
                "at least one propagation step is required".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut xavier = |rows: usize, cols: usize| {
            let scale = (6.0 / (rows + cols) as f32).sqrt();
            Array2::random_using((rows, cols), Uniform::new(-scale, scale), &mut rng)
        };

        let params = GgnnParams {
            msg_weight: (0..EDGE_TYPE_COUNT)
                .map(|_| xavier(hidden_dim, hidden_dim))
                .collect(),
            msg_bias: (0..EDGE_TYPE_COUNT).map(|_| Array1::zeros(hidden_dim)).collect(),
            update_msg: xavier(hidden_dim, hidden_dim),
            update_state: xavier(hidden_dim, hidden_dim),
            update_bias: Array1::zeros(hidden_dim),
            reset_msg: xavier(hidden_dim, hidden_dim),
            reset_state: xavier(hidden_dim, hidden_dim),
            reset_bias: Array1::zeros(hidden_dim),
            cand_msg: xavier(hidden_dim, hidden_dim),
            cand_state: xavier(hidden_dim, hidden_dim),
            cand_bias: Array1::zeros(hidden_dim),
            out_weight: xavier(hidden_dim, NUM_CLASSES),
            out_bias: Array1::zeros(NUM_CLASSES),
        };

        Ok(GatedGraphNet {
            input_dim,
            hidden_dim,
            steps,
            params,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn propagation_steps(&self) -> usize {
        self.steps
    }

    /// Sum messages flowing into every node, one transform per edge type.
    /// Types with no edges in the batch contribute nothing.
    fn aggregate_messages(&self, batch: &GraphBatch, h: &Array2<f32>) -> Array2<f32> {
        let mut agg = Array2::zeros((h.nrows(), self.hidden_dim));
        for (code, edges) in batch.edges_by_type.iter().enumerate() {
            if edges.is_empty() {
                continue;
            }
            let msgs = h.dot(&self.params.msg_weight[code]);
            let bias = &self.params.msg_bias[code];
            for &(src, tgt) in edges {
                let mut row = agg.row_mut(tgt);
                row += &msgs.row(src);
                row += bias;
            }
        }
        agg
    }

    /// Run all propagation rounds; optionally record per-step activations.
    fn propagate(&self, batch: &GraphBatch, record: bool) -> Result<(Array2<f32>, Vec<StepTrace>)> {
        let n = batch.num_nodes();
        if n > 0 && batch.node_features.ncols() != self.input_dim {
            return Err(VulngraphError::DimensionMismatch(format!(
                "batch features have width {} but the network expects {}",
                batch.node_features.ncols(),
                self.input_dim
            )));
        }

        // Initial state: input features zero-padded to the hidden width.
        let mut h = Array2::zeros((n, self.hidden_dim));
        if n > 0 {
            h.slice_mut(s![.., ..self.input_dim])
                .assign(&batch.node_features);
        }

        let p = &self.params;
        let mut trace = Vec::with_capacity(if record { self.steps } else { 0 });
        for _ in 0..self.steps {
            let agg = self.aggregate_messages(batch, &h);
            let update =
                (agg.dot(&p.update_msg) + h.dot(&p.update_state) + &p.update_bias).mapv(sigmoid);
            let reset =
                (agg.dot(&p.reset_msg) + h.dot(&p.reset_state) + &p.reset_bias).mapv(sigmoid);
            let cand = (agg.dot(&p.cand_msg) + (&reset * &h).dot(&p.cand_state) + &p.cand_bias)
                .mapv(f32::tanh);
            let h_next = update.mapv(|z| 1.0 - z) * &h + &update * &cand;
            if record {
                trace.push(StepTrace {
                    h_prev: h,
                    agg,
                    update,
                    reset,
                    cand,
                });
            }
            h = h_next;
        }
        Ok((h, trace))
    }

    fn head(&self, pooled: &Array2<f32>) -> Array2<f32> {
        pooled.dot(&self.params.out_weight) + &self.params.out_bias
    }

    /// Forward pass that keeps the activations `backward` needs.
    pub fn forward_cached(&self, batch: &GraphBatch) -> Result<ForwardTrace> {
        let (final_states, steps) = self.propagate(batch, true)?;
        let pooled = batch.pool_mean(&final_states);
        let logits = self.head(&pooled);
        Ok(ForwardTrace {
            steps,
            pooled,
            logits,
        })
    }

    /// Push loss gradients at the logits back through pooling and every
    /// propagation round onto all parameters.
    pub fn backward(
        &self,
        batch: &GraphBatch,
        trace: &ForwardTrace,
        grad_logits: &Array2<f32>,
    ) -> Result<GgnnGrads> {
        let p = &self.params;
        let mut grads = GgnnGrads::zeros(self.hidden_dim);

        // Classification head.
        grads.out_weight += &trace.pooled.t().dot(grad_logits);
        grads.out_bias += &grad_logits.sum_axis(Axis(0));
        let grad_pooled = grad_logits.dot(&p.out_weight.t());
        let mut grad_h = batch.unpool_mean(&grad_pooled);

        let num_nodes = batch.num_nodes();
        for step in trace.steps.iter().rev() {
            // h = (1 - z) * h_prev + z * cand
            let grad_cand = &grad_h * &step.update;
            let cand_minus_prev = &step.cand - &step.h_prev;
            let grad_update = &grad_h * &cand_minus_prev;
            let mut grad_h_prev = &grad_h * &step.update.mapv(|z| 1.0 - z);

            // cand = tanh(agg . Wc + (r * h_prev) . Uc + bc)
            let grad_pre_c = grad_cand * &step.cand.mapv(|c| 1.0 - c * c);
            grads.cand_msg += &step.agg.t().dot(&grad_pre_c);
            let reset_state_input = &step.reset * &step.h_prev;
            grads.cand_state += &reset_state_input.t().dot(&grad_pre_c);
            grads.cand_bias += &grad_pre_c.sum_axis(Axis(0));
            let mut grad_agg = grad_pre_c.dot(&p.cand_msg.t());
            let grad_reset_input = grad_pre_c.dot(&p.cand_state.t());
            let grad_reset = &grad_reset_input * &step.h_prev;
            grad_h_prev += &(&grad_reset_input * &step.reset);

            // z = sigmoid(agg . Wz + h_prev . Uz + bz)
            let grad_pre_z = grad_update * &step.update.mapv(|z| z * (1.0 - z));
            grads.update_msg += &step.agg.t().dot(&grad_pre_z);
            grads.update_state += &step.h_prev.t().dot(&grad_pre_z);
            grads.update_bias += &grad_pre_z.sum_axis(Axis(0));
            grad_agg += &grad_pre_z.dot(&p.update_msg.t());
            grad_h_prev += &grad_pre_z.dot(&p.update_state.t());

            // r = sigmoid(agg . Wr + h_prev . Ur + br)
            let grad_pre_r = grad_reset * &step.reset.mapv(|r| r * (1.0 - r));
            grads.reset_msg += &step.agg.t().dot(&grad_pre_r);
            grads.reset_state += &step.h_prev.t().dot(&grad_pre_r);
            grads.reset_bias += &grad_pre_r.sum_axis(Axis(0));
            grad_agg += &grad_pre_r.dot(&p.reset_msg.t());
            grad_h_prev += &grad_pre_r.dot(&p.reset_state.t());

            // agg[tgt] += h_prev[src] . We + be, per edge type.
            for (code, edges) in batch.edges_by_type.iter().enumerate() {
                if edges.is_empty() {
                    continue;
                }
                let mut grad_msgs = Array2::zeros((num_nodes, self.hidden_dim));
                for &(src, tgt) in edges {
                    {
                        let mut row = grad_msgs.row_mut(src);
                        row += &grad_agg.row(tgt);
                    }
                    grads.msg_bias[code] += &grad_agg.row(tgt);
                }
                grads.msg_weight[code] += &step.h_prev.t().dot(&grad_msgs);
                grad_h_prev += &grad_msgs.dot(&p.msg_weight[code].t());
            }

            grad_h = grad_h_prev;
        }

        Ok(grads)
    }

    /// Apply one optimizer step for every parameter.
    pub fn apply_gradients(&mut self, grads: &GgnnGrads, optimizer: &mut Adam) {
        let p = &mut self.params;
        for (code, (w, g)) in p.msg_weight.iter_mut().zip(&grads.msg_weight).enumerate() {
            optimizer.update(&format!("msg_weight_{code}"), w, g);
        }
        for (code, (b, g)) in p.msg_bias.iter_mut().zip(&grads.msg_bias).enumerate() {
            optimizer.update(&format!("msg_bias_{code}"), b, g);
        }
        optimizer.update("update_msg", &mut p.update_msg, &grads.update_msg);
        optimizer.update("update_state", &mut p.update_state, &grads.update_state);
        optimizer.update("update_bias", &mut p.update_bias, &grads.update_bias);
        optimizer.update("reset_msg", &mut p.reset_msg, &grads.reset_msg);
        optimizer.update("reset_state", &mut p.reset_state, &grads.reset_state);
        optimizer.update("reset_bias", &mut p.reset_bias, &grads.reset_bias);
        optimizer.update("cand_msg", &mut p.cand_msg, &grads.cand_msg);
        optimizer.update("cand_state", &mut p.cand_state, &grads.cand_state);
        optimizer.update("cand_bias", &mut p.cand_bias, &grads.cand_bias);
        optimizer.update("out_weight", &mut p.out_weight, &grads.out_weight);
        optimizer.update("out_bias", &mut p.out_bias, &grads.out_bias);
    }

    /// Snapshot parameters and structural dims to a binary checkpoint.
    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a checkpoint into a new network. Fails on unreadable or
    /// structurally inconsistent blobs; there is no fallback.
    pub fn load_checkpoint(path: &Path) -> Result<GatedGraphNet> {
        let file = File::open(path)?;
        let net: GatedGraphNet = bincode::deserialize_from(BufReader::new(file))?;
        if !net.params.shapes_match(net.hidden_dim) {
            return Err(VulngraphError::Checkpoint(format!(
                "checkpoint {} carries parameters inconsistent with its own dimensions",
                path.display()
            )));
        }
        Ok(net)
    }

    /// Replace this network's parameters with a checkpoint's. The
    /// checkpoint must have been written by an identically-configured
    /// network.
    pub fn restore_checkpoint(&mut self, path: &Path) -> Result<()> {
        let loaded = Self::load_checkpoint(path)?;
        if loaded.input_dim != self.input_dim
            || loaded.hidden_dim != self.hidden_dim
            || loaded.steps != self.steps
        {
            return Err(VulngraphError::Checkpoint(format!(
                "checkpoint {} was written by a {}x{}x{} network but this one is {}x{}x{}",
                path.display(),
                loaded.input_dim,
                loaded.hidden_dim,
                loaded.steps,
                self.input_dim,
                self.hidden_dim,
                self.steps,
            )));
        }
        self.params = loaded.params;
        Ok(())
    }
}

impl GraphClassifier for GatedGraphNet {
    fn classify(&self, batch: &GraphBatch) -> Result<Array2<f32>> {
        let (final_states, _) = self.propagate(batch, false)?;
        let pooled = batch.pool_mean(&final_states);
        Ok(self.head(&pooled))
    }

    fn embed(&self, batch: &GraphBatch) -> Result<Array2<f32>> {
        let (final_states, _) = self.propagate(batch, false)?;
        Ok(batch.pool_mean(&final_states))
    }
}
