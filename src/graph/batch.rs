//! Mini-batch collation.
//!
//! Batching builds the disjoint union of several graphs: node features are
//! stacked, edge lists are offset into the combined index space (grouped
//! per edge-type code), and a per-node membership index remembers which
//! input graph every node came from so node states can be pooled back into
//! per-graph vectors in the original input order. A batch lives for one
//! training or evaluation step.

use ndarray::{s, Array2};

use super::{GraphSample, EDGE_TYPE_COUNT};
use crate::errors::{Result, VulngraphError};

/// Node state matrix alias: `[num_nodes, dim]`.
pub type NodeStates = Array2<f32>;

/// Disjoint union of a list of graphs plus aligned labels.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    /// Stacked node features `[total_nodes, feature_dim]`.
    pub node_features: Array2<f32>,
    /// Edge lists indexed by edge-type code, endpoints offset into the
    /// union. A type with no edges in the batch is an empty list.
    pub edges_by_type: Vec<Vec<(usize, usize)>>,
    /// Which input graph each node of the union belongs to.
    pub graph_of: Vec<usize>,
    /// Node count per input graph, in input order.
    pub graph_sizes: Vec<usize>,
    /// Labels aligned with the input order.
    pub labels: Vec<u8>,
}

impl GraphBatch {
    pub fn num_nodes(&self) -> usize {
        self.graph_of.len()
    }

    pub fn num_graphs(&self) -> usize {
        self.graph_sizes.len()
    }

    /// Mean-pool per-node states back into one vector per input graph.
    ///
    /// Graphs with zero nodes pool to the zero vector.
    pub fn pool_mean(&self, node_states: &NodeStates) -> Array2<f32> {
        let dim = node_states.ncols();
        let mut pooled = Array2::zeros((self.num_graphs(), dim));
        for (node, &graph) in self.graph_of.iter().enumerate() {
            let mut row = pooled.row_mut(graph);
            row += &node_states.row(node);
        }
        for (graph, &size) in self.graph_sizes.iter().enumerate() {
            if size > 0 {
                let inv = 1.0 / size as f32;
                pooled.row_mut(graph).mapv_inplace(|x| x * inv);
            }
        }
        pooled
    }

    /// Adjoint of [`pool_mean`](Self::pool_mean): scatter per-graph
    /// gradients back onto the nodes of each graph.
    pub fn unpool_mean(&self, pooled_grad: &Array2<f32>) -> NodeStates {
        let dim = pooled_grad.ncols();
        let mut node_grad = Array2::zeros((self.num_nodes(), dim));
        for (node, &graph) in self.graph_of.iter().enumerate() {
            let inv = 1.0 / self.graph_sizes[graph] as f32;
            let mut row = node_grad.row_mut(node);
            row.assign(&pooled_grad.row(graph));
            row.mapv_inplace(|x| x * inv);
        }
        node_grad
    }
}

/// Combine graphs and labels into one batch. Pure transform; the inputs
/// are not consumed or reordered.
pub fn collate(samples: &[&GraphSample]) -> Result<GraphBatch> {
    if samples.is_empty() {
        return Err(VulngraphError::InvalidInput(
            "cannot collate an empty batch".to_string(),
        ));
    }

    // Zero-node members carry no feature rows, so the width comes from the
    // first graph that has any.
    let feature_dim = samples
        .iter()
        .find(|s| s.num_nodes() > 0)
        .map(|s| s.feature_dim())
        .unwrap_or(0);

    let total_nodes: usize = samples.iter().map(|s| s.num_nodes()).sum();
    let mut node_features = Array2::zeros((total_nodes, feature_dim));
    let mut edges_by_type: Vec<Vec<(usize, usize)>> = vec![Vec::new(); EDGE_TYPE_COUNT];
    let mut graph_of = Vec::with_capacity(total_nodes);
    let mut graph_sizes = Vec::with_capacity(samples.len());
    let mut labels = Vec::with_capacity(samples.len());

    let mut offset = 0;
    for (graph, sample) in samples.iter().enumerate() {
        let n = sample.num_nodes();
        if n > 0 {
            if sample.feature_dim() != feature_dim {
                return Err(VulngraphError::DimensionMismatch(format!(
                    "graph {graph} has feature width {} but the batch has {feature_dim}",
                    sample.feature_dim()
                )));
            }
            node_features
                .slice_mut(s![offset..offset + n, ..])
                .assign(&sample.node_features);
        }
        for &(src, tgt, ty) in &sample.edges {
            edges_by_type[ty.code() as usize].push((offset + src, offset + tgt));
        }
        graph_of.extend(std::iter::repeat(graph).take(n));
        graph_sizes.push(n);
        labels.push(sample.label);
        offset += n;
    }

    Ok(GraphBatch {
        node_features,
        edges_by_type,
        graph_of,
        graph_sizes,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeType;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn graph(features: Array2<f32>, edges: Vec<(usize, usize, EdgeType)>, label: u8) -> GraphSample {
        GraphSample {
            node_features: features,
            edges,
            label,
        }
    }

    #[test]
    fn node_counts_add_up() {
        let a = graph(Array2::zeros((3, 2)), vec![(0, 1, EdgeType::Controls)], 0);
        let b = graph(Array2::zeros((5, 2)), vec![(4, 0, EdgeType::FlowsTo)], 1);
        let c = graph(Array2::zeros((1, 2)), vec![], 0);
        let batch = collate(&[&a, &b, &c]).unwrap();
        assert_eq!(batch.num_nodes(), 9);
        assert_eq!(batch.num_graphs(), 3);
        assert_eq!(batch.graph_sizes, vec![3, 5, 1]);
        assert_eq!(batch.labels, vec![0, 1, 0]);
    }

    #[test]
    fn edges_are_offset_and_grouped_by_type() {
        let a = graph(Array2::zeros((3, 2)), vec![(0, 2, EdgeType::Controls)], 0);
        let b = graph(
            Array2::zeros((2, 2)),
            vec![(0, 1, EdgeType::Controls), (1, 0, EdgeType::Use)],
            1,
        );
        let batch = collate(&[&a, &b]).unwrap();
        assert_eq!(
            batch.edges_by_type[EdgeType::Controls.code() as usize],
            vec![(0, 2), (3, 4)]
        );
        assert_eq!(
            batch.edges_by_type[EdgeType::Use.code() as usize],
            vec![(4, 3)]
        );
        // Categories absent from the batch stay as empty lists.
        assert!(batch.edges_by_type[EdgeType::Dom.code() as usize].is_empty());
    }

    #[test]
    fn pooling_recovers_per_graph_means_in_input_order() {
        let a = graph(array![[2.0, 0.0], [4.0, 2.0]], vec![], 0);
        let b = graph(array![[10.0, 6.0]], vec![], 1);
        let batch = collate(&[&a, &b]).unwrap();
        let pooled = batch.pool_mean(&batch.node_features);
        assert_eq!(pooled.nrows(), 2);
        assert_relative_eq!(pooled[[0, 0]], 3.0);
        assert_relative_eq!(pooled[[0, 1]], 1.0);
        assert_relative_eq!(pooled[[1, 0]], 10.0);
        assert_relative_eq!(pooled[[1, 1]], 6.0);
    }

    #[test]
    fn single_zero_edge_graph_batches_cleanly() {
        let lonely = graph(Array2::zeros((4, 3)), vec![], 1);
        let batch = collate(&[&lonely]).unwrap();
        assert_eq!(batch.num_nodes(), 4);
        assert!(batch.edges_by_type.iter().all(|e| e.is_empty()));
    }

    #[test]
    fn zero_node_graph_pools_to_zero() {
        let empty = graph(Array2::zeros((0, 2)), vec![], 0);
        let full = graph(array![[1.0, 1.0]], vec![], 1);
        let batch = collate(&[&empty, &full]).unwrap();
        let pooled = batch.pool_mean(&batch.node_features);
        assert_eq!(pooled.nrows(), 2);
        assert_relative_eq!(pooled[[0, 0]], 0.0);
        assert_relative_eq!(pooled[[1, 0]], 1.0);
    }

    #[test]
    fn empty_batch_is_an_error() {
        assert!(collate(&[]).is_err());
    }

    #[test]
    fn mismatched_feature_widths_are_an_error() {
        let a = graph(Array2::zeros((2, 3)), vec![], 0);
        let b = graph(Array2::zeros((2, 4)), vec![], 1);
        assert!(collate(&[&a, &b]).is_err());
    }

    #[test]
    fn unpool_divides_by_graph_size() {
        let a = graph(Array2::zeros((2, 2)), vec![], 0);
        let b = graph(Array2::zeros((1, 2)), vec![], 1);
        let batch = collate(&[&a, &b]).unwrap();
        let pooled_grad = array![[4.0, 4.0], [3.0, 3.0]];
        let node_grad = batch.unpool_mean(&pooled_grad);
        assert_relative_eq!(node_grad[[0, 0]], 2.0);
        assert_relative_eq!(node_grad[[1, 0]], 2.0);
        assert_relative_eq!(node_grad[[2, 0]], 3.0);
    }
}
