//! Tensor bridge: converts collated CPU batches (`GraphBatchData`) into burn
//! tensors, and pulls tensors back into plain vectors.
//!
//! Degree normalization for message passing is computed here on the CPU side,
//! since it depends only on connectivity and never needs gradients.

use burn::prelude::*;
use burn::tensor::TensorData;
use graph_data::GraphBatchData;

/// A batch of graphs and their paired sequences, as tensors.
#[derive(Debug, Clone)]
pub struct GraphBatch<B: Backend> {
    /// Node features, shape `(num_nodes, feature_dim)`.
    pub node_features: Tensor<B, 2>,
    /// Edge sources, shape `(num_edges,)`.
    pub edge_src: Tensor<B, 1, Int>,
    /// Edge targets, shape `(num_edges,)`.
    pub edge_dst: Tensor<B, 1, Int>,
    /// Symmetric GCN normalization `1/sqrt(d_src * d_dst)` per edge, with
    /// degrees counting the implicit self loop.
    pub gcn_edge_weight: Tensor<B, 1>,
    /// Self-loop weight `1/d` per node, shape `(num_nodes, 1)`.
    pub gcn_self_weight: Tensor<B, 2>,
    /// Mean-aggregation weight `1/in_degree(dst)` per edge.
    pub mean_edge_weight: Tensor<B, 1>,
    /// One-hot node-to-graph assignment, shape `(num_graphs, num_nodes)`.
    pub node_assignment: Tensor<B, 2>,
    /// Per-position sequence embeddings, shape `(sequence_len, sequence_dim)`.
    pub sequence: Tensor<B, 2>,
    /// One-hot position-to-graph assignment, shape `(num_graphs, sequence_len)`.
    pub sequence_assignment: Tensor<B, 2>,
    /// Number of graphs in the batch.
    pub num_graphs: usize,
    /// Number of edges in the batch.
    pub num_edges: usize,
}

/// Convert a collated batch into tensors on `device`.
///
/// # Panics
/// Panics if the batch is empty.
pub fn batch_to_tensors<B: Backend>(data: &GraphBatchData, device: &B::Device) -> GraphBatch<B> {
    assert!(!data.is_empty(), "cannot convert an empty batch");

    let n = data.num_nodes;
    let e = data.edge_src.len();

    let mut in_degree = vec![0f32; n];
    for &dst in &data.edge_dst {
        in_degree[dst as usize] += 1.0;
    }

    let gcn_edge_weight: Vec<f32> = data
        .edge_src
        .iter()
        .zip(&data.edge_dst)
        .map(|(&s, &d)| {
            let ds = in_degree[s as usize] + 1.0;
            let dd = in_degree[d as usize] + 1.0;
            1.0 / (ds * dd).sqrt()
        })
        .collect();
    let gcn_self_weight: Vec<f32> = in_degree.iter().map(|d| 1.0 / (d + 1.0)).collect();
    let mean_edge_weight: Vec<f32> = data
        .edge_dst
        .iter()
        .map(|&d| 1.0 / in_degree[d as usize].max(1.0))
        .collect();

    let to_index = |v: &[u32]| -> Vec<i64> { v.iter().map(|&x| x as i64).collect() };

    GraphBatch {
        node_features: Tensor::from_data(
            TensorData::new(data.node_features.clone(), [n, data.feature_dim]),
            device,
        ),
        edge_src: Tensor::from_data(TensorData::new(to_index(&data.edge_src), [e]), device),
        edge_dst: Tensor::from_data(TensorData::new(to_index(&data.edge_dst), [e]), device),
        gcn_edge_weight: Tensor::from_data(TensorData::new(gcn_edge_weight, [e]), device),
        gcn_self_weight: Tensor::from_data(TensorData::new(gcn_self_weight, [n, 1]), device),
        mean_edge_weight: Tensor::from_data(TensorData::new(mean_edge_weight, [e]), device),
        node_assignment: Tensor::from_data(
            TensorData::new(one_hot(&data.batch, data.num_graphs), [data.num_graphs, n]),
            device,
        ),
        sequence: Tensor::from_data(
            TensorData::new(data.sequence.clone(), [data.sequence_len, data.sequence_dim]),
            device,
        ),
        sequence_assignment: Tensor::from_data(
            TensorData::new(
                one_hot(&data.sequence_batch, data.num_graphs),
                [data.num_graphs, data.sequence_len],
            ),
            device,
        ),
        num_graphs: data.num_graphs,
        num_edges: e,
    }
}

/// Row-major `(groups, members)` matrix with a 1 where member `j` belongs to group `i`.
fn one_hot(assignment: &[usize], groups: usize) -> Vec<f32> {
    let members = assignment.len();
    let mut matrix = vec![0f32; groups * members];
    for (j, &g) in assignment.iter().enumerate() {
        matrix[g * members + j] = 1.0;
    }
    matrix
}

/// Pull a 2D tensor into a row-major `Vec<f32>` plus its shape.
pub fn tensor_to_matrix<B: Backend>(tensor: Tensor<B, 2>) -> anyhow::Result<(Vec<f32>, [usize; 2])> {
    let dims = tensor.dims();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read tensor data: {e:?}"))?;
    Ok((values, dims))
}

/// Extract a single f64 scalar from a burn 1D tensor.
pub fn tensor_to_f64<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}
