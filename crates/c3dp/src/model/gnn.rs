//! Message-passing graph encoder.
//!
//! Two convolution flavours share one layer type:
//!
//! ```text
//! Gcn:  h' = W · (Σ_{j→i} h_j / sqrt(d_i d_j) + h_i / d_i)      d = in-degree + 1
//! Sage: h' = W_neigh · mean_{j→i} h_j + W_root · h_i
//! ```
//!
//! Aggregation gathers source rows with `select` and scatters them onto
//! targets with `select_assign`, which sums duplicate indices.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::bridge::GraphBatch;

/// Graph convolution architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphModel {
    /// Symmetric-normalized graph convolution with self loops.
    Gcn,
    /// GraphSAGE with mean neighbour aggregation.
    Sage,
}

impl GraphModel {
    /// Lower-case name, used for run names and checkpoint file stems.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gcn => "gcn",
            Self::Sage => "sage",
        }
    }
}

impl std::fmt::Display for GraphModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for GraphModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gcn" => Ok(Self::Gcn),
            "sage" | "graphsage" => Ok(Self::Sage),
            other => Err(format!("unknown graph model '{other}' (expected gcn or sage)")),
        }
    }
}

/// One graph convolution layer. A `root` projection selects the SAGE update;
/// without it the layer is a GCN.
#[derive(Module, Debug)]
pub struct GraphConv<B: Backend> {
    linear: Linear<B>,
    root: Option<Linear<B>>,
}

impl<B: Backend> GraphConv<B> {
    pub fn new(model: GraphModel, d_in: usize, d_out: usize, device: &B::Device) -> Self {
        let root = match model {
            GraphModel::Gcn => None,
            GraphModel::Sage => Some(LinearConfig::new(d_in, d_out).with_bias(false).init(device)),
        };
        Self {
            linear: LinearConfig::new(d_in, d_out).init(device),
            root,
        }
    }

    /// Input shape `(num_nodes, d_in)`, output shape `(num_nodes, d_out)`.
    pub fn forward(&self, h: Tensor<B, 2>, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        match &self.root {
            None => {
                let self_term = h.clone() * batch.gcn_self_weight.clone();
                let agg = propagate(h, batch, batch.gcn_edge_weight.clone()) + self_term;
                self.linear.forward(agg)
            }
            Some(root) => {
                let agg = propagate(h.clone(), batch, batch.mean_edge_weight.clone());
                self.linear.forward(agg) + root.forward(h)
            }
        }
    }
}

/// Weighted sum of source rows onto each edge's target row.
fn propagate<B: Backend>(h: Tensor<B, 2>, batch: &GraphBatch<B>, weight: Tensor<B, 1>) -> Tensor<B, 2> {
    let [n, f] = h.dims();
    let device = h.device();
    let zeros = Tensor::<B, 2>::zeros([n, f], &device);
    if batch.num_edges == 0 {
        return zeros;
    }
    let messages = h.select(0, batch.edge_src.clone()) * weight.unsqueeze_dim::<2>(1); // (E, f)
    zeros.select_assign(0, batch.edge_dst.clone(), messages)
}

/// Stack of graph convolutions with ReLU + dropout between layers.
#[derive(Module, Debug)]
pub struct GnnEncoder<B: Backend> {
    layers: Vec<GraphConv<B>>,
    dropout: Dropout,
}

impl<B: Backend> GnnEncoder<B> {
    /// Build `num_layers` convolutions (at least one): `in_channels → hidden`,
    /// then `hidden → hidden`.
    pub fn new(
        model: GraphModel,
        in_channels: usize,
        hidden_channels: usize,
        num_layers: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers.max(1))
            .map(|i| {
                let d_in = if i == 0 { in_channels } else { hidden_channels };
                GraphConv::new(model, d_in, hidden_channels, device)
            })
            .collect();
        Self {
            layers,
            dropout: DropoutConfig::new(dropout).init(),
        }
    }

    /// Node embeddings of shape `(num_nodes, hidden_channels)`.
    pub fn forward(&self, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut h = batch.node_features.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(h, batch);
            if i < last {
                h = burn::tensor::activation::relu(h);
                h = self.dropout.forward(h);
            }
        }
        h
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}
