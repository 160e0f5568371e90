//! The contrastive structure/sequence network.
//!
//! Architecture:
//! ```text
//! nodes ─► GnnEncoder ─► pool(graph) ─► dropout ─► Linear ─► L2 norm ─┐
//!                                                                     ├─► g · sᵀ · exp(log_scale) (+ bias)
//! sequence ─► Linear ─► ReLU ─► pool(graph) ─► dropout ─► Linear ─► L2 norm ─┘
//! ```
//!
//! Row `i` of the logits matrix scores graph `i` against every sequence in the
//! batch; the diagonal holds the true pairs.

use burn::module::{Ignored, Param};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use crate::model::bridge::GraphBatch;
use crate::model::gnn::{GnnEncoder, GraphModel};
use crate::model::pooling::{pool, Pooling};
use crate::training::loss::{sigmoid_contrastive_loss, symmetric_info_nce_loss};

/// Constructor parameters of [`C3dpNet`]. Saved next to every checkpoint so a
/// model can be rebuilt before its weights are loaded.
#[derive(Config, Debug)]
pub struct C3dpConfig {
    /// Node feature width.
    pub in_channels: usize,
    /// Per-position sequence embedding width.
    pub sequence_dim: usize,
    #[config(default = "GraphModel::Gcn")]
    pub graph_model: GraphModel,
    #[config(default = 128)]
    pub hidden_channels: usize,
    #[config(default = 3)]
    pub num_layers: usize,
    /// Width of the shared embedding space.
    #[config(default = 128)]
    pub out_features_projection: usize,
    #[config(default = "Pooling::Mean")]
    pub graph_embeddings_pool: Pooling,
    #[config(default = "Pooling::Mean")]
    pub sequence_embeddings_pool: Pooling,
    /// Pairwise sigmoid loss instead of softmax InfoNCE.
    #[config(default = false)]
    pub use_sigmoid: bool,
    #[config(default = 0.1)]
    pub dropout: f64,
    /// Initial softmax temperature; the learnable logit scale starts at `1/t`.
    #[config(default = 0.07)]
    pub init_temperature: f64,
}

impl C3dpConfig {
    /// Initialize a model with random weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> C3dpNet<B> {
        let hidden = self.hidden_channels;
        let out = self.out_features_projection;
        let temperature = self.init_temperature.max(1e-4);
        let log_scale = (1.0 / temperature).ln() as f32;
        let bias = if self.use_sigmoid { -10.0f32 } else { 0.0 };

        C3dpNet {
            gnn: GnnEncoder::new(
                self.graph_model,
                self.in_channels,
                hidden,
                self.num_layers,
                self.dropout,
                device,
            ),
            graph_projection: LinearConfig::new(hidden, out).init(device),
            sequence_hidden: LinearConfig::new(self.sequence_dim, hidden).init(device),
            sequence_projection: LinearConfig::new(hidden, out).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            log_scale: Param::from_tensor(Tensor::from_floats([log_scale], device)),
            bias: Param::from_tensor(Tensor::from_floats([bias], device)),
            graph_pool: Ignored(self.graph_embeddings_pool),
            sequence_pool: Ignored(self.sequence_embeddings_pool),
            use_sigmoid: Ignored(self.use_sigmoid),
        }
    }
}

/// Loss and logits of one forward pass.
#[derive(Debug, Clone)]
pub struct C3dpOutput<B: Backend> {
    /// Scalar loss, shape `(1,)`.
    pub loss: Tensor<B, 1>,
    /// Graph-vs-sequence similarity, shape `(num_graphs, num_graphs)`.
    pub logits: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct C3dpNet<B: Backend> {
    gnn: GnnEncoder<B>,
    graph_projection: Linear<B>,
    sequence_hidden: Linear<B>,
    sequence_projection: Linear<B>,
    dropout: Dropout,
    log_scale: Param<Tensor<B, 1>>,
    bias: Param<Tensor<B, 1>>,
    graph_pool: Ignored<Pooling>,
    sequence_pool: Ignored<Pooling>,
    use_sigmoid: Ignored<bool>,
}

impl<B: Backend> C3dpNet<B> {
    /// L2-normalized graph and sequence embeddings, each `(num_graphs, out_features)`.
    pub fn embed(&self, batch: &GraphBatch<B>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let nodes = self.gnn.forward(batch);
        let graph = pool(*self.graph_pool, nodes, batch.node_assignment.clone());
        let graph = self.graph_projection.forward(self.dropout.forward(graph));

        let positions = relu(self.sequence_hidden.forward(batch.sequence.clone()));
        let sequence = pool(*self.sequence_pool, positions, batch.sequence_assignment.clone());
        let sequence = self.sequence_projection.forward(self.dropout.forward(sequence));

        (l2_normalize(graph), l2_normalize(sequence))
    }

    /// Scaled similarity between every graph and every sequence of the batch.
    pub fn logits(&self, graph: Tensor<B, 2>, sequence: Tensor<B, 2>) -> Tensor<B, 2> {
        let scale = self.log_scale.val().exp().unsqueeze::<2>();
        let logits = graph.matmul(sequence.transpose()) * scale;
        if *self.use_sigmoid {
            logits + self.bias.val().unsqueeze::<2>()
        } else {
            logits
        }
    }

    pub fn forward(&self, batch: &GraphBatch<B>) -> C3dpOutput<B> {
        let (graph, sequence) = self.embed(batch);
        let logits = self.logits(graph, sequence);
        let loss = if *self.use_sigmoid {
            sigmoid_contrastive_loss(logits.clone())
        } else {
            symmetric_info_nce_loss(logits.clone())
        };
        C3dpOutput { loss, logits }
    }

    /// Current softmax temperature, `exp(-log_scale)`.
    pub fn temperature(&self) -> f64 {
        let log_scale: f64 = self.log_scale.val().into_scalar().elem();
        (-log_scale).exp()
    }
}

fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = (x.clone() * x.clone()).sum_dim(1).clamp_min(1e-12).sqrt();
    x / norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::batch_to_tensors;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use graph_data::{collate, GraphSample};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn sample(i: usize) -> GraphSample {
        let nodes = 3 + i % 2;
        GraphSample {
            name: format!("p{i}"),
            num_nodes: nodes,
            feature_dim: 5,
            node_features: (0..nodes * 5).map(|v| ((v + i) as f32 * 0.3).cos()).collect(),
            edge_src: (0..nodes as u32 - 1).collect(),
            edge_dst: (1..nodes as u32).collect(),
            sequence_len: 2 + i,
            sequence_dim: 4,
            sequence: (0..(2 + i) * 4).map(|v| ((v * (i + 1)) as f32 * 0.1).sin()).collect(),
        }
    }

    fn small_config() -> C3dpConfig {
        C3dpConfig::new(5, 4)
            .with_hidden_channels(8)
            .with_num_layers(2)
            .with_out_features_projection(6)
            .with_dropout(0.0)
    }

    #[test]
    fn test_forward_shapes() {
        let device = Default::default();
        let samples: Vec<GraphSample> = (0..4).map(sample).collect();
        let refs: Vec<&GraphSample> = samples.iter().collect();
        let batch = batch_to_tensors::<TestBackend>(&collate(&refs), &device);

        let model = small_config().init::<TestBackend>(&device);
        let out = model.forward(&batch);
        assert_eq!(out.logits.dims(), [4, 4]);
        assert_eq!(out.loss.dims(), [1]);
        let loss: f32 = out.loss.into_scalar().elem();
        assert!(loss.is_finite() && loss > 0.0, "loss = {loss}");
    }

    #[test]
    fn test_embeddings_are_unit_norm() {
        let device = Default::default();
        let samples: Vec<GraphSample> = (0..3).map(sample).collect();
        let refs: Vec<&GraphSample> = samples.iter().collect();
        let batch = batch_to_tensors::<TestBackend>(&collate(&refs), &device);

        let model = small_config()
            .with_graph_embeddings_pool(Pooling::Max)
            .with_sequence_embeddings_pool(Pooling::Sum)
            .init::<TestBackend>(&device);
        let (g, s) = model.embed(&batch);
        for t in [g, s] {
            let norms: Vec<f32> = (t.clone() * t).sum_dim(1).sqrt().into_data().to_vec().unwrap();
            for n in norms {
                assert!((n - 1.0).abs() < 1e-4, "norm = {n}");
            }
        }
    }

    #[test]
    fn test_initial_temperature() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        assert!((model.temperature() - 0.07).abs() < 1e-5);
    }

    #[test]
    fn test_sigmoid_variant_forward() {
        let device = Default::default();
        let samples: Vec<GraphSample> = (0..2).map(sample).collect();
        let refs: Vec<&GraphSample> = samples.iter().collect();
        let batch = batch_to_tensors::<TestBackend>(&collate(&refs), &device);

        let model = small_config()
            .with_use_sigmoid(true)
            .with_graph_model(GraphModel::Sage)
            .init::<TestBackend>(&device);
        let loss: f32 = model.forward(&batch).loss.into_scalar().elem();
        assert!(loss.is_finite());
    }

    #[test]
    fn test_gradients_reach_encoder() {
        let device = Default::default();
        let samples: Vec<GraphSample> = (0..3).map(sample).collect();
        let refs: Vec<&GraphSample> = samples.iter().collect();
        let batch = batch_to_tensors::<TestAutodiffBackend>(&collate(&refs), &device);

        let model = small_config().init::<TestAutodiffBackend>(&device);
        let grads = model.forward(&batch).loss.backward();
        let log_scale_grad = model.log_scale.grad(&grads);
        assert!(log_scale_grad.is_some(), "temperature should receive a gradient");
    }

    #[test]
    fn test_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gcn-parameters.ckpt");
        let config = small_config().with_graph_model(GraphModel::Sage);
        config.save(&path).unwrap();

        let loaded = C3dpConfig::load(&path).unwrap();
        assert_eq!(loaded.graph_model, GraphModel::Sage);
        assert_eq!(loaded.hidden_channels, 8);
        assert_eq!(loaded.in_channels, 5);
    }
}
