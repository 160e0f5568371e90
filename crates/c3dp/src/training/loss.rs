//! Contrastive losses over a square graph-vs-sequence logits matrix.
//!
//! Both functions are generic over `B: Backend`. The true pairs sit on the
//! diagonal: graph `i` belongs with sequence `i`.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::activation::log_sigmoid;
use burn::tensor::TensorData;

/// Symmetric InfoNCE (CLIP-style) loss.
///
/// Cross-entropy of each row against its diagonal column (graph → sequence)
/// averaged with the same over columns (sequence → graph).
///
/// # Arguments
/// - `logits`: shape `(batch, batch)`
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`.
pub fn symmetric_info_nce_loss<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1> {
    let device = logits.device();
    let [batch_size, _] = logits.dims();
    let labels = Tensor::<B, 1, Int>::arange(0..batch_size as i64, &device);
    let ce = CrossEntropyLossConfig::new().init(&device);

    let graph_to_sequence = ce.forward(logits.clone(), labels.clone());
    let sequence_to_graph = ce.forward(logits.transpose(), labels);
    (graph_to_sequence + sequence_to_graph).div_scalar(2.0)
}

/// Pairwise sigmoid (SigLIP-style) loss.
///
/// Every cell is an independent binary decision: +1 on the diagonal, -1
/// elsewhere. `loss = -Σ log σ(label · logit) / batch`.
///
/// # Arguments
/// - `logits`: shape `(batch, batch)`, already scaled and biased
///
/// # Returns
/// Scalar loss tensor of shape `(1,)`.
pub fn sigmoid_contrastive_loss<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1> {
    let device = logits.device();
    let [batch_size, _] = logits.dims();

    let mut labels = vec![-1.0f32; batch_size * batch_size];
    for i in 0..batch_size {
        labels[i * batch_size + i] = 1.0;
    }
    let labels = Tensor::<B, 2>::from_data(TensorData::new(labels, [batch_size, batch_size]), &device);

    log_sigmoid(logits * labels)
        .sum()
        .div_scalar(batch_size as f64)
        .neg()
}
