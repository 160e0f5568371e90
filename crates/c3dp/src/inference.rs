//! No-grad evaluation of a model over a loader: mean loss and running
//! retrieval accuracy. Used for the validation pass of every epoch and for
//! scoring a saved checkpoint on held-out graphs.

use burn::prelude::*;
use graph_data::GraphLoader;
use indicatif::{ProgressBar, ProgressStyle};

use crate::model::bridge::{batch_to_tensors, tensor_to_f64};
use crate::model::C3dpNet;
use crate::training::metrics::{logits_accuracy, PassAccumulator};

/// Aggregate result of one evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    /// Mean batch loss.
    pub loss: f64,
    /// Running mean of per-batch accuracy.
    pub accuracy: f64,
    pub batches: usize,
    pub graphs: usize,
}

/// Progress bar over the batches of one pass.
pub fn batch_progress(len: usize, desc: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_prefix(desc.to_string());
    pb
}

/// Evaluate `model` on every batch of `loader`.
///
/// `on_batch(loss, accuracy)` sees each batch's values as they are computed.
/// Pass a model on a non-autodiff backend (`model.valid()`) so no graph is
/// recorded.
pub fn evaluate<B: Backend>(
    model: &C3dpNet<B>,
    loader: &mut GraphLoader,
    device: &B::Device,
    desc: &str,
    on_batch: &mut dyn FnMut(f64, f64) -> anyhow::Result<()>,
) -> anyhow::Result<EvalSummary> {
    let pb = batch_progress(loader.len(), desc);
    let mut pass = PassAccumulator::new();
    let mut graphs = 0usize;

    for data in loader.batches() {
        graphs += data.num_graphs;
        let batch = batch_to_tensors::<B>(&data, device);
        let output = model.forward(&batch);

        let loss = tensor_to_f64(output.loss);
        let accuracy = logits_accuracy(output.logits)?;
        pass.update(loss, accuracy);
        on_batch(loss, accuracy)?;

        pb.set_message(format!("loss={loss:.4} acc={accuracy:.3}"));
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(EvalSummary {
        loss: pass.mean_loss(),
        accuracy: pass.accuracy(),
        batches: pass.batches(),
        graphs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::C3dpConfig;
    use burn::backend::ndarray::NdArray;
    use graph_data::GraphSample;
    use std::sync::Arc;

    type TestBackend = NdArray<f32>;

    fn sample(i: usize) -> GraphSample {
        GraphSample {
            name: format!("s{i}"),
            num_nodes: 3,
            feature_dim: 2,
            node_features: (0..6).map(|v| (v * (i + 1)) as f32 * 0.1).collect(),
            edge_src: vec![0, 1],
            edge_dst: vec![1, 2],
            sequence_len: 2,
            sequence_dim: 3,
            sequence: (0..6).map(|v| (v + i) as f32 * 0.2).collect(),
        }
    }

    #[test]
    fn test_evaluate_counts_batches_and_graphs() {
        let device = Default::default();
        let samples: Arc<[GraphSample]> = (0..5).map(sample).collect::<Vec<_>>().into();
        let mut loader = GraphLoader::new(samples, (0..5).collect(), 2, false, 0);
        let model = C3dpConfig::new(2, 3)
            .with_hidden_channels(4)
            .with_out_features_projection(4)
            .init::<TestBackend>(&device);

        let mut seen = Vec::new();
        let summary = evaluate(&model, &mut loader, &device, "Validation", &mut |loss, acc| {
            seen.push((loss, acc));
            Ok(())
        })
        .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.graphs, 5);
        assert_eq!(seen.len(), 3);
        let mean = seen.iter().map(|(l, _)| l).sum::<f64>() / 3.0;
        assert!((summary.loss - mean).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&summary.accuracy));
        // The last batch holds a single graph, which is always retrieved correctly.
        assert_eq!(seen[2].1, 1.0);
    }

    #[test]
    fn test_evaluate_empty_loader() {
        let device = Default::default();
        let samples: Arc<[GraphSample]> = Vec::new().into();
        let mut loader = GraphLoader::new(samples, vec![], 4, false, 0);
        let model = C3dpConfig::new(2, 3).init::<TestBackend>(&device);

        let summary = evaluate(&model, &mut loader, &device, "Test", &mut |_, _| Ok(())).unwrap();
        assert_eq!(summary.batches, 0);
        assert_eq!(summary.loss, 0.0);
    }
}
