//! Retrieval accuracy and per-epoch training metrics.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::model::bridge::tensor_to_matrix;

/// Bidirectional retrieval accuracy of a square, row-major logits matrix.
///
/// A row is correct when its argmax column is the row index (graph → sequence);
/// a column is correct when its argmax row is the column index
/// (sequence → graph). Returns `(row_hits + col_hits) / 2 / batch_size`.
/// Ties resolve to the first maximal index.
pub fn batch_accuracy(logits: &[f32], batch_size: usize) -> f64 {
    if batch_size == 0 {
        return 0.0;
    }
    debug_assert_eq!(logits.len(), batch_size * batch_size);
    let n = batch_size;
    let at = |r: usize, c: usize| logits[r * n + c];

    let row_hits = (0..n)
        .filter(|&r| first_argmax((0..n).map(|c| at(r, c))) == r)
        .count();
    let col_hits = (0..n)
        .filter(|&c| first_argmax((0..n).map(|r| at(r, c))) == c)
        .count();

    (row_hits + col_hits) as f64 / 2.0 / n as f64
}

fn first_argmax(values: impl Iterator<Item = f32>) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, v) in values.enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// [`batch_accuracy`] of a logits tensor.
pub fn logits_accuracy<B: Backend>(logits: Tensor<B, 2>) -> anyhow::Result<f64> {
    let (values, [rows, cols]) = tensor_to_matrix(logits)?;
    anyhow::ensure!(rows == cols, "logits must be square, got {rows}x{cols}");
    Ok(batch_accuracy(&values, rows))
}

/// Incremental mean: fold the `step`-th value (1-based) into `previous`.
pub fn running_accuracy(current: f64, previous: f64, step: usize) -> f64 {
    previous + (current - previous) / step.max(1) as f64
}

/// Mean loss and running accuracy over the batches of one pass.
#[derive(Debug, Clone, Default)]
pub struct PassAccumulator {
    loss_sum: f64,
    accuracy: f64,
    batches: usize,
}

impl PassAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, loss: f64, accuracy: f64) {
        self.batches += 1;
        self.loss_sum += loss;
        self.accuracy = running_accuracy(accuracy, self.accuracy, self.batches);
    }

    /// Mean loss over all batches, 0 when none were seen.
    pub fn mean_loss(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f64
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}

/// Summary of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    pub train_loss: f64,
    pub train_acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
    pub lr: f64,
}

impl std::fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "train_loss: {:.6} - train_acc: {:.6} - val_loss: {:.6} - val_acc: {:.6}",
            self.train_loss, self.train_acc, self.val_loss, self.val_acc
        )
    }
}

/// Ordered record of epoch metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsHistory {
    entries: Vec<EpochMetrics>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: EpochMetrics) {
        self.entries.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.entries.last()
    }

    /// The epoch with the lowest finite validation loss.
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.entries
            .iter()
            .filter(|m| m.val_loss.is_finite())
            .min_by(|a, b| a.val_loss.total_cmp(&b.val_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;
    use proptest::prelude::*;

    fn scaled_identity(n: usize, scale: f32) -> Vec<f32> {
        (0..n * n)
            .map(|k| if k / n == k % n { scale } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_identity_is_perfect() {
        for n in [1, 2, 5, 16] {
            assert_eq!(batch_accuracy(&scaled_identity(n, 3.5), n), 1.0);
        }
    }

    #[test]
    fn test_cyclic_shift_is_zero() {
        // Row r peaks at column (r + 1) % n.
        let n = 4;
        let logits: Vec<f32> = (0..n * n)
            .map(|k| if (k / n + 1) % n == k % n { 1.0 } else { 0.0 })
            .collect();
        assert_eq!(batch_accuracy(&logits, n), 0.0);
    }

    #[test]
    fn test_one_direction_correct() {
        // Rows all peak at their diagonal; columns 0 and 1 peak at row 2.
        let logits = vec![
            5.0, 0.0, 0.0, //
            0.0, 5.0, 0.0, //
            9.0, 9.0, 10.0,
        ];
        // rows: 3/3 hits; columns: only column 2 → (3 + 1) / 2 / 3
        assert!((batch_accuracy(&logits, 3) - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_take_first_index() {
        // Uniform logits: every argmax is index 0, so only row 0 and column 0 hit.
        let n = 3;
        assert!((batch_accuracy(&vec![1.0; n * n], n) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(batch_accuracy(&[], 0), 0.0);
    }

    #[test]
    fn test_logits_accuracy_tensor() {
        let device = Default::default();
        let t = Tensor::<NdArray<f32>, 2>::from_data(
            TensorData::new(scaled_identity(3, 2.0), [3, 3]),
            &device,
        );
        assert_eq!(logits_accuracy(t).unwrap(), 1.0);

        let rect = Tensor::<NdArray<f32>, 2>::zeros([2, 3], &device);
        assert!(logits_accuracy(rect).is_err());
    }

    #[test]
    fn test_running_accuracy_matches_mean() {
        let values = [0.25, 1.0, 0.0, 0.5, 0.75, 0.125, 0.9];
        let mut acc = 0.0;
        for (k, &v) in values.iter().enumerate() {
            acc = running_accuracy(v, acc, k + 1);
            let mean = values[..=k].iter().sum::<f64>() / (k + 1) as f64;
            assert!((acc - mean).abs() < 1e-9, "step {}: {acc} vs {mean}", k + 1);
        }
    }

    proptest! {
        #[test]
        fn prop_running_accuracy_is_arithmetic_mean(
            values in prop::collection::vec(0.0f64..=1.0, 1..64)
        ) {
            let mut acc = 0.0;
            for (k, &v) in values.iter().enumerate() {
                acc = running_accuracy(v, acc, k + 1);
                prop_assert!((0.0..=1.0 + 1e-12).contains(&acc));
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            prop_assert!((acc - mean).abs() < 1e-9, "{} vs {}", acc, mean);
        }
    }

    #[test]
    fn test_pass_accumulator() {
        let mut acc = PassAccumulator::new();
        assert_eq!(acc.mean_loss(), 0.0);
        acc.update(2.0, 1.0);
        acc.update(4.0, 0.0);
        assert_eq!(acc.batches(), 2);
        assert!((acc.mean_loss() - 3.0).abs() < 1e-12);
        assert!((acc.accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_history_best_skips_nan() {
        let mut history = MetricsHistory::new();
        for (epoch, val_loss) in [(1, 0.9), (2, f64::NAN), (3, 0.4), (4, 0.6)] {
            history.push(EpochMetrics {
                epoch,
                train_loss: 1.0,
                train_acc: 0.0,
                val_loss,
                val_acc: 0.0,
                lr: 1e-3,
            });
        }
        assert_eq!(history.len(), 4);
        assert_eq!(history.best().map(|m| m.epoch), Some(3));
        assert_eq!(history.last().map(|m| m.epoch), Some(4));
    }
}
