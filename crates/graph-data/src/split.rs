//! Train/validation/test split arithmetic and seeded random partitioning.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of instances assigned to each split. Always sums to the dataset size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitCounts {
    /// Convert split percentages into instance counts.
    ///
    /// - Both percentages zero: everything goes to test (evaluation-only run).
    /// - Otherwise `train = floor(n * train_pct / 100)`, `val = floor(n * val_pct / 100)`
    ///   and test takes the remainder.
    /// - When `train_pct + val_pct >= 100` test is empty and train becomes
    ///   `n - val`, so an oversubscribed split shrinks train and keeps val.
    ///
    /// Percentages are not validated. Val is clamped to `n`, so the sum stays
    /// `n` even for values above 100; a split may silently come out empty.
    pub fn compute(n: usize, train_pct: f64, val_pct: f64) -> Self {
        if train_pct == 0.0 && val_pct == 0.0 {
            return Self { train: 0, val: 0, test: n };
        }

        if train_pct + val_pct >= 100.0 {
            let val = fraction_of(n, val_pct).min(n);
            return Self { train: n - val, val, test: 0 };
        }

        let train = fraction_of(n, train_pct).min(n);
        // Only out-of-range input (a negative percentage) can push val past n - train.
        let val = fraction_of(n, val_pct).min(n - train);
        Self { train, val, test: n - train - val }
    }

    /// Total number of instances covered.
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

fn fraction_of(n: usize, pct: f64) -> usize {
    let raw = (n as f64 * pct / 100.0).floor();
    if raw.is_finite() && raw > 0.0 {
        raw as usize
    } else {
        0
    }
}

/// Index sets produced by [`random_split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..counts.total()` and cut it into consecutive train/val/test runs.
pub fn random_split(counts: SplitCounts, rng: &mut impl Rng) -> SplitIndices {
    let mut order: Vec<usize> = (0..counts.total()).collect();
    order.shuffle(rng);

    let test = order.split_off(counts.train + counts.val);
    let val = order.split_off(counts.train);
    SplitIndices { train: order, val, test }
}
