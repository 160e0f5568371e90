//! Readout: reduce per-node (or per-position) rows to one row per graph.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// How rows belonging to the same graph are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    Mean,
    Max,
    Sum,
}

impl std::fmt::Display for Pooling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Max => write!(f, "max"),
            Self::Sum => write!(f, "sum"),
        }
    }
}

impl std::str::FromStr for Pooling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            "sum" | "add" => Ok(Self::Sum),
            other => Err(format!("unknown pooling '{other}' (expected mean, max or sum)")),
        }
    }
}

/// Pool rows of `x` into groups given by a one-hot `assignment`.
///
/// - `x`: shape `(members, features)`
/// - `assignment`: shape `(groups, members)`, 1 where a member belongs to a group
///
/// Returns shape `(groups, features)`. Every group must have at least one
/// member for `Max` to be meaningful.
pub fn pool<B: Backend>(mode: Pooling, x: Tensor<B, 2>, assignment: Tensor<B, 2>) -> Tensor<B, 2> {
    match mode {
        Pooling::Sum => assignment.matmul(x),
        Pooling::Mean => {
            let counts = assignment.clone().sum_dim(1).clamp_min(1.0); // (groups, 1)
            assignment.matmul(x) / counts
        }
        Pooling::Max => {
            let [groups, _members] = assignment.dims();
            let [_, features] = x.dims();
            // 0 for members, a large negative offset for non-members
            let offset = (assignment - 1.0).mul_scalar(1e9).unsqueeze_dim::<3>(2); // (groups, members, 1)
            let candidates = x.unsqueeze_dim::<3>(0) + offset; // (groups, members, features)
            candidates.max_dim(1).reshape([groups, features])
        }
    }
}
