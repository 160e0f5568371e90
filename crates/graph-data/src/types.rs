//! Data types for graph samples, dataset selection and dataset statistics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed failures raised while validating or loading graph datasets.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// The dataset root does not exist or is not a directory.
    #[error("Dataset root not found: {0}")]
    MissingRoot(String),

    /// No graph files were found under the dataset root.
    #[error("No graph files found under {0}")]
    Empty(String),

    /// A sample's flattened buffers disagree with its declared shape.
    #[error("Graph '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },

    /// Samples in the same dataset have different feature widths.
    #[error("Graph '{name}' has {found} {what} features, expected {expected}")]
    InconsistentDim {
        name: String,
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Which on-disk layout a dataset uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Processed protein graphs stored as Parquet files.
    Proteins,
    /// A flat directory of JSON-serialized graphs.
    Directory,
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proteins => write!(f, "proteins"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

impl DatasetKind {
    /// Map a dataset name to its layout. Only `"proteins"` selects the protein
    /// dataset; every other name is read as a directory of serialized graphs.
    pub fn from_name(name: &str) -> Self {
        match name {
            "proteins" => Self::Proteins,
            _ => Self::Directory,
        }
    }
}

/// One structure graph paired with its sequence representation.
///
/// Buffers are row-major: `node_features` is `num_nodes x feature_dim` and
/// `sequence` is `sequence_len x sequence_dim`. Edges are directed and use
/// node indices local to this graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSample {
    /// Identifier of the structure (e.g. PDB id + chain).
    pub name: String,
    /// Number of nodes (residues).
    pub num_nodes: usize,
    /// Width of each node feature vector.
    pub feature_dim: usize,
    /// Flattened node features.
    pub node_features: Vec<f32>,
    /// Source node of each edge.
    pub edge_src: Vec<u32>,
    /// Target node of each edge.
    pub edge_dst: Vec<u32>,
    /// Number of sequence positions.
    pub sequence_len: usize,
    /// Width of each per-position sequence embedding.
    pub sequence_dim: usize,
    /// Flattened per-position sequence embeddings.
    pub sequence: Vec<f32>,
}

impl GraphSample {
    /// Number of directed edges.
    pub fn num_edges(&self) -> usize {
        self.edge_src.len()
    }

    /// Check that the flattened buffers match the declared shape and that
    /// every edge endpoint is a valid node index.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let malformed = |reason: String| DatasetError::Malformed {
            name: self.name.clone(),
            reason,
        };

        if self.num_nodes == 0 {
            return Err(malformed("graph has no nodes".to_string()));
        }
        if self.node_features.len() != self.num_nodes * self.feature_dim {
            return Err(malformed(format!(
                "node_features has {} values, expected {} x {}",
                self.node_features.len(),
                self.num_nodes,
                self.feature_dim
            )));
        }
        if self.edge_src.len() != self.edge_dst.len() {
            return Err(malformed(format!(
                "edge_src has {} entries but edge_dst has {}",
                self.edge_src.len(),
                self.edge_dst.len()
            )));
        }
        if let Some(&bad) = self
            .edge_src
            .iter()
            .chain(self.edge_dst.iter())
            .find(|&&n| n as usize >= self.num_nodes)
        {
            return Err(malformed(format!(
                "edge endpoint {bad} out of range for {} nodes",
                self.num_nodes
            )));
        }
        if self.sequence_len == 0 {
            return Err(malformed("sequence is empty".to_string()));
        }
        if self.sequence.len() != self.sequence_len * self.sequence_dim {
            return Err(malformed(format!(
                "sequence has {} values, expected {} x {}",
                self.sequence.len(),
                self.sequence_len,
                self.sequence_dim
            )));
        }
        Ok(())
    }
}

/// Check every sample and require a single node/sequence feature width.
pub fn validate_dataset(samples: &[GraphSample]) -> Result<(), DatasetError> {
    let Some(first) = samples.first() else {
        return Ok(());
    };
    for sample in samples {
        sample.validate()?;
        if sample.feature_dim != first.feature_dim {
            return Err(DatasetError::InconsistentDim {
                name: sample.name.clone(),
                what: "node",
                expected: first.feature_dim,
                found: sample.feature_dim,
            });
        }
        if sample.sequence_dim != first.sequence_dim {
            return Err(DatasetError::InconsistentDim {
                name: sample.name.clone(),
                what: "sequence",
                expected: first.sequence_dim,
                found: sample.sequence_dim,
            });
        }
    }
    Ok(())
}

/// Summary statistics over a loaded dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub graphs: usize,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub min_nodes: usize,
    pub max_nodes: usize,
    pub mean_nodes: f64,
    pub feature_dim: usize,
    pub sequence_dim: usize,
}

impl DatasetSummary {
    /// Compute statistics for a slice of samples.
    pub fn from_samples(samples: &[GraphSample]) -> Self {
        let total_nodes: usize = samples.iter().map(|s| s.num_nodes).sum();
        let total_edges: usize = samples.iter().map(GraphSample::num_edges).sum();
        let mean_nodes = if samples.is_empty() {
            0.0
        } else {
            total_nodes as f64 / samples.len() as f64
        };
        Self {
            graphs: samples.len(),
            total_nodes,
            total_edges,
            min_nodes: samples.iter().map(|s| s.num_nodes).min().unwrap_or(0),
            max_nodes: samples.iter().map(|s| s.num_nodes).max().unwrap_or(0),
            mean_nodes,
            feature_dim: samples.first().map(|s| s.feature_dim).unwrap_or(0),
            sequence_dim: samples.first().map(|s| s.sequence_dim).unwrap_or(0),
        }
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graphs:        {}", self.graphs)?;
        writeln!(f, "Nodes:         {} (min {}, max {}, mean {:.1})", self.total_nodes, self.min_nodes, self.max_nodes, self.mean_nodes)?;
        writeln!(f, "Edges:         {}", self.total_edges)?;
        writeln!(f, "Node features: {}", self.feature_dim)?;
        write!(f, "Sequence dim:  {}", self.sequence_dim)
    }
}
