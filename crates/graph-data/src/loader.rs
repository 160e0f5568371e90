//! Batch loading: collation of graph samples and per-split loaders.
//!
//! Collation produces plain `Vec` buffers ([`GraphBatchData`]); converting them
//! to tensors is left to the model crate so this crate stays backend-free.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;

use crate::reader::read_dataset;
use crate::split::{random_split, SplitCounts};
use crate::types::{DatasetKind, GraphSample};

/// A collated batch of graphs in CPU buffers.
///
/// Node indices in `edge_src` / `edge_dst` are global to the batch. `batch[i]`
/// is the graph that node `i` belongs to and `sequence_batch[j]` the graph
/// that sequence position `j` belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatchData {
    /// Number of graphs in the batch.
    pub num_graphs: usize,
    /// Total number of nodes across graphs.
    pub num_nodes: usize,
    /// Node feature width.
    pub feature_dim: usize,
    /// Flattened `num_nodes x feature_dim` node features.
    pub node_features: Vec<f32>,
    /// Edge sources (global node indices).
    pub edge_src: Vec<u32>,
    /// Edge targets (global node indices).
    pub edge_dst: Vec<u32>,
    /// Batch assignment of each node.
    pub batch: Vec<usize>,
    /// Total number of sequence positions across graphs.
    pub sequence_len: usize,
    /// Sequence embedding width.
    pub sequence_dim: usize,
    /// Flattened `sequence_len x sequence_dim` sequence embeddings.
    pub sequence: Vec<f32>,
    /// Batch assignment of each sequence position.
    pub sequence_batch: Vec<usize>,
}

impl GraphBatchData {
    /// Number of graphs in the batch.
    pub fn len(&self) -> usize {
        self.num_graphs
    }

    /// Whether the batch holds no graphs.
    pub fn is_empty(&self) -> bool {
        self.num_graphs == 0
    }
}

/// Concatenate samples into one disjoint-union batch.
///
/// Samples are expected to share feature widths (see `validate_dataset`).
pub fn collate(samples: &[&GraphSample]) -> GraphBatchData {
    let feature_dim = samples.first().map(|s| s.feature_dim).unwrap_or(0);
    let sequence_dim = samples.first().map(|s| s.sequence_dim).unwrap_or(0);
    let num_nodes: usize = samples.iter().map(|s| s.num_nodes).sum();
    let num_edges: usize = samples.iter().map(|s| s.num_edges()).sum();
    let sequence_len: usize = samples.iter().map(|s| s.sequence_len).sum();

    let mut out = GraphBatchData {
        num_graphs: samples.len(),
        num_nodes,
        feature_dim,
        node_features: Vec::with_capacity(num_nodes * feature_dim),
        edge_src: Vec::with_capacity(num_edges),
        edge_dst: Vec::with_capacity(num_edges),
        batch: Vec::with_capacity(num_nodes),
        sequence_len,
        sequence_dim,
        sequence: Vec::with_capacity(sequence_len * sequence_dim),
        sequence_batch: Vec::with_capacity(sequence_len),
    };

    let mut offset = 0u32;
    for (graph, sample) in samples.iter().enumerate() {
        debug_assert_eq!(sample.feature_dim, feature_dim);
        debug_assert_eq!(sample.sequence_dim, sequence_dim);

        out.node_features.extend_from_slice(&sample.node_features);
        out.edge_src.extend(sample.edge_src.iter().map(|&n| n + offset));
        out.edge_dst.extend(sample.edge_dst.iter().map(|&n| n + offset));
        out.batch.extend(std::iter::repeat(graph).take(sample.num_nodes));
        out.sequence.extend_from_slice(&sample.sequence);
        out.sequence_batch
            .extend(std::iter::repeat(graph).take(sample.sequence_len));

        offset += sample.num_nodes as u32;
    }

    out
}

/// Iterates one split of a shared dataset in fixed-size batches.
///
/// The final batch may be smaller than `batch_size`. With `shuffle` enabled
/// the visiting order is reshuffled at the start of every pass.
pub struct GraphLoader {
    samples: Arc<[GraphSample]>,
    order: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    rng: StdRng,
}

impl GraphLoader {
    /// Create a loader over `indices` of `samples`.
    ///
    /// # Panics
    /// Panics if `batch_size` is zero.
    pub fn new(
        samples: Arc<[GraphSample]>,
        indices: Vec<usize>,
        batch_size: usize,
        shuffle: bool,
        seed: u64,
    ) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        Self {
            samples,
            order: indices,
            batch_size,
            shuffle,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Number of batches per pass.
    pub fn len(&self) -> usize {
        self.order.len().div_ceil(self.batch_size)
    }

    /// Whether a pass yields no batches.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of samples in this split.
    pub fn num_samples(&self) -> usize {
        self.order.len()
    }

    /// Configured batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Start a pass over the split, reshuffling first if enabled.
    pub fn batches(&mut self) -> Batches<'_> {
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        Batches {
            samples: &self.samples,
            chunks: self.order.chunks(self.batch_size),
        }
    }
}

/// Iterator returned by [`GraphLoader::batches`].
pub struct Batches<'a> {
    samples: &'a [GraphSample],
    chunks: std::slice::Chunks<'a, usize>,
}

impl Iterator for Batches<'_> {
    type Item = GraphBatchData;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        let members: Vec<&GraphSample> = chunk.iter().map(|&i| &self.samples[i]).collect();
        Some(collate(&members))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// Parameters for [`load_dataset`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub train_pct: f64,
    pub val_pct: f64,
    pub shuffle: bool,
    pub seed: u64,
}

/// A loaded dataset with its split loaders.
pub struct LoadedDataset {
    /// Every sample of the dataset.
    pub dataset: Arc<[GraphSample]>,
    pub train: GraphLoader,
    pub val: GraphLoader,
    /// The held-out remainder. Never visited during training.
    pub test: GraphLoader,
    pub splits: SplitCounts,
}

/// Read a dataset, split it with a seeded shuffle and build the loaders.
pub fn load_dataset(
    kind: DatasetKind,
    root: &Path,
    options: &LoadOptions,
) -> anyhow::Result<LoadedDataset> {
    if options.batch_size == 0 {
        anyhow::bail!("batch_size must be > 0");
    }

    let samples = read_dataset(kind, root)?;
    let dataset: Arc<[GraphSample]> = samples.into();

    let splits = SplitCounts::compute(dataset.len(), options.train_pct, options.val_pct);
    let mut rng = StdRng::seed_from_u64(options.seed);
    let indices = random_split(splits, &mut rng);

    tracing::info!(
        train = splits.train,
        val = splits.val,
        test = splits.test,
        "Computed dataset splits"
    );

    let train = GraphLoader::new(
        dataset.clone(),
        indices.train,
        options.batch_size,
        options.shuffle,
        options.seed.wrapping_add(1),
    );
    let val = GraphLoader::new(
        dataset.clone(),
        indices.val,
        options.batch_size,
        options.shuffle,
        options.seed.wrapping_add(2),
    );
    let test = GraphLoader::new(
        dataset.clone(),
        indices.test,
        options.batch_size,
        false,
        options.seed.wrapping_add(3),
    );

    Ok(LoadedDataset {
        dataset,
        train,
        val,
        test,
        splits,
    })
}
