//! Graph datasets for contrastive structure/sequence training.
//!
//! Provides the sample type, Parquet and JSON storage, split arithmetic and
//! the batch loaders that feed the training loop.

pub mod loader;
pub mod reader;
pub mod split;
pub mod types;
pub mod writer;

pub use loader::{collate, load_dataset, GraphBatchData, GraphLoader, LoadOptions, LoadedDataset};
pub use reader::{read_dataset, read_graph_json, ProteinGraphReader};
pub use split::{random_split, SplitCounts, SplitIndices};
pub use types::{validate_dataset, DatasetError, DatasetKind, DatasetSummary, GraphSample};
pub use writer::{protein_graph_schema, write_graph_dir, write_graph_json, ProteinGraphWriter};
