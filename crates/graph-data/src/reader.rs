//! Reads graph samples from Parquet files or a directory of JSON graphs.

use crate::types::{validate_dataset, DatasetError, DatasetKind, GraphSample};
use arrow::array::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::path::{Path, PathBuf};

/// Static methods for reading protein graph Parquet files.
pub struct ProteinGraphReader;

impl ProteinGraphReader {
    /// Read all graph samples from a Parquet file.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<GraphSample>> {
        let file = std::fs::File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut samples = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let mut batch_samples = extract_samples_from_batch(&batch)?;
            samples.append(&mut batch_samples);
        }

        tracing::debug!(
            count = samples.len(),
            path = %path.display(),
            "Read protein graphs"
        );

        Ok(samples)
    }

    /// Read graph samples from multiple Parquet files, in the given order.
    pub fn read_multiple(paths: &[PathBuf]) -> anyhow::Result<Vec<GraphSample>> {
        let mut all_samples = Vec::new();
        for path in paths {
            let mut samples = Self::read_all(path)?;
            all_samples.append(&mut samples);
        }
        Ok(all_samples)
    }
}

/// Load every graph of a dataset root according to its layout.
///
/// - `Proteins`: all `*.parquet` files under `<root>/processed/` (or `<root>`
///   when there is no `processed/` subdirectory).
/// - `Directory`: all `*.json` files directly inside `<root>`.
///
/// Files are visited in sorted order so that seeded splits are reproducible.
pub fn read_dataset(kind: DatasetKind, root: &Path) -> anyhow::Result<Vec<GraphSample>> {
    if !root.is_dir() {
        return Err(DatasetError::MissingRoot(root.display().to_string()).into());
    }

    let samples = match kind {
        DatasetKind::Proteins => {
            let processed = root.join("processed");
            let dir = if processed.is_dir() { processed } else { root.to_path_buf() };
            let files = list_files(&dir, "parquet")?;
            if files.is_empty() {
                return Err(DatasetError::Empty(dir.display().to_string()).into());
            }
            ProteinGraphReader::read_multiple(&files)?
        }
        DatasetKind::Directory => {
            let files = list_files(root, "json")?;
            if files.is_empty() {
                return Err(DatasetError::Empty(root.display().to_string()).into());
            }
            let mut samples = Vec::with_capacity(files.len());
            for path in &files {
                samples.push(read_graph_json(path)?);
            }
            samples
        }
    };

    validate_dataset(&samples)?;

    tracing::info!(
        kind = %kind,
        graphs = samples.len(),
        root = %root.display(),
        "Loaded dataset"
    );

    Ok(samples)
}

/// Deserialize one JSON graph file.
pub fn read_graph_json(path: &Path) -> anyhow::Result<GraphSample> {
    let file = std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", path.display()))?;
    let sample: GraphSample = serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))?;
    Ok(sample)
}

/// Regular files in `dir` with the given extension, sorted by path.
fn list_files(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow::anyhow!("Missing column '{name}'"))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow::anyhow!("Column '{name}' has an unexpected type"))
}

fn f32_row(lists: &ListArray, i: usize, name: &str) -> anyhow::Result<Vec<f32>> {
    let values = lists.value(i);
    let array = values
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| anyhow::anyhow!("List values of '{name}' are not Float32Array"))?;
    Ok(array.values().to_vec())
}

fn u32_row(lists: &ListArray, i: usize, name: &str) -> anyhow::Result<Vec<u32>> {
    let values = lists.value(i);
    let array = values
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| anyhow::anyhow!("List values of '{name}' are not UInt32Array"))?;
    Ok(array.values().to_vec())
}

/// Extract graph samples from a single Arrow RecordBatch.
fn extract_samples_from_batch(batch: &RecordBatch) -> anyhow::Result<Vec<GraphSample>> {
    let names = column::<StringArray>(batch, "name")?;
    let num_nodes = column::<UInt32Array>(batch, "num_nodes")?;
    let feature_dims = column::<UInt32Array>(batch, "feature_dim")?;
    let node_features = column::<ListArray>(batch, "node_features")?;
    let edge_src = column::<ListArray>(batch, "edge_src")?;
    let edge_dst = column::<ListArray>(batch, "edge_dst")?;
    let sequence_lens = column::<UInt32Array>(batch, "sequence_len")?;
    let sequence_dims = column::<UInt32Array>(batch, "sequence_dim")?;
    let sequences = column::<ListArray>(batch, "sequence")?;

    let mut samples = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        samples.push(GraphSample {
            name: names.value(i).to_string(),
            num_nodes: num_nodes.value(i) as usize,
            feature_dim: feature_dims.value(i) as usize,
            node_features: f32_row(node_features, i, "node_features")?,
            edge_src: u32_row(edge_src, i, "edge_src")?,
            edge_dst: u32_row(edge_dst, i, "edge_dst")?,
            sequence_len: sequence_lens.value(i) as usize,
            sequence_dim: sequence_dims.value(i) as usize,
            sequence: f32_row(sequences, i, "sequence")?,
        });
    }
    Ok(samples)
}
