//! Writes graph samples to Parquet (protein dataset) or JSON (directory dataset).

use crate::types::GraphSample;
use arrow::array::*;
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Arrow schema for protein graph Parquet files (9 columns).
pub fn protein_graph_schema() -> Schema {
    Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("num_nodes", DataType::UInt32, false),
        Field::new("feature_dim", DataType::UInt32, false),
        Field::new("node_features", list_type(DataType::Float32), false),
        Field::new("edge_src", list_type(DataType::UInt32), false),
        Field::new("edge_dst", list_type(DataType::UInt32), false),
        Field::new("sequence_len", DataType::UInt32, false),
        Field::new("sequence_dim", DataType::UInt32, false),
        Field::new("sequence", list_type(DataType::Float32), false),
    ])
}

fn list_type(item: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", item, false)))
}

/// Buffers graph samples and writes them to a Parquet file.
pub struct ProteinGraphWriter {
    samples: Vec<GraphSample>,
    output_path: PathBuf,
}

impl ProteinGraphWriter {
    /// Create a new writer that will write to the given path.
    pub fn new(output_path: PathBuf) -> Self {
        Self {
            samples: Vec::new(),
            output_path,
        }
    }

    /// Buffer a single sample.
    pub fn record(&mut self, sample: GraphSample) {
        self.samples.push(sample);
    }

    /// Buffer multiple samples.
    pub fn record_all(&mut self, samples: Vec<GraphSample>) {
        self.samples.extend(samples);
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Write all buffered samples to the Parquet file and return the output path.
    pub fn finish(self) -> anyhow::Result<PathBuf> {
        let schema = Arc::new(protein_graph_schema());

        let batch = if self.samples.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            build_record_batch(&self.samples)?
        };

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::File::create(&self.output_path)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!(
            graphs = self.samples.len(),
            path = %self.output_path.display(),
            "Wrote protein graph Parquet file"
        );

        Ok(self.output_path)
    }
}

/// Serialize one sample as JSON at `path`.
pub fn write_graph_json(sample: &GraphSample, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), sample)?;
    Ok(())
}

/// Write every sample as `<dir>/<index>-<name>.json`.
pub fn write_graph_dir(samples: &[GraphSample], dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut paths = Vec::with_capacity(samples.len());
    for (i, sample) in samples.iter().enumerate() {
        let path = dir.join(format!("{i:06}-{}.json", sample.name));
        write_graph_json(sample, &path)?;
        paths.push(path);
    }
    tracing::info!(graphs = samples.len(), dir = %dir.display(), "Wrote graph directory");
    Ok(paths)
}

fn float_list<'a>(rows: impl Iterator<Item = &'a [f32]>) -> ListArray {
    let mut values = Vec::new();
    let mut offsets = vec![0i32];
    for row in rows {
        values.extend_from_slice(row);
        offsets.push(values.len() as i32);
    }
    ListArray::new(
        Arc::new(Field::new("item", DataType::Float32, false)),
        OffsetBuffer::new(offsets.into()),
        Arc::new(Float32Array::from(values)),
        None,
    )
}

fn u32_list<'a>(rows: impl Iterator<Item = &'a [u32]>) -> ListArray {
    let mut values = Vec::new();
    let mut offsets = vec![0i32];
    for row in rows {
        values.extend_from_slice(row);
        offsets.push(values.len() as i32);
    }
    ListArray::new(
        Arc::new(Field::new("item", DataType::UInt32, false)),
        OffsetBuffer::new(offsets.into()),
        Arc::new(UInt32Array::from(values)),
        None,
    )
}

/// Build an Arrow RecordBatch from graph samples.
fn build_record_batch(samples: &[GraphSample]) -> anyhow::Result<RecordBatch> {
    let schema = Arc::new(protein_graph_schema());

    let names: StringArray = samples.iter().map(|s| Some(s.name.as_str())).collect();
    let num_nodes: UInt32Array = samples.iter().map(|s| Some(s.num_nodes as u32)).collect();
    let feature_dims: UInt32Array = samples.iter().map(|s| Some(s.feature_dim as u32)).collect();
    let node_features = float_list(samples.iter().map(|s| s.node_features.as_slice()));
    let edge_src = u32_list(samples.iter().map(|s| s.edge_src.as_slice()));
    let edge_dst = u32_list(samples.iter().map(|s| s.edge_dst.as_slice()));
    let sequence_lens: UInt32Array = samples.iter().map(|s| Some(s.sequence_len as u32)).collect();
    let sequence_dims: UInt32Array = samples.iter().map(|s| Some(s.sequence_dim as u32)).collect();
    let sequences = float_list(samples.iter().map(|s| s.sequence.as_slice()));

    let columns: Vec<Arc<dyn arrow::array::Array>> = vec![
        Arc::new(names),
        Arc::new(num_nodes),
        Arc::new(feature_dims),
        Arc::new(node_features),
        Arc::new(edge_src),
        Arc::new(edge_dst),
        Arc::new(sequence_lens),
        Arc::new(sequence_dims),
        Arc::new(sequences),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}
