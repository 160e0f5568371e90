//! Integration tests for the graph-data crate.
//!
//! These test full pipelines: writing -> reading -> splitting -> batching.
//! No model or tensor backend needed.

use std::collections::HashSet;
use tempfile::TempDir;
use graph_data::{
    load_dataset, read_dataset, write_graph_dir, DatasetError, DatasetKind, GraphSample,
    LoadOptions, ProteinGraphReader, ProteinGraphWriter, SplitCounts,
};

fn make_sample(name: &str, nodes: usize) -> GraphSample {
    // A path graph with edges in both directions.
    let mut edge_src = Vec::new();
    let mut edge_dst = Vec::new();
    for i in 0..nodes.saturating_sub(1) as u32 {
        edge_src.extend([i, i + 1]);
        edge_dst.extend([i + 1, i]);
    }
    GraphSample {
        name: name.to_string(),
        num_nodes: nodes,
        feature_dim: 4,
        node_features: (0..nodes * 4).map(|v| v as f32 * 0.25).collect(),
        edge_src,
        edge_dst,
        sequence_len: nodes,
        sequence_dim: 3,
        sequence: (0..nodes * 3).map(|v| -(v as f32)).collect(),
    }
}

fn options(batch_size: usize, train_pct: f64, val_pct: f64) -> LoadOptions {
    LoadOptions {
        batch_size,
        train_pct,
        val_pct,
        shuffle: true,
        seed: 11,
    }
}

/// Parquet write -> read keeps every field intact.
#[test]
fn test_parquet_roundtrip_preserves_samples() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("proteins.parquet");

    let samples = vec![make_sample("1abc_A", 3), make_sample("2xyz_B", 5)];
    let mut writer = ProteinGraphWriter::new(path.clone());
    writer.record_all(samples.clone());
    writer.finish().unwrap();

    let read_back = ProteinGraphReader::read_all(&path).unwrap();
    assert_eq!(read_back, samples);
}

/// An empty writer still produces a readable file.
#[test]
fn test_parquet_empty_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.parquet");
    ProteinGraphWriter::new(path.clone()).finish().unwrap();

    let read_back = ProteinGraphReader::read_all(&path).unwrap();
    assert!(read_back.is_empty());
}

/// The proteins layout reads every Parquet file under `processed/` in path order.
#[test]
fn test_read_proteins_dataset_from_processed_dir() {
    let tmp = TempDir::new().unwrap();
    let processed = tmp.path().join("processed");

    let mut w1 = ProteinGraphWriter::new(processed.join("part-000.parquet"));
    w1.record_all(vec![make_sample("a", 2), make_sample("b", 3)]);
    w1.finish().unwrap();
    let mut w2 = ProteinGraphWriter::new(processed.join("part-001.parquet"));
    w2.record(make_sample("c", 4));
    w2.finish().unwrap();
    // Non-parquet files are ignored.
    std::fs::write(processed.join("notes.txt"), "ignore me").unwrap();

    let samples = read_dataset(DatasetKind::Proteins, tmp.path()).unwrap();
    let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

/// The directory layout reads only JSON graph files.
#[test]
fn test_read_directory_dataset() {
    let tmp = TempDir::new().unwrap();
    let samples: Vec<GraphSample> = (0..4).map(|i| make_sample(&format!("g{i}"), i + 2)).collect();
    write_graph_dir(&samples, tmp.path()).unwrap();
    std::fs::create_dir(tmp.path().join("subdir.json")).unwrap();
    std::fs::write(tmp.path().join("readme.md"), "# not a graph").unwrap();

    let read_back = read_dataset(DatasetKind::Directory, tmp.path()).unwrap();
    assert_eq!(read_back, samples);
}

#[test]
fn test_missing_root_is_typed_error() {
    let tmp = TempDir::new().unwrap();
    let err = read_dataset(DatasetKind::Directory, &tmp.path().join("nope")).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DatasetError>(),
        Some(DatasetError::MissingRoot(_))
    ));
}

#[test]
fn test_proteins_without_parquet_is_empty_error() {
    let tmp = TempDir::new().unwrap();
    let err = read_dataset(DatasetKind::Proteins, tmp.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DatasetError>(),
        Some(DatasetError::Empty(_))
    ));
}

#[test]
fn test_directory_without_json_is_empty_error() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "not a graph").unwrap();
    let err = read_dataset(DatasetKind::Directory, tmp.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DatasetError>(),
        Some(DatasetError::Empty(_))
    ));
}

#[test]
fn test_malformed_graph_rejected_on_load() {
    let tmp = TempDir::new().unwrap();
    let mut bad = make_sample("bad", 3);
    bad.edge_dst[0] = 17;
    write_graph_dir(&[make_sample("good", 3), bad], tmp.path()).unwrap();

    let err = read_dataset(DatasetKind::Directory, tmp.path()).unwrap_err();
    assert!(err.to_string().contains("bad"), "{err}");
}

/// Full pipeline: write -> load_dataset -> iterate both loaders.
#[test]
fn test_load_dataset_splits_and_batches() {
    let tmp = TempDir::new().unwrap();
    let samples: Vec<GraphSample> = (0..20).map(|i| make_sample(&format!("g{i:02}"), 2 + i % 5)).collect();
    write_graph_dir(&samples, tmp.path()).unwrap();

    let mut loaded = load_dataset(DatasetKind::Directory, tmp.path(), &options(4, 70.0, 20.0)).unwrap();

    assert_eq!(loaded.dataset.len(), 20);
    assert_eq!(loaded.splits, SplitCounts { train: 14, val: 4, test: 2 });
    assert_eq!(loaded.train.num_samples(), 14);
    assert_eq!(loaded.train.len(), 4);
    assert_eq!(loaded.val.len(), 1);

    let train_graphs: usize = loaded.train.batches().map(|b| b.num_graphs).sum();
    let val_graphs: usize = loaded.val.batches().map(|b| b.num_graphs).sum();
    assert_eq!(train_graphs, 14);
    assert_eq!(val_graphs, 4);

    for batch in loaded.train.batches() {
        assert_eq!(batch.batch.len(), batch.num_nodes);
        assert_eq!(batch.node_features.len(), batch.num_nodes * batch.feature_dim);
        assert_eq!(batch.sequence_batch.len(), batch.sequence_len);
        assert!(batch.edge_src.iter().all(|&n| (n as usize) < batch.num_nodes));
        let graphs: HashSet<usize> = batch.batch.iter().copied().collect();
        assert_eq!(graphs.len(), batch.num_graphs);
    }
}

/// Same seed, same split membership.
#[test]
fn test_load_dataset_is_reproducible() {
    let tmp = TempDir::new().unwrap();
    let samples: Vec<GraphSample> = (0..12).map(|i| make_sample(&format!("g{i:02}"), 2 + i)).collect();
    write_graph_dir(&samples, tmp.path()).unwrap();

    let node_counts = |opts: &LoadOptions| -> Vec<usize> {
        let mut loaded = load_dataset(DatasetKind::Directory, tmp.path(), opts).unwrap();
        loaded.val.batches().flat_map(|b| {
            let mut per_graph = vec![0usize; b.num_graphs];
            for g in b.batch {
                per_graph[g] += 1;
            }
            per_graph
        }).collect()
    };

    let opts = options(2, 50.0, 50.0);
    assert_eq!(node_counts(&opts), node_counts(&opts));
}

/// Zero percentages mean evaluation-only: both loaders are empty.
#[test]
fn test_load_dataset_evaluation_mode() {
    let tmp = TempDir::new().unwrap();
    let samples: Vec<GraphSample> = (0..5).map(|i| make_sample(&format!("g{i}"), 3)).collect();
    write_graph_dir(&samples, tmp.path()).unwrap();

    let loaded = load_dataset(DatasetKind::Directory, tmp.path(), &options(2, 0.0, 0.0)).unwrap();
    assert_eq!(loaded.splits, SplitCounts { train: 0, val: 0, test: 5 });
    assert!(loaded.train.is_empty());
    assert!(loaded.val.is_empty());
    assert_eq!(loaded.test.num_samples(), 5);
    assert_eq!(loaded.test.len(), 3);
}

#[test]
fn test_load_dataset_rejects_zero_batch_size() {
    let tmp = TempDir::new().unwrap();
    write_graph_dir(&[make_sample("g", 3)], tmp.path()).unwrap();
    assert!(load_dataset(DatasetKind::Directory, tmp.path(), &options(0, 50.0, 50.0)).is_err());
}
