//! Generate a synthetic protein graph dataset for smoke-testing `c3dp train`.
//!
//! Each protein is a random residue chain folded onto a 3D random walk. Nodes
//! are residues with one-hot amino-acid features, edges connect residues whose
//! positions lie within the contact radius, and the sequence embedding is a
//! fixed random projection of the residue identities.
//!
//! Usage: cargo run -p c3dp-cli --example gen_synthetic_dataset -- data/proteins [num_proteins]

use std::path::PathBuf;

use graph_data::{GraphSample, ProteinGraphWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const AMINO_ACIDS: usize = 20;
const SEQUENCE_DIM: usize = 16;
const CONTACT_RADIUS: f32 = 1.6;

fn make_protein(index: usize, embedding: &[f32], rng: &mut StdRng) -> GraphSample {
    let num_nodes = rng.gen_range(12..40);

    let residues: Vec<usize> = (0..num_nodes).map(|_| rng.gen_range(0..AMINO_ACIDS)).collect();
    let mut positions = vec![[0.0f32; 3]; num_nodes];
    for i in 1..num_nodes {
        let step: [f32; 3] = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
        for d in 0..3 {
            positions[i][d] = positions[i - 1][d] + step[d];
        }
    }

    let mut node_features = vec![0.0f32; num_nodes * AMINO_ACIDS];
    for (i, &aa) in residues.iter().enumerate() {
        node_features[i * AMINO_ACIDS + aa] = 1.0;
    }

    let mut edge_src = Vec::new();
    let mut edge_dst = Vec::new();
    for i in 0..num_nodes {
        for j in 0..num_nodes {
            if i == j {
                continue;
            }
            let dist: f32 = (0..3)
                .map(|d| (positions[i][d] - positions[j][d]).powi(2))
                .sum::<f32>()
                .sqrt();
            if j == i + 1 || i == j + 1 || dist < CONTACT_RADIUS {
                edge_src.push(i as u32);
                edge_dst.push(j as u32);
            }
        }
    }

    let mut sequence = Vec::with_capacity(num_nodes * SEQUENCE_DIM);
    for &aa in &residues {
        let row = &embedding[aa * SEQUENCE_DIM..(aa + 1) * SEQUENCE_DIM];
        sequence.extend(row.iter().map(|v| v + rng.gen_range(-0.05..0.05)));
    }

    GraphSample {
        name: format!("SYN{index:04}_A"),
        num_nodes,
        feature_dim: AMINO_ACIDS,
        node_features,
        edge_src,
        edge_dst,
        sequence_len: num_nodes,
        sequence_dim: SEQUENCE_DIM,
        sequence,
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let root = PathBuf::from(args.get(1).map(String::as_str).unwrap_or("data/proteins"));
    let count: usize = match args.get(2) {
        Some(n) => n.parse()?,
        None => 200,
    };

    let mut rng = StdRng::seed_from_u64(42);
    let embedding: Vec<f32> = (0..AMINO_ACIDS * SEQUENCE_DIM)
        .map(|_| rng.gen_range(-1.0..1.0))
        .collect();

    let mut writer = ProteinGraphWriter::new(root.join("processed").join("proteins.parquet"));
    for i in 0..count {
        writer.record(make_protein(i, &embedding, &mut rng));
    }
    let path = writer.finish()?;

    println!("Wrote {count} synthetic proteins to {}", path.display());
    Ok(())
}
