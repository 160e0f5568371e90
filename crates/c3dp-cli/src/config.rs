//! TOML config loading for the training CLI.
//!
//! Deserializes `configs/train.toml`, which has `[model]`, `[training]` and
//! `[data]` sections, then merges it with CLI overrides into [`TrainSettings`].
//! Priority chain: built-in defaults < TOML values < CLI flags.

use std::path::{Path, PathBuf};

use c3dp::{GraphModel, LrSchedule, OptimizerKind, Pooling};
use serde::{Deserialize, Serialize};

/// Top-level structure matching `configs/train.toml`. Every section and
/// field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct TrainToml {
    #[serde(default)]
    pub model: ModelOverrides,
    #[serde(default)]
    pub training: TrainingOverrides,
    #[serde(default)]
    pub data: DataOverrides,
}

/// `[model]` section.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ModelOverrides {
    pub graph_model: Option<GraphModel>,
    /// Node feature width; inferred from the dataset when absent.
    pub in_channels: Option<usize>,
    pub hidden_channels: Option<usize>,
    pub num_layers: Option<usize>,
    pub out_features_projection: Option<usize>,
    pub graph_embeddings_pool: Option<Pooling>,
    #[serde(alias = "dna_embeddings_pool")]
    pub sequence_embeddings_pool: Option<Pooling>,
    pub use_sigmoid: Option<bool>,
    pub dropout: Option<f64>,
    pub init_temperature: Option<f64>,
}

/// `[training]` section.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TrainingOverrides {
    #[serde(alias = "learning_rate")]
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub optimizer: Option<OptimizerKind>,
    pub lr_scheduler: Option<LrSchedule>,
    pub n_epochs: Option<usize>,
    #[serde(alias = "patience")]
    pub early_stopping_patience: Option<usize>,
    #[serde(alias = "delta")]
    pub early_stopping_delta: Option<f64>,
    pub seed: Option<u64>,
    pub experiment_dir: Option<PathBuf>,
    pub run_name: Option<String>,
    /// Weights file to resume from.
    pub checkpoint_path: Option<PathBuf>,
}

/// `[data]` section.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DataOverrides {
    pub dataset_name: Option<String>,
    pub data_root_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    #[serde(alias = "train_pct")]
    pub training_split_percentage: Option<f64>,
    #[serde(alias = "val_pct")]
    pub val_split_percentage: Option<f64>,
    pub shuffle: Option<bool>,
}

/// Fully resolved settings for one training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainSettings {
    // [data]
    pub dataset_name: String,
    pub data_root_dir: PathBuf,
    pub batch_size: usize,
    pub training_split_percentage: f64,
    pub val_split_percentage: f64,
    pub shuffle: bool,
    // [model]
    pub graph_model: GraphModel,
    pub in_channels: Option<usize>,
    pub hidden_channels: usize,
    pub num_layers: usize,
    pub out_features_projection: usize,
    pub graph_embeddings_pool: Pooling,
    pub sequence_embeddings_pool: Pooling,
    pub use_sigmoid: bool,
    pub dropout: f64,
    pub init_temperature: f64,
    // [training]
    pub lr: f64,
    pub weight_decay: f64,
    pub optimizer: OptimizerKind,
    pub lr_scheduler: LrSchedule,
    pub n_epochs: usize,
    pub early_stopping_patience: usize,
    pub early_stopping_delta: f64,
    pub seed: u64,
    pub experiment_dir: PathBuf,
    pub run_name: Option<String>,
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            dataset_name: "proteins".to_string(),
            data_root_dir: PathBuf::from("data/proteins"),
            batch_size: 32,
            training_split_percentage: 70.0,
            val_split_percentage: 20.0,
            shuffle: true,
            graph_model: GraphModel::Gcn,
            in_channels: None,
            hidden_channels: 128,
            num_layers: 3,
            out_features_projection: 128,
            graph_embeddings_pool: Pooling::Mean,
            sequence_embeddings_pool: Pooling::Mean,
            use_sigmoid: false,
            dropout: 0.1,
            init_temperature: 0.07,
            lr: 1e-3,
            weight_decay: 0.0,
            optimizer: OptimizerKind::Adam,
            lr_scheduler: LrSchedule::Constant,
            n_epochs: 100,
            early_stopping_patience: 10,
            early_stopping_delta: 0.0,
            seed: 42,
            experiment_dir: PathBuf::from("experiments"),
            run_name: None,
            checkpoint_path: None,
        }
    }
}

/// CLI flags that override config values. `None` leaves the value alone.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub dataset_name: Option<String>,
    pub data_root_dir: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub train_pct: Option<f64>,
    pub val_pct: Option<f64>,
    pub shuffle: Option<bool>,
    pub graph_model: Option<GraphModel>,
    pub in_channels: Option<usize>,
    pub hidden_channels: Option<usize>,
    pub num_layers: Option<usize>,
    pub out_features_projection: Option<usize>,
    pub graph_embeddings_pool: Option<Pooling>,
    pub sequence_embeddings_pool: Option<Pooling>,
    pub use_sigmoid: Option<bool>,
    pub lr: Option<f64>,
    pub weight_decay: Option<f64>,
    pub optimizer: Option<OptimizerKind>,
    /// Scheduler by name, with stock parameters.
    pub lr_scheduler: Option<String>,
    pub n_epochs: Option<usize>,
    pub patience: Option<usize>,
    pub delta: Option<f64>,
    pub seed: Option<u64>,
    pub experiment_dir: Option<PathBuf>,
    pub run_name: Option<String>,
    pub checkpoint_path: Option<PathBuf>,
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

fn apply<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

/// Merge defaults, TOML values and CLI flags.
pub fn resolve_settings(toml: &TrainToml, cli: &CliOverrides) -> anyhow::Result<TrainSettings> {
    let mut s = TrainSettings::default();

    // TOML
    let d = toml.data.clone();
    apply(&mut s.dataset_name, d.dataset_name);
    apply(&mut s.data_root_dir, d.data_root_dir);
    apply(&mut s.batch_size, d.batch_size);
    apply(&mut s.training_split_percentage, d.training_split_percentage);
    apply(&mut s.val_split_percentage, d.val_split_percentage);
    apply(&mut s.shuffle, d.shuffle);

    let m = toml.model.clone();
    apply(&mut s.graph_model, m.graph_model);
    s.in_channels = m.in_channels.or(s.in_channels);
    apply(&mut s.hidden_channels, m.hidden_channels);
    apply(&mut s.num_layers, m.num_layers);
    apply(&mut s.out_features_projection, m.out_features_projection);
    apply(&mut s.graph_embeddings_pool, m.graph_embeddings_pool);
    apply(&mut s.sequence_embeddings_pool, m.sequence_embeddings_pool);
    apply(&mut s.use_sigmoid, m.use_sigmoid);
    apply(&mut s.dropout, m.dropout);
    apply(&mut s.init_temperature, m.init_temperature);

    let t = toml.training.clone();
    apply(&mut s.lr, t.lr);
    apply(&mut s.weight_decay, t.weight_decay);
    apply(&mut s.optimizer, t.optimizer);
    apply(&mut s.lr_scheduler, t.lr_scheduler);
    apply(&mut s.n_epochs, t.n_epochs);
    apply(&mut s.early_stopping_patience, t.early_stopping_patience);
    apply(&mut s.early_stopping_delta, t.early_stopping_delta);
    apply(&mut s.seed, t.seed);
    apply(&mut s.experiment_dir, t.experiment_dir);
    s.run_name = t.run_name.or(s.run_name);
    s.checkpoint_path = t.checkpoint_path.or(s.checkpoint_path);

    // CLI
    let c = cli.clone();
    apply(&mut s.dataset_name, c.dataset_name);
    apply(&mut s.data_root_dir, c.data_root_dir);
    apply(&mut s.batch_size, c.batch_size);
    apply(&mut s.training_split_percentage, c.train_pct);
    apply(&mut s.val_split_percentage, c.val_pct);
    apply(&mut s.shuffle, c.shuffle);
    apply(&mut s.graph_model, c.graph_model);
    s.in_channels = c.in_channels.or(s.in_channels);
    apply(&mut s.hidden_channels, c.hidden_channels);
    apply(&mut s.num_layers, c.num_layers);
    apply(&mut s.out_features_projection, c.out_features_projection);
    apply(&mut s.graph_embeddings_pool, c.graph_embeddings_pool);
    apply(&mut s.sequence_embeddings_pool, c.sequence_embeddings_pool);
    apply(&mut s.use_sigmoid, c.use_sigmoid);
    apply(&mut s.lr, c.lr);
    apply(&mut s.weight_decay, c.weight_decay);
    apply(&mut s.optimizer, c.optimizer);
    apply(&mut s.n_epochs, c.n_epochs);
    apply(&mut s.early_stopping_patience, c.patience);
    apply(&mut s.early_stopping_delta, c.delta);
    apply(&mut s.seed, c.seed);
    apply(&mut s.experiment_dir, c.experiment_dir);
    s.run_name = c.run_name.or(s.run_name);
    s.checkpoint_path = c.checkpoint_path.or(s.checkpoint_path);
    if let Some(name) = &c.lr_scheduler {
        s.lr_scheduler = LrSchedule::from_name(name, s.n_epochs)?;
    }

    if s.batch_size == 0 {
        anyhow::bail!("batch_size must be > 0");
    }
    Ok(s)
}
