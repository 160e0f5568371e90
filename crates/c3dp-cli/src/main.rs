mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use c3dp::{GraphModel, OptimizerKind, Pooling};
use config::CliOverrides;
use pipeline::{EvaluateArgs, SummaryArgs, TrainArgs};

/// c3dp: contrastive structure/sequence pretraining on protein graphs.
#[derive(Parser)]
#[command(name = "c3dp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training, evaluation and dataset inspection.
#[derive(Subcommand)]
enum Command {
    /// Train a model, keeping the best checkpoint by validation loss.
    Train {
        /// Path to training config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Dataset name ("proteins" reads Parquet, anything else a JSON directory).
        #[arg(long)]
        dataset_name: Option<String>,
        /// Dataset root directory.
        #[arg(long)]
        data_root_dir: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Percentage of graphs used for training.
        #[arg(long)]
        train_pct: Option<f64>,
        /// Percentage of graphs used for validation.
        #[arg(long)]
        val_pct: Option<f64>,
        /// Shuffle the training and validation loaders every epoch.
        #[arg(long)]
        shuffle: Option<bool>,
        /// Graph encoder: gcn or sage.
        #[arg(long)]
        graph_model: Option<GraphModel>,
        /// Node feature width. Inferred from the dataset when omitted.
        #[arg(long)]
        in_channels: Option<usize>,
        #[arg(long)]
        hidden_channels: Option<usize>,
        #[arg(long)]
        num_layers: Option<usize>,
        /// Width of the shared embedding space.
        #[arg(long)]
        out_features_projection: Option<usize>,
        /// Pooling for graph embeddings: mean, max or sum.
        #[arg(long)]
        graph_embeddings_pool: Option<Pooling>,
        /// Pooling for sequence embeddings: mean, max or sum.
        #[arg(long)]
        sequence_embeddings_pool: Option<Pooling>,
        /// Pairwise sigmoid loss instead of softmax InfoNCE.
        #[arg(long)]
        use_sigmoid: Option<bool>,
        /// Override the learning rate.
        #[arg(long)]
        lr: Option<f64>,
        #[arg(long)]
        weight_decay: Option<f64>,
        /// Optimizer: adam, adamw or sgd.
        #[arg(long)]
        optimizer: Option<OptimizerKind>,
        /// LR schedule with stock parameters: constant, step, exponential or cosine.
        #[arg(long)]
        lr_scheduler: Option<String>,
        /// Maximum number of epochs.
        #[arg(long)]
        n_epochs: Option<usize>,
        /// Epochs without improvement before stopping.
        #[arg(long)]
        patience: Option<usize>,
        /// Minimum decrease in validation loss that counts as an improvement.
        #[arg(long)]
        delta: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Directory that receives one subdirectory per run.
        #[arg(long)]
        experiment_dir: Option<PathBuf>,
        /// Run name. Defaults to the graph model name.
        #[arg(long)]
        run_name: Option<String>,
        /// Weights file to resume from. Its parameters and optimizer files must sit next to it.
        #[arg(long)]
        checkpoint_path: Option<PathBuf>,
    },
    /// Print statistics of a graph dataset.
    Summary {
        #[arg(long, default_value = "proteins")]
        dataset_name: String,
        #[arg(long, default_value = "data/proteins")]
        data_root_dir: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Score a saved checkpoint on the graphs held out from training.
    Evaluate {
        /// Weights file (`<model>-state-dict-val_loss=<loss>.ckpt`).
        #[arg(long)]
        checkpoint: PathBuf,
        #[arg(long, default_value = "proteins")]
        dataset_name: String,
        #[arg(long, default_value = "data/proteins")]
        data_root_dir: PathBuf,
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
        /// Must match the training run to reproduce its test split.
        #[arg(long, default_value_t = 70.0)]
        train_pct: f64,
        #[arg(long, default_value_t = 20.0)]
        val_pct: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            dataset_name,
            data_root_dir,
            batch_size,
            train_pct,
            val_pct,
            shuffle,
            graph_model,
            in_channels,
            hidden_channels,
            num_layers,
            out_features_projection,
            graph_embeddings_pool,
            sequence_embeddings_pool,
            use_sigmoid,
            lr,
            weight_decay,
            optimizer,
            lr_scheduler,
            n_epochs,
            patience,
            delta,
            seed,
            experiment_dir,
            run_name,
            checkpoint_path,
        } => pipeline::run_train(TrainArgs {
            config,
            overrides: CliOverrides {
                dataset_name,
                data_root_dir,
                batch_size,
                train_pct,
                val_pct,
                shuffle,
                graph_model,
                in_channels,
                hidden_channels,
                num_layers,
                out_features_projection,
                graph_embeddings_pool,
                sequence_embeddings_pool,
                use_sigmoid,
                lr,
                weight_decay,
                optimizer,
                lr_scheduler,
                n_epochs,
                patience,
                delta,
                seed,
                experiment_dir,
                run_name,
                checkpoint_path,
            },
        }),
        Command::Summary {
            dataset_name,
            data_root_dir,
            json,
        } => pipeline::run_summary(SummaryArgs {
            dataset_name,
            data_root_dir,
            json,
        }),
        Command::Evaluate {
            checkpoint,
            dataset_name,
            data_root_dir,
            batch_size,
            train_pct,
            val_pct,
            seed,
        } => pipeline::run_evaluate(EvaluateArgs {
            checkpoint,
            dataset_name,
            data_root_dir,
            batch_size,
            train_pct,
            val_pct,
            seed,
        }),
    }
}
