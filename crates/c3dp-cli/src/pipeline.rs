/// Training, evaluation and dataset inspection pipelines.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::Module;
use burn::tensor::backend::Backend;

use c3dp::{
    evaluate, generate_run_id, load_model, train, C3dpConfig, EvalSummary, ExperimentTracker,
    JsonlTracker, RunContext, RunLog, TrainingConfig, TrainingReport,
};
use graph_data::{
    load_dataset, read_dataset, DatasetKind, DatasetSummary, GraphLoader, LoadOptions,
};

use crate::config::{load_train_toml, resolve_settings, CliOverrides, TrainSettings, TrainToml};

type TrainBackend = Autodiff<NdArray<f32>>;
type EvalBackend = NdArray<f32>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the training config TOML file. Built-in defaults when absent.
    pub config: Option<PathBuf>,
    pub overrides: CliOverrides,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    pub dataset_name: String,
    pub data_root_dir: PathBuf,
    /// Print JSON instead of text.
    pub json: bool,
}

/// Arguments for the `evaluate` subcommand.
#[derive(Debug)]
pub struct EvaluateArgs {
    /// Weights file of a saved checkpoint.
    pub checkpoint: PathBuf,
    pub dataset_name: String,
    pub data_root_dir: PathBuf,
    pub batch_size: usize,
    /// Split used during training, so the held-out graphs match.
    pub train_pct: f64,
    pub val_pct: f64,
    pub seed: u64,
}

/// What a finished training run left behind.
#[derive(Debug)]
pub struct TrainOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub report: TrainingReport,
}

/// Resolve settings and train, printing a summary at the end.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    let toml = match &args.config {
        Some(path) => load_train_toml(path)?,
        None => TrainToml::default(),
    };
    let settings = resolve_settings(&toml, &args.overrides)?;
    let outcome = train_with_settings(&settings)?;
    let report = &outcome.report;

    println!("\n--- Training Summary ---");
    println!("Run: {} ({})", outcome.run_id, outcome.run_dir.display());
    println!("Epochs run: {}/{}", report.epochs_run, settings.n_epochs);
    if let Some(epoch) = report.stopped_at {
        println!("Early stopped at epoch: {epoch}");
    }
    if let Some(last) = report.history.last() {
        println!("Last epoch: {last}");
    }
    match report.best_val_loss {
        Some(loss) => println!("Best val_loss: {loss:.6}"),
        None => println!("Best val_loss: n/a"),
    }
    if let Some(paths) = &report.best_checkpoint {
        println!("Best checkpoint: {}", paths.weights.display());
    }
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

/// Run one experiment from fully resolved settings.
///
/// The tracker is finished whether or not training succeeds, so
/// `metrics.jsonl` always ends with a `finish` event.
pub fn train_with_settings(settings: &TrainSettings) -> anyhow::Result<TrainOutcome> {
    TrainBackend::seed(settings.seed);

    let run_name = settings
        .run_name
        .clone()
        .unwrap_or_else(|| settings.graph_model.name().to_string());
    let tracker = JsonlTracker::init(
        &settings.experiment_dir,
        generate_run_id(&mut rand::thread_rng()),
        run_name,
    )?;
    let run_dir = tracker.run_dir().to_path_buf();
    let mut ctx = RunContext {
        log: RunLog::open(run_dir.join("trainlog.txt"))?,
        run_dir: run_dir.clone(),
        tracker: Box::new(tracker),
        seed: settings.seed,
    };

    let result = run_experiment(settings, &mut ctx);
    if let Err(e) = &result {
        if let Err(log_err) = ctx.log(&format!("Training failed: {e:#}")) {
            tracing::warn!(error = %log_err, "Could not write the failure to trainlog.txt");
        }
    }
    let finished = ctx.tracker.finish();
    let report = result?;
    finished?;

    Ok(TrainOutcome {
        run_id: ctx.tracker.run_id().to_string(),
        run_dir,
        report,
    })
}

fn run_experiment(settings: &TrainSettings, ctx: &mut RunContext) -> anyhow::Result<TrainingReport> {
    let device = Default::default();
    let run_name = ctx.tracker.run_name().to_string();
    ctx.tracker.config(&serde_json::to_value(settings)?)?;

    ctx.log(&format!("Seed everything to {}", settings.seed))?;
    ctx.log(&format!(
        "Launching training for experiment {run_name} with id {} in {}",
        ctx.tracker.run_id(),
        ctx.run_dir.display()
    ))?;

    let options = LoadOptions {
        batch_size: settings.batch_size,
        train_pct: settings.training_split_percentage,
        val_pct: settings.val_split_percentage,
        shuffle: settings.shuffle,
        seed: settings.seed,
    };
    let kind = DatasetKind::from_name(&settings.dataset_name);
    let mut loaded = load_dataset(kind, &settings.data_root_dir, &options)?;
    ctx.log(&format!(
        "Loaded dataset {} from {}. Batch size: {}. Dataset size: {} (train {}, val {}, test {})",
        settings.dataset_name,
        settings.data_root_dir.display(),
        settings.batch_size,
        loaded.dataset.len(),
        loaded.splits.train,
        loaded.splits.val,
        loaded.splits.test,
    ))?;

    let first = loaded
        .dataset
        .first()
        .ok_or_else(|| anyhow::anyhow!("Dataset {} is empty", settings.data_root_dir.display()))?;
    let in_channels = settings.in_channels.unwrap_or(first.feature_dim);
    if in_channels != first.feature_dim {
        anyhow::bail!(
            "in_channels = {in_channels} but the dataset has {} node features",
            first.feature_dim
        );
    }
    let sequence_dim = first.sequence_dim;

    let (model, model_config) = match &settings.checkpoint_path {
        Some(path) => {
            ctx.log(&format!("Loading model from checkpoint: {}", path.display()))?;
            let (model, config) = load_model::<TrainBackend>(path, &device)?;
            if config.in_channels != in_channels || config.sequence_dim != sequence_dim {
                anyhow::bail!(
                    "Checkpoint expects {} node features and sequence dim {}, dataset has {in_channels} and {sequence_dim}",
                    config.in_channels,
                    config.sequence_dim
                );
            }
            (model, config)
        }
        None => {
            let config = model_config_from(settings, in_channels, sequence_dim);
            (config.init::<TrainBackend>(&device), config)
        }
    };
    ctx.log(&format!(
        "Loading model {}. Graph Model: {} - In channels: {} - Hidden channels: {} - Num layers: {}",
        run_name,
        model_config.graph_model,
        model_config.in_channels,
        model_config.hidden_channels,
        model_config.num_layers,
    ))?;
    tracing::info!(params = model.num_params(), "Model initialized");

    let training_config = TrainingConfig::new()
        .with_lr(settings.lr)
        .with_weight_decay(settings.weight_decay)
        .with_optimizer(settings.optimizer)
        .with_lr_scheduler(settings.lr_scheduler.clone())
        .with_n_epochs(settings.n_epochs)
        .with_patience(settings.early_stopping_patience)
        .with_delta(settings.early_stopping_delta);

    let (_, report) = train(
        &training_config,
        &model_config,
        model,
        &mut loaded.train,
        &mut loaded.val,
        ctx,
        &device,
        settings.checkpoint_path.as_deref(),
    )?;
    Ok(report)
}

fn model_config_from(settings: &TrainSettings, in_channels: usize, sequence_dim: usize) -> C3dpConfig {
    C3dpConfig::new(in_channels, sequence_dim)
        .with_graph_model(settings.graph_model)
        .with_hidden_channels(settings.hidden_channels)
        .with_num_layers(settings.num_layers)
        .with_out_features_projection(settings.out_features_projection)
        .with_graph_embeddings_pool(settings.graph_embeddings_pool)
        .with_sequence_embeddings_pool(settings.sequence_embeddings_pool)
        .with_use_sigmoid(settings.use_sigmoid)
        .with_dropout(settings.dropout)
        .with_init_temperature(settings.init_temperature)
}

/// Print statistics of a dataset.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let kind = DatasetKind::from_name(&args.dataset_name);
    let samples = read_dataset(kind, &args.data_root_dir)?;
    let summary = DatasetSummary::from_samples(&samples);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("--- Dataset Summary ---");
        println!("Dataset: {} ({})", args.dataset_name, args.data_root_dir.display());
        println!("{summary}");
    }
    Ok(())
}

/// Score a saved checkpoint on the graphs held out from training.
pub fn run_evaluate(args: EvaluateArgs) -> anyhow::Result<()> {
    let summary = evaluate_checkpoint(&args)?;

    println!("--- Evaluation Summary ---");
    println!("Checkpoint: {}", args.checkpoint.display());
    println!("Graphs: {}", summary.graphs);
    println!("Loss: {:.6}", summary.loss);
    println!("Accuracy: {:.4}", summary.accuracy);
    Ok(())
}

/// Evaluate the test split, or the whole dataset when the split leaves no
/// test graphs.
pub fn evaluate_checkpoint(args: &EvaluateArgs) -> anyhow::Result<EvalSummary> {
    if !is_weights_file(&args.checkpoint) {
        tracing::warn!(path = %args.checkpoint.display(), "Not named like a weights file");
    }
    let device = Default::default();
    let (model, config) = load_model::<EvalBackend>(&args.checkpoint, &device)?;

    let options = LoadOptions {
        batch_size: args.batch_size,
        train_pct: args.train_pct,
        val_pct: args.val_pct,
        shuffle: false,
        seed: args.seed,
    };
    let kind = DatasetKind::from_name(&args.dataset_name);
    let loaded = load_dataset(kind, &args.data_root_dir, &options)?;
    if let Some(first) = loaded.dataset.first() {
        if first.feature_dim != config.in_channels {
            anyhow::bail!(
                "Checkpoint expects {} node features, dataset has {}",
                config.in_channels,
                first.feature_dim
            );
        }
    }

    let mut loader = if loaded.test.is_empty() {
        tracing::warn!("Test split is empty, evaluating on the whole dataset");
        GraphLoader::new(
            loaded.dataset.clone(),
            (0..loaded.dataset.len()).collect(),
            args.batch_size,
            false,
            args.seed,
        )
    } else {
        loaded.test
    };
    if loader.is_empty() {
        anyhow::bail!("Nothing to evaluate in {}", args.data_root_dir.display());
    }

    evaluate(&model, &mut loader, &device, "Test", &mut |_, _| Ok(()))
}

/// True when `path` looks like a weights file of a checkpoint family.
pub fn is_weights_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("-state-dict-val_loss="))
}
