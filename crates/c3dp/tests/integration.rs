//! Integration tests for the c3dp crate.
//!
//! These exercise cross-module paths: dataset on disk -> loaders -> model ->
//! training loop -> checkpoint files -> reload and evaluate. All use the
//! NdArray backend and small synthetic graphs.

use std::path::Path;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use tempfile::TempDir;

use c3dp::{
    evaluate, load_model, train, C3dpConfig, ExperimentTracker, GraphModel, JsonlTracker,
    LrSchedule, OptimizerKind, Pooling, RunContext, RunLog, TrainingConfig,
};
use graph_data::{load_dataset, write_graph_dir, DatasetKind, GraphSample, LoadOptions, LoadedDataset};

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

/// Ring graph whose sequence is a noisy copy of its node features, so the
/// pairing is learnable.
fn make_sample(i: usize) -> GraphSample {
    let nodes = 4 + i % 3;
    let dim = 3;
    let node_features: Vec<f32> = (0..nodes * dim)
        .map(|v| (((v + 1) * (i + 2)) as f32 * 0.37).sin())
        .collect();
    let mut edge_src = Vec::new();
    let mut edge_dst = Vec::new();
    for n in 0..nodes as u32 {
        let next = (n + 1) % nodes as u32;
        edge_src.extend([n, next]);
        edge_dst.extend([next, n]);
    }
    let sequence: Vec<f32> = node_features.iter().map(|v| v * 0.9 + 0.05).collect();
    GraphSample {
        name: format!("prot{i:02}"),
        num_nodes: nodes,
        feature_dim: dim,
        node_features,
        edge_src,
        edge_dst,
        sequence_len: nodes,
        sequence_dim: dim,
        sequence,
    }
}

fn write_dataset(root: &Path, n: usize) {
    let samples: Vec<GraphSample> = (0..n).map(make_sample).collect();
    write_graph_dir(&samples, root).unwrap();
}

fn load(root: &Path) -> LoadedDataset {
    let options = LoadOptions {
        batch_size: 4,
        train_pct: 60.0,
        val_pct: 40.0,
        shuffle: false,
        seed: 5,
    };
    load_dataset(DatasetKind::Directory, root, &options).unwrap()
}

fn context(experiment_dir: &Path, run_id: &str) -> RunContext {
    let tracker = JsonlTracker::init(experiment_dir, run_id.to_string(), "gcn".to_string()).unwrap();
    let run_dir = tracker.run_dir().to_path_buf();
    RunContext {
        log: RunLog::open(run_dir.join("trainlog.txt")).unwrap(),
        run_dir,
        tracker: Box::new(tracker),
        seed: 5,
    }
}

fn model_config() -> C3dpConfig {
    C3dpConfig::new(3, 3)
        .with_hidden_channels(8)
        .with_num_layers(2)
        .with_out_features_projection(8)
        .with_dropout(0.0)
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Full run: train a few epochs, then check the run directory and reload the
/// best checkpoint.
#[test]
fn test_train_writes_run_artifacts() {
    let data_dir = TempDir::new().unwrap();
    let exp_dir = TempDir::new().unwrap();
    write_dataset(data_dir.path(), 10);
    let mut loaded = load(data_dir.path());
    assert_eq!(loaded.splits.train, 6);
    assert_eq!(loaded.splits.val, 4);

    let device = Default::default();
    let model_config = model_config();
    let model = model_config.init::<TestAutodiffBackend>(&device);
    let config = TrainingConfig::new().with_n_epochs(3).with_patience(5).with_lr(5e-3);

    let mut ctx = context(exp_dir.path(), "run00001");
    let (_model, report) = train(
        &config,
        &model_config,
        model,
        &mut loaded.train,
        &mut loaded.val,
        &mut ctx,
        &device,
        None,
    )
    .unwrap();
    ctx.tracker.finish().unwrap();

    assert_eq!(report.epochs_run, 3);
    assert_eq!(report.stopped_at, None);
    assert_eq!(report.history.len(), 3);
    let best = report.best_checkpoint.clone().expect("at least one checkpoint");
    assert_eq!(report.best_val_loss, report.history.best().map(|m| m.val_loss));

    // Exactly one checkpoint family plus the log and metrics files.
    let names = file_names(&ctx.run_dir);
    assert_eq!(names.len(), 5, "{names:?}");
    assert!(names.contains(&"gcn-parameters.ckpt".to_string()));
    assert!(names.contains(&"optimizer-state-dict.ckpt".to_string()));
    assert!(names.contains(&"trainlog.txt".to_string()));
    assert!(names.contains(&"metrics.jsonl".to_string()));
    assert!(names.iter().any(|n| n.starts_with("gcn-state-dict-val_loss=")));

    let log = std::fs::read_to_string(ctx.run_dir.join("trainlog.txt")).unwrap();
    assert!(log.contains("Epoch 1 out of 3 - train_loss:"), "{log}");
    assert!(log.contains("Epoch 3 out of 3"), "{log}");

    let metrics = std::fs::read_to_string(ctx.run_dir.join("metrics.jsonl")).unwrap();
    // 2 train batches + 1 val batch + 1 epoch summary per epoch.
    let logged = metrics.lines().filter(|l| l.contains("\"event\":\"log\"")).count();
    assert_eq!(logged, 3 * 4);

    // Reload the best weights and reproduce its validation loss.
    let (reloaded, reloaded_config) = load_model::<TestBackend>(&best.weights, &device).unwrap();
    assert_eq!(reloaded_config.hidden_channels, 8);
    let summary = evaluate(&reloaded, &mut loaded.val, &device, "Validation", &mut |_, _| Ok(())).unwrap();
    let best_loss = report.best_val_loss.unwrap();
    assert!(
        (summary.loss - best_loss).abs() < 1e-4,
        "reloaded loss {} vs best {best_loss}",
        summary.loss
    );
}

/// A frozen model (lr = 0) never improves after the first epoch, so early
/// stopping fires once patience is exhausted.
#[test]
fn test_early_stopping_halts_training() {
    let data_dir = TempDir::new().unwrap();
    let exp_dir = TempDir::new().unwrap();
    write_dataset(data_dir.path(), 10);
    let mut loaded = load(data_dir.path());

    let device = Default::default();
    let model_config = model_config().with_graph_model(GraphModel::Sage);
    let model = model_config.init::<TestAutodiffBackend>(&device);
    let config = TrainingConfig::new()
        .with_n_epochs(20)
        .with_patience(2)
        .with_lr(0.0)
        .with_optimizer(OptimizerKind::Sgd);

    let mut ctx = context(exp_dir.path(), "run00002");
    let (_, report) = train(
        &config,
        &model_config,
        model,
        &mut loaded.train,
        &mut loaded.val,
        &mut ctx,
        &device,
        None,
    )
    .unwrap();

    assert_eq!(report.stopped_at, Some(3));
    assert_eq!(report.epochs_run, 3);
    let log = std::fs::read_to_string(ctx.run_dir.join("trainlog.txt")).unwrap();
    assert!(log.contains("EarlyStopping counter: 2 out of 2"), "{log}");
    assert!(log.contains("Stopping training at Epoch: 3"), "{log}");
    assert!(ctx.run_dir.join("sage-parameters.ckpt").is_file());
}

/// Resuming restores the model from its parameters file and the optimizer
/// state from the sibling file.
#[test]
fn test_resume_from_checkpoint() {
    let data_dir = TempDir::new().unwrap();
    let exp_dir = TempDir::new().unwrap();
    write_dataset(data_dir.path(), 10);

    let device = Default::default();
    let model_config = model_config()
        .with_graph_embeddings_pool(Pooling::Max)
        .with_use_sigmoid(true);
    let config = TrainingConfig::new()
        .with_n_epochs(1)
        .with_optimizer(OptimizerKind::AdamW)
        .with_weight_decay(0.01);

    let mut loaded = load(data_dir.path());
    let mut ctx = context(exp_dir.path(), "first000");
    let model = model_config.init::<TestAutodiffBackend>(&device);
    let (_, first) = train(&config, &model_config, model, &mut loaded.train, &mut loaded.val, &mut ctx, &device, None)
        .unwrap();
    let weights = first.best_checkpoint.unwrap().weights;

    let (model, restored_config) = load_model::<TestAutodiffBackend>(&weights, &device).unwrap();
    assert_eq!(restored_config.graph_embeddings_pool, Pooling::Max);
    assert!(restored_config.use_sigmoid);

    let mut loaded = load(data_dir.path());
    let mut ctx = context(exp_dir.path(), "second00");
    let (model, second) = train(
        &config,
        &restored_config,
        model,
        &mut loaded.train,
        &mut loaded.val,
        &mut ctx,
        &device,
        Some(&weights),
    )
    .unwrap();
    assert_eq!(second.epochs_run, 1);
    assert!(model.valid().temperature().is_finite());

    let log = std::fs::read_to_string(ctx.run_dir.join("trainlog.txt")).unwrap();
    assert!(log.contains("Loading optimizer state_dict from checkpoint"), "{log}");
}

#[test]
fn test_resume_with_missing_optimizer_fails() {
    let data_dir = TempDir::new().unwrap();
    let exp_dir = TempDir::new().unwrap();
    write_dataset(data_dir.path(), 10);
    let mut loaded = load(data_dir.path());

    let device = Default::default();
    let model_config = model_config();
    let config = TrainingConfig::new().with_n_epochs(1);
    let mut ctx = context(exp_dir.path(), "first001");
    let model = model_config.init::<TestAutodiffBackend>(&device);
    let (_, report) = train(&config, &model_config, model, &mut loaded.train, &mut loaded.val, &mut ctx, &device, None)
        .unwrap();
    let paths = report.best_checkpoint.unwrap();
    std::fs::remove_file(&paths.optimizer).unwrap();

    let (model, _) = load_model::<TestAutodiffBackend>(&paths.weights, &device).unwrap();
    let mut ctx = context(exp_dir.path(), "second01");
    let err = train(
        &config,
        &model_config,
        model,
        &mut loaded.train,
        &mut loaded.val,
        &mut ctx,
        &device,
        Some(&paths.weights),
    )
    .unwrap_err();
    assert!(err.to_string().contains("optimizer-state-dict.ckpt"), "{err}");
}

#[test]
fn test_empty_validation_split_is_rejected() {
    let data_dir = TempDir::new().unwrap();
    let exp_dir = TempDir::new().unwrap();
    write_dataset(data_dir.path(), 6);
    let options = LoadOptions {
        batch_size: 2,
        train_pct: 100.0,
        val_pct: 0.0,
        shuffle: true,
        seed: 1,
    };
    let mut loaded = load_dataset(DatasetKind::Directory, data_dir.path(), &options).unwrap();

    let device = Default::default();
    let model_config = model_config();
    let model = model_config.init::<TestAutodiffBackend>(&device);
    let mut ctx = context(exp_dir.path(), "emptyval");
    let err = train(
        &TrainingConfig::new(),
        &model_config,
        model,
        &mut loaded.train,
        &mut loaded.val,
        &mut ctx,
        &device,
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("Validation split is empty"), "{err}");
}

#[test]
fn test_lr_schedule_from_toml() {
    #[derive(serde::Deserialize)]
    struct Section {
        lr_scheduler: LrSchedule,
    }
    let raw = r#"
        [lr_scheduler]
        type = "exponential"
        gamma = 0.5
    "#;
    let section: Section = toml::from_str(raw).unwrap();
    assert_eq!(section.lr_scheduler, LrSchedule::Exponential { gamma: 0.5 });
    assert!((section.lr_scheduler.lr_at(1.0, 2) - 0.25).abs() < 1e-12);
}
