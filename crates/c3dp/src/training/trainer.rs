//! Epoch training loop.
//!
//! Each epoch runs every training batch through forward, backward and an
//! optimizer step, then a no-grad validation pass. The mean validation loss
//! drives [`EarlyStopping`], which keeps the single best checkpoint on disk.
//! The learning-rate schedule advances once per completed epoch.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use graph_data::GraphLoader;
use serde::{Deserialize, Serialize};

use crate::inference::{batch_progress, evaluate};
use crate::model::bridge::{batch_to_tensors, tensor_to_f64};
use crate::model::{C3dpConfig, C3dpNet};
use crate::training::checkpoint::{load_optimizer, CheckpointPaths, TrainingSnapshot};
use crate::training::early_stopping::{EarlyStopping, MonitorStep};
use crate::training::metrics::{logits_accuracy, EpochMetrics, MetricsHistory, PassAccumulator};
use crate::training::run_log::RunContext;
use crate::training::schedule::{LrSchedule, LrScheduler};
use crate::training::tracker::ExperimentTracker;

/// Which burn optimizer updates the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adam => write!(f, "adam"),
            Self::AdamW => write!(f, "adamw"),
            Self::Sgd => write!(f, "sgd"),
        }
    }
}

impl std::str::FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            "sgd" => Ok(Self::Sgd),
            other => Err(format!("unknown optimizer '{other}' (expected adam, adamw or sgd)")),
        }
    }
}

/// Configuration for the training loop.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Base learning rate.
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 0.0)]
    pub weight_decay: f64,
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    #[config(default = "LrSchedule::Constant")]
    pub lr_scheduler: LrSchedule,
    /// Maximum number of epochs.
    #[config(default = 100)]
    pub n_epochs: usize,
    /// Epochs without improvement before stopping.
    #[config(default = 10)]
    pub patience: usize,
    /// Minimum decrease in validation loss that counts as an improvement.
    #[config(default = 0.0)]
    pub delta: f64,
    /// Extension shared by the three checkpoint files.
    #[config(default = "String::from(\".ckpt\")")]
    pub checkpoint_extension: String,
}

impl TrainingConfig {
    /// Base path of the checkpoint family inside `run_dir`, e.g. `<run_dir>/gcn.ckpt`.
    pub fn checkpoint_base(&self, run_dir: &Path, model_name: &str) -> PathBuf {
        run_dir.join(format!("{model_name}{}", self.checkpoint_extension))
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Epochs fully completed.
    pub epochs_run: usize,
    /// 1-based epoch at which early stopping fired.
    pub stopped_at: Option<usize>,
    /// Best validation loss checkpointed.
    pub best_val_loss: Option<f64>,
    pub best_checkpoint: Option<CheckpointPaths>,
    pub history: MetricsHistory,
}

/// Train `model` on `train_loader`, validating on `val_loader` after every epoch.
///
/// With `resume_from` set (a weights file), optimizer state is restored from
/// the sibling `optimizer-state-dict` file before the first step.
///
/// # Returns
/// The model after the last epoch (the best one is on disk) and a report.
#[allow(clippy::too_many_arguments)]
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    model_config: &C3dpConfig,
    model: C3dpNet<B>,
    train_loader: &mut GraphLoader,
    val_loader: &mut GraphLoader,
    ctx: &mut RunContext,
    device: &B::Device,
    resume_from: Option<&Path>,
) -> anyhow::Result<(C3dpNet<B>, TrainingReport)> {
    if train_loader.is_empty() {
        anyhow::bail!("Training split is empty; raise the train percentage");
    }
    if val_loader.is_empty() {
        anyhow::bail!("Validation split is empty; raise the validation percentage");
    }

    tracing::info!(
        optimizer = %config.optimizer,
        lr = config.lr,
        weight_decay = config.weight_decay,
        scheduler = %config.lr_scheduler,
        n_epochs = config.n_epochs,
        patience = config.patience,
        seed = ctx.seed,
        "Starting training"
    );

    let decay = (config.weight_decay > 0.0).then(|| WeightDecayConfig::new(config.weight_decay as f32));
    match config.optimizer {
        OptimizerKind::Adam => {
            let optimizer = AdamConfig::new()
                .with_weight_decay(decay)
                .init::<B, C3dpNet<B>>();
            run_epochs(config, model_config, model, optimizer, train_loader, val_loader, ctx, device, resume_from)
        }
        OptimizerKind::AdamW => {
            let optimizer = AdamWConfig::new()
                .with_weight_decay(config.weight_decay as f32)
                .init::<B, C3dpNet<B>>();
            run_epochs(config, model_config, model, optimizer, train_loader, val_loader, ctx, device, resume_from)
        }
        OptimizerKind::Sgd => {
            let optimizer = SgdConfig::new()
                .with_weight_decay(decay)
                .init::<B, C3dpNet<B>>();
            run_epochs(config, model_config, model, optimizer, train_loader, val_loader, ctx, device, resume_from)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_epochs<B, O>(
    config: &TrainingConfig,
    model_config: &C3dpConfig,
    mut model: C3dpNet<B>,
    mut optimizer: O,
    train_loader: &mut GraphLoader,
    val_loader: &mut GraphLoader,
    ctx: &mut RunContext,
    device: &B::Device,
    resume_from: Option<&Path>,
) -> anyhow::Result<(C3dpNet<B>, TrainingReport)>
where
    B: AutodiffBackend,
    O: Optimizer<C3dpNet<B>, B>,
{
    if let Some(weights) = resume_from {
        ctx.log(&format!(
            "Loading optimizer state_dict from checkpoint: {}",
            weights.display()
        ))?;
        optimizer = load_optimizer(optimizer, weights, device)?;
    }

    let n_epochs = config.n_epochs;
    let base = config.checkpoint_base(&ctx.run_dir, model_config.graph_model.name());
    let mut monitor = EarlyStopping::new(base, config.patience, config.delta);
    let mut scheduler = LrScheduler::new(config.lr, config.lr_scheduler.clone());
    let mut history = MetricsHistory::new();
    let mut stopped_at = None;
    let mut epochs_run = 0;
    let train_start = Instant::now();

    ctx.log("Starting training...")?;

    for epoch in 0..n_epochs {
        let lr = scheduler.lr();

        let pb = batch_progress(train_loader.len(), &format!("Epoch {}/{n_epochs}", epoch + 1));
        let mut train_pass = PassAccumulator::new();
        for data in train_loader.batches() {
            let batch = batch_to_tensors::<B>(&data, device);
            let output = model.forward(&batch);

            let loss_val = tensor_to_f64(output.loss.clone());
            let acc = logits_accuracy(output.logits)?;

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optimizer.step(lr, model, grads);

            train_pass.update(loss_val, acc);
            ctx.track(&[("train_step_loss", loss_val), ("acc_step", acc)])?;
            pb.set_message(format!("loss={loss_val:.4} acc={acc:.3}"));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let valid_model = model.valid();
        let tracker = &mut ctx.tracker;
        let val = evaluate(&valid_model, val_loader, device, "Validation", &mut |loss, acc| {
            tracker.log(&[("val_loss_step", loss), ("val_acc_step", acc)])
        })?;

        let metrics = EpochMetrics {
            epoch: epoch + 1,
            train_loss: train_pass.mean_loss(),
            train_acc: train_pass.accuracy(),
            val_loss: val.loss,
            val_acc: val.accuracy,
            lr,
        };
        ctx.log(&format!("Epoch {} out of {n_epochs} - {metrics}", epoch + 1))?;
        ctx.track(&[
            ("train_loss", metrics.train_loss),
            ("train_acc", metrics.train_acc),
            ("val_loss", metrics.val_loss),
            ("val_acc", metrics.val_acc),
            ("lr", lr),
            ("epoch", (epoch + 1) as f64),
        ])?;
        history.push(metrics);
        epochs_run = epoch + 1;

        let snapshot = TrainingSnapshot {
            model: &model,
            config: model_config,
            optimizer: &optimizer,
        };
        match monitor.step(val.loss, &snapshot)? {
            MonitorStep::Improved {
                previous,
                val_loss,
                paths,
            } => {
                let previous = previous.map_or_else(|| "inf".to_string(), |p| format!("{p:.6}"));
                ctx.log(&format!(
                    "Validation loss decreased ({previous} --> {val_loss:.6}).  Saving model to {}",
                    paths.weights.display()
                ))?;
            }
            MonitorStep::Stagnated { counter } => {
                ctx.log(&format!(
                    "Val loss did not improve. EarlyStopping counter: {counter} out of {}",
                    monitor.patience()
                ))?;
            }
            MonitorStep::Stopped { counter } => {
                ctx.log(&format!(
                    "Val loss did not improve. EarlyStopping counter: {counter} out of {}",
                    monitor.patience()
                ))?;
                let best = monitor
                    .best_score()
                    .map_or_else(|| "none".to_string(), |s| format!("{s:.6}"));
                ctx.log(&format!(
                    "Stopping training at Epoch: {}. Val_loss did not improve in {} epochs. Best score: {best}",
                    epoch + 1,
                    monitor.patience()
                ))?;
                stopped_at = Some(epoch + 1);
                break;
            }
        }

        scheduler.step();
    }

    tracing::info!(
        epochs_run,
        stopped_early = stopped_at.is_some(),
        best_val_loss = ?monitor.val_loss_min(),
        elapsed_secs = format!("{:.1}", train_start.elapsed().as_secs_f64()),
        "Training loop finished"
    );

    let report = TrainingReport {
        epochs_run,
        stopped_at,
        best_val_loss: monitor.val_loss_min(),
        best_checkpoint: monitor.best_checkpoint().cloned(),
        history,
    };
    Ok((model, report))
}
