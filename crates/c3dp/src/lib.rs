//! Contrastive structure/sequence pretraining (C3DP) for protein graphs.
//!
//! A graph neural network embeds each protein structure graph, a small MLP
//! embeds its paired sequence, and both land in a shared space where true
//! pairs are pulled together by a symmetric InfoNCE (or sigmoid) loss.
//! Training keeps the best checkpoint by validation loss and stops early once
//! it stagnates.

pub mod inference;
pub mod model;
pub mod training;

pub use inference::{evaluate, EvalSummary};
pub use model::{C3dpConfig, C3dpNet, C3dpOutput, GraphModel, Pooling};
pub use training::checkpoint::{load_model, load_optimizer, CheckpointPaths, CheckpointSource, TrainingSnapshot};
pub use training::early_stopping::{EarlyStopping, MonitorStep};
pub use training::metrics::{batch_accuracy, running_accuracy, EpochMetrics, MetricsHistory};
pub use training::run_log::{RunContext, RunLog};
pub use training::schedule::{LrSchedule, LrScheduler};
pub use training::tracker::{generate_run_id, ExperimentTracker, JsonlTracker};
pub use training::trainer::{train, OptimizerKind, TrainingConfig, TrainingReport};
