//! Training pipeline: contrastive losses, retrieval metrics, checkpointing
//! with early stopping, LR schedules, run logging and the epoch loop.

pub mod checkpoint;
pub mod early_stopping;
pub mod loss;
pub mod metrics;
pub mod run_log;
pub mod schedule;
pub mod tracker;
pub mod trainer;
