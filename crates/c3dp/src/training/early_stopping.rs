//! Early stopping on validation loss, keeping only the best checkpoint.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::training::checkpoint::{CheckpointPaths, CheckpointSource};

/// Outcome of one [`EarlyStopping::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorStep {
    /// New best loss; the checkpoint at `paths` replaced the previous one.
    Improved {
        previous: Option<f64>,
        val_loss: f64,
        paths: CheckpointPaths,
    },
    /// No improvement, still within patience.
    Stagnated { counter: usize },
    /// Patience exhausted. Terminal.
    Stopped { counter: usize },
}

impl MonitorStep {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

/// Tracks the best validation loss and halts after `patience` epochs without
/// improvement. An epoch improves when `-val_loss > best_score + delta`, so a
/// repeated loss counts against patience.
///
/// Only the files this monitor wrote are ever deleted.
#[derive(Debug)]
pub struct EarlyStopping {
    base_path: PathBuf,
    patience: usize,
    delta: f64,
    counter: usize,
    best_score: Option<f64>,
    val_loss_min: Option<f64>,
    stopped: bool,
    written: Option<CheckpointPaths>,
}

impl EarlyStopping {
    /// `base_path` names the checkpoint family, e.g. `<run_dir>/gcn.ckpt`.
    pub fn new(base_path: impl Into<PathBuf>, patience: usize, delta: f64) -> Self {
        Self {
            base_path: base_path.into(),
            patience,
            delta,
            counter: 0,
            best_score: None,
            val_loss_min: None,
            stopped: false,
            written: None,
        }
    }

    /// Feed one epoch's validation loss. Writes a checkpoint from `source`
    /// on improvement. Non-finite losses never count as improvements.
    pub fn step(&mut self, val_loss: f64, source: &dyn CheckpointSource) -> anyhow::Result<MonitorStep> {
        if self.stopped {
            return Ok(MonitorStep::Stopped { counter: self.counter });
        }

        let score = -val_loss;
        let improved = val_loss.is_finite()
            && match self.best_score {
                None => true,
                Some(best) => score > best + self.delta,
            };

        if !improved {
            self.counter += 1;
            if self.counter >= self.patience {
                self.stopped = true;
                return Ok(MonitorStep::Stopped { counter: self.counter });
            }
            return Ok(MonitorStep::Stagnated { counter: self.counter });
        }

        let previous = self.val_loss_min;
        let paths = self.save_checkpoint(val_loss, source)?;
        self.best_score = Some(score);
        self.counter = 0;
        Ok(MonitorStep::Improved {
            previous,
            val_loss,
            paths,
        })
    }

    fn save_checkpoint(&mut self, val_loss: f64, source: &dyn CheckpointSource) -> anyhow::Result<CheckpointPaths> {
        let paths = CheckpointPaths::for_best(&self.base_path, val_loss);
        if let Some(dir) = paths.weights.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        if let Some(old) = self.written.take() {
            for path in old.all() {
                remove_if_present(path)?;
            }
        }

        source.write_weights(&paths.weights)?;
        source.write_parameters(&paths.parameters)?;
        source.write_optimizer(&paths.optimizer)?;

        tracing::debug!(path = %paths.weights.display(), val_loss, "Checkpoint written");
        self.written = Some(paths.clone());
        self.val_loss_min = Some(val_loss);
        Ok(paths)
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    /// Lowest validation loss checkpointed so far.
    pub fn val_loss_min(&self) -> Option<f64> {
        self.val_loss_min
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Files of the checkpoint currently on disk.
    pub fn best_checkpoint(&self) -> Option<&CheckpointPaths> {
        self.written.as_ref()
    }
}

fn remove_if_present(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
