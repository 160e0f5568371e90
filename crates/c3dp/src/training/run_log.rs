//! Per-run text log and the context object threaded through a training run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::training::tracker::ExperimentTracker;

/// Append-mode text log. Every message is also emitted through `tracing`.
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn log(&mut self, message: &str) -> anyhow::Result<()> {
        let message = message.trim_end();
        tracing::info!("{message}");
        writeln!(self.file, "{message}")
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Per-run state handed to the trainer in place of process globals.
pub struct RunContext {
    pub run_dir: PathBuf,
    pub log: RunLog,
    pub tracker: Box<dyn ExperimentTracker>,
    pub seed: u64,
}

impl RunContext {
    /// Append to the run log.
    pub fn log(&mut self, message: &str) -> anyhow::Result<()> {
        self.log.log(message)
    }

    pub fn track(&mut self, metrics: &[(&str, f64)]) -> anyhow::Result<()> {
        self.tracker.log(metrics)
    }
}
