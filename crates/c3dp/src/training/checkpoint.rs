//! Checkpoint files: naming, writing and loading.
//!
//! A checkpoint is three files in one directory. For a base path
//! `<dir>/gcn.ckpt` and validation loss `0.25`:
//!
//! ```text
//! <dir>/gcn-state-dict-val_loss=0.250000.ckpt   model weights
//! <dir>/gcn-parameters.ckpt                      constructor parameters (JSON)
//! <dir>/optimizer-state-dict.ckpt                optimizer state
//! ```
//!
//! Weights and optimizer state are MessagePack records written through the
//! bytes recorder, so the on-disk names are exactly the ones above.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context;
use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;

use crate::model::{C3dpConfig, C3dpNet};

/// The three file paths making up one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub weights: PathBuf,
    pub parameters: PathBuf,
    pub optimizer: PathBuf,
}

impl CheckpointPaths {
    /// Paths for a checkpoint taken at `val_loss`, derived from `base`.
    pub fn for_best(base: &Path, val_loss: f64) -> Self {
        let ext = dotted_extension(base);
        let stem = base.with_extension("");
        let dir = base.parent().unwrap_or_else(|| Path::new(""));

        let mut weights: OsString = stem.clone().into_os_string();
        weights.push(format!("-state-dict-val_loss={val_loss:.6}{ext}"));
        let mut parameters: OsString = stem.into_os_string();
        parameters.push(format!("-parameters{ext}"));

        Self {
            weights: PathBuf::from(weights),
            parameters: PathBuf::from(parameters),
            optimizer: dir.join(format!("optimizer-state-dict{ext}")),
        }
    }

    /// Recover the sibling paths of a weights file. The model name is the
    /// file name up to its first `-`.
    pub fn from_weights(weights: &Path) -> anyhow::Result<Self> {
        let file_name = weights
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid checkpoint path: {}", weights.display()))?;
        let name = file_name.split('-').next().unwrap_or(file_name);
        let ext = dotted_extension(weights);
        let dir = weights.parent().unwrap_or_else(|| Path::new(""));

        Ok(Self {
            weights: weights.to_path_buf(),
            parameters: dir.join(format!("{name}-parameters{ext}")),
            optimizer: dir.join(format!("optimizer-state-dict{ext}")),
        })
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.weights, &self.parameters, &self.optimizer]
    }
}

fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

/// Anything that can persist the three parts of a checkpoint.
pub trait CheckpointSource {
    fn write_weights(&self, path: &Path) -> anyhow::Result<()>;
    fn write_parameters(&self, path: &Path) -> anyhow::Result<()>;
    fn write_optimizer(&self, path: &Path) -> anyhow::Result<()>;
}

/// Borrowed view of the live training state, written on improvement.
pub struct TrainingSnapshot<'a, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<C3dpNet<B>, B>,
{
    pub model: &'a C3dpNet<B>,
    pub config: &'a C3dpConfig,
    pub optimizer: &'a O,
}

impl<B, O> CheckpointSource for TrainingSnapshot<'_, B, O>
where
    B: AutodiffBackend,
    O: Optimizer<C3dpNet<B>, B>,
{
    fn write_weights(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = recorder()
            .record(self.model.valid().into_record(), ())
            .map_err(|e| anyhow::anyhow!("Failed to serialize model weights: {e}"))?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn write_parameters(&self, path: &Path) -> anyhow::Result<()> {
        self.config
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn write_optimizer(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = recorder()
            .record(self.optimizer.to_record(), ())
            .map_err(|e| anyhow::anyhow!("Failed to serialize optimizer state: {e}"))?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn recorder() -> NamedMpkBytesRecorder<FullPrecisionSettings> {
    NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
}

fn require_file(path: &Path) -> anyhow::Result<()> {
    if !path.is_file() {
        anyhow::bail!("Checkpoint file not found: {}", path.display());
    }
    Ok(())
}

/// Rebuild a model from a weights file and its sibling parameters file.
pub fn load_model<B: Backend>(
    weights: &Path,
    device: &B::Device,
) -> anyhow::Result<(C3dpNet<B>, C3dpConfig)> {
    let paths = CheckpointPaths::from_weights(weights)?;
    require_file(&paths.parameters)?;
    require_file(&paths.weights)?;

    let config = C3dpConfig::load(&paths.parameters).map_err(|e| {
        anyhow::anyhow!("Failed to load parameters from {}: {e}", paths.parameters.display())
    })?;
    let bytes = std::fs::read(&paths.weights)
        .with_context(|| format!("Failed to read {}", paths.weights.display()))?;
    let record = recorder()
        .load(bytes, device)
        .map_err(|e| anyhow::anyhow!("Failed to load weights from {}: {e}", weights.display()))?;

    let model = config.init::<B>(device).load_record(record);
    Ok((model, config))
}

/// Restore optimizer state saved next to `weights`.
pub fn load_optimizer<B, O>(optimizer: O, weights: &Path, device: &B::Device) -> anyhow::Result<O>
where
    B: AutodiffBackend,
    O: Optimizer<C3dpNet<B>, B>,
{
    let paths = CheckpointPaths::from_weights(weights)?;
    require_file(&paths.optimizer)?;

    let bytes = std::fs::read(&paths.optimizer)
        .with_context(|| format!("Failed to read {}", paths.optimizer.display()))?;
    let record = recorder().load(bytes, device).map_err(|e| {
        anyhow::anyhow!("Failed to load optimizer from {}: {e}", paths.optimizer.display())
    })?;
    Ok(optimizer.load_record(record))
}
