//! Experiment tracking: run identity, config and metric streams.
//!
//! [`JsonlTracker`] appends one JSON object per event to
//! `<run_dir>/metrics.jsonl`:
//!
//! ```text
//! {"event":"init","run_id":"k3v9x0qa","run_name":"gcn"}
//! {"event":"config","config":{...}}
//! {"event":"log","step":0,"metrics":{"train_step_loss":2.07,"acc_step":0.25}}
//! {"event":"finish","steps":412}
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};

/// Sink for run configuration and metrics.
pub trait ExperimentTracker {
    fn run_id(&self) -> &str;
    fn run_name(&self) -> &str;
    /// Record the run configuration. May be called more than once; later
    /// calls add to earlier ones.
    fn config(&mut self, config: &Value) -> anyhow::Result<()>;
    /// Record one set of metrics. Each call advances the step counter.
    fn log(&mut self, metrics: &[(&str, f64)]) -> anyhow::Result<()>;
    fn finish(&mut self) -> anyhow::Result<()>;
}

/// Random 8-character lower-case alphanumeric run id.
pub fn generate_run_id(rng: &mut impl Rng) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Tracker writing JSON lines into its run directory.
pub struct JsonlTracker {
    run_id: String,
    run_name: String,
    run_dir: PathBuf,
    writer: BufWriter<File>,
    step: u64,
    finished: bool,
}

impl JsonlTracker {
    /// Create `<experiment_dir>/<run_id>` and open its metrics file.
    pub fn init(experiment_dir: &Path, run_id: String, run_name: String) -> anyhow::Result<Self> {
        let run_dir = experiment_dir.join(&run_id);
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run dir {}", run_dir.display()))?;

        let path = run_dir.join("metrics.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut tracker = Self {
            run_id,
            run_name,
            run_dir,
            writer: BufWriter::new(file),
            step: 0,
            finished: false,
        };
        let event = json!({
            "event": "init",
            "run_id": tracker.run_id,
            "run_name": tracker.run_name,
        });
        tracker.write_event(&event)?;
        Ok(tracker)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn write_event(&mut self, event: &Value) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl ExperimentTracker for JsonlTracker {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn run_name(&self) -> &str {
        &self.run_name
    }

    fn config(&mut self, config: &Value) -> anyhow::Result<()> {
        self.write_event(&json!({ "event": "config", "config": config }))
    }

    fn log(&mut self, metrics: &[(&str, f64)]) -> anyhow::Result<()> {
        let values: Map<String, Value> = metrics
            .iter()
            .map(|(k, v)| ((*k).to_string(), metric_value(*v)))
            .collect();
        let event = json!({ "event": "log", "step": self.step, "metrics": values });
        self.step += 1;
        self.write_event(&event)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let event = json!({ "event": "finish", "steps": self.step });
        self.write_event(&event)
    }
}

/// JSON has no NaN or infinity; those become `null`.
fn metric_value(v: f64) -> Value {
    serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}
