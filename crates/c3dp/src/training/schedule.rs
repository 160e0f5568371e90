//! Per-epoch learning-rate schedules.

use serde::{Deserialize, Serialize};

/// Learning-rate schedule, evaluated in closed form at each epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LrSchedule {
    /// Base rate throughout.
    Constant,
    /// Multiply by `gamma` every `step_size` epochs.
    Step { step_size: usize, gamma: f64 },
    /// Multiply by `gamma` every epoch.
    Exponential { gamma: f64 },
    /// Half-cosine from the base rate down to `eta_min` over `t_max` epochs,
    /// then held at `eta_min`.
    Cosine { t_max: usize, eta_min: f64 },
}

impl Default for LrSchedule {
    fn default() -> Self {
        Self::Constant
    }
}

impl LrSchedule {
    /// Schedule by name with stock parameters. Cosine anneals over `n_epochs`.
    pub fn from_name(name: &str, n_epochs: usize) -> anyhow::Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "step" => Ok(Self::Step {
                step_size: 10,
                gamma: 0.1,
            }),
            "exponential" => Ok(Self::Exponential { gamma: 0.95 }),
            "cosine" => Ok(Self::Cosine {
                t_max: n_epochs.max(1),
                eta_min: 0.0,
            }),
            other => anyhow::bail!(
                "Unknown lr scheduler '{other}' (expected constant, step, exponential or cosine)"
            ),
        }
    }

    /// Learning rate after `epoch` scheduler steps.
    pub fn lr_at(&self, base_lr: f64, epoch: usize) -> f64 {
        match *self {
            Self::Constant => base_lr,
            Self::Step { step_size, gamma } => {
                base_lr * gamma.powi((epoch / step_size.max(1)) as i32)
            }
            Self::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),
            Self::Cosine { t_max, eta_min } => {
                let t_max = t_max.max(1);
                let progress = epoch.min(t_max) as f64 / t_max as f64;
                eta_min + (base_lr - eta_min) * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
            }
        }
    }
}

impl std::fmt::Display for LrSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant => write!(f, "constant"),
            Self::Step { step_size, gamma } => write!(f, "step(step_size={step_size}, gamma={gamma})"),
            Self::Exponential { gamma } => write!(f, "exponential(gamma={gamma})"),
            Self::Cosine { t_max, eta_min } => write!(f, "cosine(t_max={t_max}, eta_min={eta_min})"),
        }
    }
}

/// Stateful wrapper stepped once per epoch.
#[derive(Debug, Clone)]
pub struct LrScheduler {
    base_lr: f64,
    schedule: LrSchedule,
    epoch: usize,
}

impl LrScheduler {
    pub fn new(base_lr: f64, schedule: LrSchedule) -> Self {
        Self {
            base_lr,
            schedule,
            epoch: 0,
        }
    }

    /// Current learning rate.
    pub fn lr(&self) -> f64 {
        self.schedule.lr_at(self.base_lr, self.epoch)
    }

    /// Advance one epoch and return the new rate.
    pub fn step(&mut self) -> f64 {
        self.epoch += 1;
        self.lr()
    }
}
