//! Gaussian noise injected into node activations.

use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{NodeError, NodeResult};

/// Whether noise is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMode {
    /// Noise is injected.
    #[default]
    Train,
    /// Activations pass through untouched.
    Eval,
}

/// Probability of injecting noise on a call, as a function of the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProbSchedule {
    /// 0 at epoch 0, rising linearly to 1 at `n_epochs`.
    Increase,
    /// 1 at epoch 0, falling linearly to 0 at `n_epochs`.
    Decrease,
    /// Rising until `separator`, falling afterwards.
    IncreaseDecrease {
        /// Epoch at which the probability peaks.
        separator: usize,
    },
}

impl ProbSchedule {
    /// Injection probability at `epoch` out of `n_epochs`.
    pub fn probability(self, epoch: usize, n_epochs: usize) -> f64 {
        let ramp = |num: usize, den: usize| {
            if den == 0 {
                1.0
            } else {
                (num as f64 / den as f64).clamp(0.0, 1.0)
            }
        };
        match self {
            ProbSchedule::Increase => ramp(epoch, n_epochs),
            ProbSchedule::Decrease => 1.0 - ramp(epoch, n_epochs),
            ProbSchedule::IncreaseDecrease { separator } => {
                if epoch < separator {
                    ramp(epoch, separator)
                } else {
                    1.0 - ramp(epoch - separator, n_epochs.saturating_sub(separator))
                }
            }
        }
    }
}

fn default_factor() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Per-node Gaussian activation noise: `x + N(0, 1) · std[node] · factor + mean[node]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationNoise {
    /// Offset per node.
    pub mean: Vec<f64>,
    /// Scale per node.
    pub std: Vec<f64>,
    /// Global multiplier on `std`.
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Inject after normalization instead of before.
    #[serde(default)]
    pub after_norm: bool,
    /// Train or eval.
    #[serde(default)]
    pub mode: NoiseMode,
    /// Master switch.
    #[serde(default = "default_true")]
    pub is_add_noise: bool,
    /// Optional epoch-dependent injection probability.
    #[serde(default)]
    pub prob_schedule: Option<ProbSchedule>,
    /// Length of the schedule.
    #[serde(default)]
    pub n_epochs: usize,
    #[serde(skip)]
    epoch: usize,
}

impl ActivationNoise {
    /// Noise with the given per-node mean and std, always on in train mode.
    pub fn new(mean: Vec<f64>, std: Vec<f64>) -> NodeResult<Self> {
        let noise = Self {
            mean,
            std,
            factor: default_factor(),
            after_norm: false,
            mode: NoiseMode::Train,
            is_add_noise: true,
            prob_schedule: None,
            n_epochs: 0,
            epoch: 0,
        };
        noise.validate()?;
        Ok(noise)
    }

    /// Scale every node's std.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Inject after normalization.
    pub fn with_after_norm(mut self, after_norm: bool) -> Self {
        self.after_norm = after_norm;
        self
    }

    /// Gate injection on an epoch schedule.
    pub fn with_schedule(mut self, schedule: ProbSchedule, n_epochs: usize) -> Self {
        self.prob_schedule = Some(schedule);
        self.n_epochs = n_epochs;
        self
    }

    /// Check mean/std line up and std is non-negative.
    pub fn validate(&self) -> NodeResult<()> {
        if self.mean.len() != self.std.len() {
            return Err(NodeError::Noise(format!(
                "{} means but {} stds",
                self.mean.len(),
                self.std.len()
            )));
        }
        if self.std.iter().any(|&s| s < 0.0) {
            return Err(NodeError::Noise("std must be non-negative".into()));
        }
        if let Some(ProbSchedule::IncreaseDecrease { separator }) = self.prob_schedule {
            if separator > self.n_epochs {
                return Err(NodeError::Noise(format!(
                    "separator {separator} beyond n_epochs {}",
                    self.n_epochs
                )));
            }
        }
        Ok(())
    }

    /// Current epoch.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Advance the schedule.
    pub fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    /// Switch between train and eval.
    pub fn set_mode(&mut self, mode: NoiseMode) {
        self.mode = mode;
    }

    /// Injection probability at the current epoch.
    pub fn probability(&self) -> f64 {
        self.prob_schedule
            .map_or(1.0, |s| s.probability(self.epoch, self.n_epochs))
    }

    /// Add noise to node `node_id`'s activation at the given stage.
    ///
    /// Returns `x` unchanged in eval mode, when switched off, when the stage
    /// does not match `after_norm`, or when the schedule says skip.
    pub fn add_noise<R: Rng + ?Sized>(
        &self,
        x: &Array2<f64>,
        node_id: usize,
        is_after_norm: bool,
        rng: &mut R,
    ) -> NodeResult<Array2<f64>> {
        if self.mode != NoiseMode::Train || !self.is_add_noise || self.after_norm != is_after_norm
        {
            return Ok(x.clone());
        }
        let (mean, std) = match (self.mean.get(node_id), self.std.get(node_id)) {
            (Some(&m), Some(&s)) => (m, s),
            _ => {
                return Err(NodeError::Noise(format!(
                    "no mean/std for node {node_id} ({} configured)",
                    self.mean.len()
                )));
            }
        };
        let p = self.probability();
        if p < 1.0 && rng.gen_range(0.0..1.0) >= p {
            trace!(node_id, p, "noise skipped by schedule");
            return Ok(x.clone());
        }
        let scale = std * self.factor;
        Ok(x.mapv(|v| {
            let z: f64 = rng.sample(StandardNormal);
            v + z * scale + mean
        }))
    }
}
