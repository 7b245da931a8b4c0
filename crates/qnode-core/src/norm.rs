//! Activation normalization between node stages.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{NodeError, NodeResult};

/// Epsilon added to the biased batch variance.
pub const BATCH_NORM_EPS: f64 = 1e-5;

/// Per-wire statistics used in place of batch statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanStd {
    /// Per-wire mean.
    pub mean: Vec<f64>,
    /// Per-wire standard deviation.
    pub std: Vec<f64>,
}

impl MeanStd {
    /// Check both vectors cover `n_wires` and every std is positive.
    pub fn validate(&self, n_wires: usize) -> NodeResult<()> {
        if self.mean.len() != n_wires || self.std.len() != n_wires {
            return Err(NodeError::ShapeMismatch(format!(
                "pre-specified mean/std have {}/{} entries, node has {n_wires} wires",
                self.mean.len(),
                self.std.len()
            )));
        }
        if self.std.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(NodeError::Config(
                "pre-specified std must be positive and finite".into(),
            ));
        }
        Ok(())
    }
}

/// Normalization applied to a node's measured activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActNorm {
    /// Pass activations through.
    #[default]
    None,
    /// Per-sample standardization across wires.
    LayerNorm,
    /// Per-wire standardization across the batch.
    BatchNorm,
    /// Standardization over the whole batch tensor.
    AllNorm,
    /// `LayerNorm`, except on the last node.
    LayerNormNoLast,
    /// `BatchNorm`, except on the last node.
    BatchNormNoLast,
}

/// What actually runs for one call.
enum Stage<'a> {
    Identity,
    Layer,
    Batch,
    Fixed(&'a MeanStd),
    All,
}

impl ActNorm {
    /// All variants, for listing.
    pub const ALL: [ActNorm; 6] = [
        ActNorm::None,
        ActNorm::LayerNorm,
        ActNorm::BatchNorm,
        ActNorm::AllNorm,
        ActNorm::LayerNormNoLast,
        ActNorm::BatchNormNoLast,
    ];

    /// Config name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActNorm::None => "none",
            ActNorm::LayerNorm => "layer_norm",
            ActNorm::BatchNorm => "batch_norm",
            ActNorm::AllNorm => "all_norm",
            ActNorm::LayerNormNoLast => "layer_norm_no_last",
            ActNorm::BatchNormNoLast => "batch_norm_no_last",
        }
    }

    fn stage(self, is_last: bool, pre: Option<&MeanStd>) -> Stage<'_> {
        let batch = || pre.map_or(Stage::Batch, Stage::Fixed);
        match self {
            ActNorm::None => Stage::Identity,
            ActNorm::LayerNorm => Stage::Layer,
            ActNorm::LayerNormNoLast if is_last => Stage::Identity,
            ActNorm::LayerNormNoLast => Stage::Layer,
            ActNorm::BatchNorm => batch(),
            ActNorm::BatchNormNoLast if is_last => Stage::Identity,
            ActNorm::BatchNormNoLast => batch(),
            ActNorm::AllNorm => Stage::All,
        }
    }

    /// Normalize a `(batch × wires)` activation.
    pub fn forward(
        self,
        x: &Array2<f64>,
        is_last: bool,
        pre: Option<&MeanStd>,
    ) -> NodeResult<Array2<f64>> {
        match self.stage(is_last, pre) {
            Stage::Identity => Ok(x.clone()),
            Stage::Layer => {
                let (_, n) = x.dim();
                need(n, 2, "layer_norm", "wires")?;
                let mut y = x.clone();
                for (i, mut row) in y.rows_mut().into_iter().enumerate() {
                    let (mean, std) = unbiased_stats(row.iter().copied(), n);
                    spread(std, || format!("layer_norm row {i}"))?;
                    row.mapv_inplace(|v| (v - mean) / std);
                }
                Ok(y)
            }
            Stage::Batch => {
                let (b, _) = x.dim();
                need(b, 2, "batch_norm", "samples")?;
                let mut y = x.clone();
                for mut col in y.columns_mut() {
                    let (mean, s) = biased_stats(col.iter().copied(), b);
                    col.mapv_inplace(|v| (v - mean) / s);
                }
                Ok(y)
            }
            Stage::Fixed(ms) => {
                ms.validate(x.ncols())?;
                let mut y = x.clone();
                for (j, mut col) in y.columns_mut().into_iter().enumerate() {
                    col.mapv_inplace(|v| (v - ms.mean[j]) / ms.std[j]);
                }
                Ok(y)
            }
            Stage::All => {
                need(x.len(), 2, "all_norm", "elements")?;
                let (mean, std) = unbiased_stats(x.iter().copied(), x.len());
                spread(std, || "all_norm batch".to_string())?;
                Ok(x.mapv(|v| (v - mean) / std))
            }
        }
    }

    /// Gradient with respect to the input, given the input `x`, the output
    /// `y` of [`ActNorm::forward`] and the upstream gradient `grad_y`.
    pub fn backward(
        self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        grad_y: &Array2<f64>,
        is_last: bool,
        pre: Option<&MeanStd>,
    ) -> NodeResult<Array2<f64>> {
        if x.dim() != y.dim() || x.dim() != grad_y.dim() {
            return Err(NodeError::ShapeMismatch(format!(
                "norm backward: input {:?}, output {:?}, gradient {:?}",
                x.dim(),
                y.dim(),
                grad_y.dim()
            )));
        }
        match self.stage(is_last, pre) {
            Stage::Identity => Ok(grad_y.clone()),
            Stage::Layer => {
                let n = x.ncols();
                let mut gx = grad_y.clone();
                for (i, mut g) in gx.axis_iter_mut(Axis(0)).enumerate() {
                    let (_, std) = unbiased_stats(x.row(i).iter().copied(), n);
                    let yr = y.row(i);
                    let g_mean = g.sum() / n as f64;
                    let gy = g.dot(&yr) / (n - 1) as f64;
                    for (gv, &yv) in g.iter_mut().zip(yr.iter()) {
                        *gv = (*gv - g_mean - yv * gy) / std;
                    }
                }
                Ok(gx)
            }
            Stage::Batch => {
                let b = x.nrows();
                let mut gx = grad_y.clone();
                for (j, mut g) in gx.axis_iter_mut(Axis(1)).enumerate() {
                    let (_, s) = biased_stats(x.column(j).iter().copied(), b);
                    let yc = y.column(j);
                    let g_mean = g.sum() / b as f64;
                    let gy = g.dot(&yc) / b as f64;
                    for (gv, &yv) in g.iter_mut().zip(yc.iter()) {
                        *gv = (*gv - g_mean - yv * gy) / s;
                    }
                }
                Ok(gx)
            }
            Stage::Fixed(ms) => {
                ms.validate(x.ncols())?;
                let mut gx = grad_y.clone();
                for (j, mut col) in gx.columns_mut().into_iter().enumerate() {
                    col.mapv_inplace(|g| g / ms.std[j]);
                }
                Ok(gx)
            }
            Stage::All => {
                let m = x.len();
                let (_, std) = unbiased_stats(x.iter().copied(), m);
                let g_mean = grad_y.sum() / m as f64;
                let gy = (grad_y * y).sum() / (m - 1) as f64;
                Ok(ndarray::Zip::from(grad_y)
                    .and(y)
                    .map_collect(|&g, &yv| (g - g_mean - yv * gy) / std))
            }
        }
    }
}

impl fmt::Display for ActNorm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActNorm {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActNorm::ALL
            .iter()
            .copied()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| NodeError::UnknownNorm(s.to_string()))
    }
}

fn need(have: usize, min: usize, norm: &str, what: &str) -> NodeResult<()> {
    if have < min {
        return Err(NodeError::ShapeMismatch(format!(
            "{norm} needs at least {min} {what}, got {have}"
        )));
    }
    Ok(())
}

/// Layer and all norm carry no epsilon, so a constant slice cannot be scaled.
fn spread(std: f64, what: impl FnOnce() -> String) -> NodeResult<()> {
    if std > 0.0 && std.is_finite() {
        return Ok(());
    }
    Err(NodeError::DegenerateActivations(format!(
        "{} has standard deviation {std}",
        what()
    )))
}

/// Mean and `n − 1` standard deviation.
fn unbiased_stats(values: impl Iterator<Item = f64> + Clone, n: usize) -> (f64, f64) {
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}

/// Mean and `sqrt(biased variance + eps)`.
fn biased_stats(values: impl Iterator<Item = f64> + Clone, n: usize) -> (f64, f64) {
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, (var + BATCH_NORM_EPS).sqrt())
}
