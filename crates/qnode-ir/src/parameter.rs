//! Angle sources for parameterized circuits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IrError, IrResult};

/// Where a gate angle comes from when the circuit is bound.
///
/// Encoders read `Input` columns of a data row; variational layers read
/// `Trainable` entries of the node's weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamSource {
    /// A fixed angle.
    Constant(f64),
    /// Column of the input row.
    Input(usize),
    /// Entry of the trainable weight vector.
    Trainable(usize),
}

impl ParamSource {
    /// Resolve to a concrete angle.
    pub fn resolve(&self, inputs: &[f64], weights: &[f64]) -> IrResult<f64> {
        match *self {
            ParamSource::Constant(v) => Ok(v),
            ParamSource::Input(index) => {
                inputs
                    .get(index)
                    .copied()
                    .ok_or(IrError::InputOutOfRange {
                        index,
                        len: inputs.len(),
                    })
            }
            ParamSource::Trainable(index) => {
                weights
                    .get(index)
                    .copied()
                    .ok_or(IrError::WeightOutOfRange {
                        index,
                        len: weights.len(),
                    })
            }
        }
    }

    /// Input column, if this angle is data-bound.
    pub fn as_input(&self) -> Option<usize> {
        match *self {
            ParamSource::Input(i) => Some(i),
            _ => None,
        }
    }

    /// Trainable index, if this angle is a weight.
    pub fn as_trainable(&self) -> Option<usize> {
        match *self {
            ParamSource::Trainable(i) => Some(i),
            _ => None,
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamSource::Constant(v) => write!(f, "{v}"),
            ParamSource::Input(i) => write!(f, "x[{i}]"),
            ParamSource::Trainable(i) => write!(f, "w[{i}]"),
        }
    }
}

impl From<f64> for ParamSource {
    fn from(value: f64) -> Self {
        ParamSource::Constant(value)
    }
}
