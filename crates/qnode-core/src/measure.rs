//! Pauli-Z measurement of every wire.

use ndarray::{Array1, Array2};
use qnode_adapter_sim::Statevector;
use qnode_hal::Counts;

use crate::error::{NodeError, NodeResult};

/// Observable measured on each wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Observable {
    /// Computational-basis Z.
    #[default]
    PauliZ,
}

/// Measure every wire with the same observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasureAll {
    observable: Observable,
}

impl MeasureAll {
    /// ⟨Z⟩ on every wire.
    pub fn pauli_z() -> Self {
        Self {
            observable: Observable::PauliZ,
        }
    }

    /// The observable.
    pub fn observable(&self) -> Observable {
        self.observable
    }

    /// Exact expectations from a statevector.
    pub fn from_statevector(&self, state: &Statevector) -> Array1<f64> {
        match self.observable {
            Observable::PauliZ => Array1::from(state.expectations_z()),
        }
    }

    /// Estimated expectations from sampled counts.
    pub fn from_counts(&self, counts: &Counts, n_wires: usize) -> Array1<f64> {
        match self.observable {
            Observable::PauliZ => (0..n_wires).map(|w| counts.expectation_z(w)).collect(),
        }
    }

    /// Stack per-circuit rows into a `(rows.len() × n_wires)` batch.
    pub fn stack(rows: &[Array1<f64>], n_wires: usize) -> NodeResult<Array2<f64>> {
        let mut out = Array2::zeros((rows.len(), n_wires));
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_wires {
                return Err(NodeError::ShapeMismatch(format!(
                    "measurement row {i} has {} wires, expected {n_wires}",
                    row.len()
                )));
            }
            out.row_mut(i).assign(row);
        }
        Ok(out)
    }
}
