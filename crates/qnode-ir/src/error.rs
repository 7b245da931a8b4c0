//! Error types for the IR crate.

use crate::gate::GateOp;
use crate::qubit::QubitId;
use thiserror::Error;

/// Errors that can occur in IR operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// Qubit index outside the circuit.
    #[error("Qubit {qubit} out of range for a {num_qubits}-qubit circuit (gate: {gate})")]
    QubitOutOfRange {
        /// The offending qubit.
        qubit: QubitId,
        /// Circuit width.
        num_qubits: u32,
        /// Gate being added.
        gate: GateOp,
    },

    /// Gate requires a different number of qubits.
    #[error("Gate '{gate}' requires {expected} qubits, got {got}")]
    QubitCountMismatch {
        /// The gate.
        gate: GateOp,
        /// Expected number of qubits.
        expected: u32,
        /// Actual number of qubits provided.
        got: u32,
    },

    /// Gate requires a different number of angles.
    #[error("Gate '{gate}' takes {expected} parameters, got {got}")]
    ParamCountMismatch {
        /// The gate.
        gate: GateOp,
        /// Expected number of parameters.
        expected: usize,
        /// Actual number of parameters provided.
        got: usize,
    },

    /// Duplicate qubit in a multi-qubit gate.
    #[error("Duplicate qubit {qubit} in gate '{gate}'")]
    DuplicateQubit {
        /// The duplicate qubit.
        qubit: QubitId,
        /// The gate.
        gate: GateOp,
    },

    /// Input column referenced by the circuit is missing from the data row.
    #[error("Input index {index} out of range ({len} input values)")]
    InputOutOfRange {
        /// Requested input column.
        index: usize,
        /// Number of input values supplied.
        len: usize,
    },

    /// Trainable parameter referenced by the circuit is missing.
    #[error("Trainable parameter {index} out of range ({len} weights)")]
    WeightOutOfRange {
        /// Requested trainable index.
        index: usize,
        /// Number of weights supplied.
        len: usize,
    },

    /// Gate name not recognised.
    #[error("Unknown gate '{0}'")]
    UnknownGate(String),
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
