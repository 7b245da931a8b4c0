//! qnode Circuit Representation
//!
//! This crate provides the circuit data structures shared by the quantum node,
//! the simulator and hardware backends.
//!
//! # Overview
//!
//! A quantum node is built as a [`ParametricCircuit`]: an ordered list of
//! [`Operation`]s whose angles come from a [`ParamSource`] (a constant, a
//! column of the input row, or a trainable weight). Binding a template to one
//! data row and a weight vector yields a [`Circuit`] with concrete angles,
//! which is what simulators and backends execute.
//!
//! Each gate angle carries a [`ShiftRule`] describing how to obtain its exact
//! derivative from shifted circuit evaluations.
//!
//! # Example: Encoder + Variational Template
//!
//! ```rust
//! use qnode_ir::{GateOp, ParametricCircuit, ShiftRule};
//!
//! let mut template = ParametricCircuit::new("node", 2);
//! template.push_input(GateOp::Ry, &[0], 0).unwrap();
//! template.push_input(GateOp::Ry, &[1], 1).unwrap();
//! template.push_trainable(GateOp::Rx, &[0]).unwrap();
//! template.push_trainable(GateOp::Crz, &[0, 1]).unwrap();
//!
//! assert_eq!(template.num_inputs(), 2);
//! assert_eq!(template.num_trainable(), 2);
//! assert_eq!(
//!     template.trainable_shift_rules(),
//!     vec![ShiftRule::TwoTerm, ShiftRule::FourTerm]
//! );
//!
//! let circuit = template.bind(&[0.1, 0.2], &[0.5, -0.5]).unwrap();
//! assert_eq!(circuit.num_ops(), 4);
//! ```
//!
//! # Supported Gates
//!
//! | Gate | Qubits | Angles | Shift rule |
//! |------|--------|--------|------------|
//! | `H`, `X`, `Y`, `Z`, `S`, `T`, `SX` | 1 | 0 | - |
//! | `Rx`, `Ry`, `Rz`, `P` | 1 | 1 | two-term |
//! | `U3` | 1 | 3 | two-term |
//! | `CX`, `CZ`, `Swap` | 2 | 0 | - |
//! | `CRx`, `CRy`, `CRz` | 2 | 1 | four-term |
//! | `CU3` | 2 | 3 | four-term (θ), two-term (φ, λ) |
//! | `RXX`, `RZZ`, `RZX` | 2 | 1 | two-term |

pub mod circuit;
pub mod error;
pub mod gate;
pub mod parameter;
pub mod qubit;

pub use circuit::{Circuit, Instruction, Operation, ParametricCircuit};
pub use error::{IrError, IrResult};
pub use gate::{GateOp, ShiftRule, ShiftTerm};
pub use parameter::ParamSource;
pub use qubit::QubitId;
