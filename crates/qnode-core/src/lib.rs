//! qnode Quantum Nodes
//!
//! A quantum node is one trainable stage of a hybrid pipeline: an encoder
//! loads a classical row into rotation angles, a variational layer applies
//! trainable gates, every wire is measured in the Z basis, and the measured
//! activations go through optional Gaussian noise and normalization before
//! they reach the next node.
//!
//! # Gradients
//!
//! Node outputs are differentiated with the parameter-shift rule: each
//! trainable angle (and, for all but the first node, each input column) is
//! shifted, the circuit is re-run, and the shifted outputs are combined.
//! Controlled rotations use the four-term rule, everything else the
//! two-term `±π/2` rule, so the Jacobians are exact on the simulator.
//! [`QuantumNode::backward`] then chains an upstream gradient through the
//! normalization analytically.
//!
//! # Execution
//!
//! Circuits run through a [`CircuitExecutor`]:
//!
//! | Executor | Results |
//! |----------|---------|
//! | [`SimulatorExecutor`] | exact statevector ⟨Z⟩ |
//! | [`HardwareProcessor`] | shot estimates from any `qnode_hal::Backend`, batched into jobs |
//!
//! # Example
//!
//! ```rust
//! use ndarray::array;
//! use qnode_core::{ActNorm, NodeArch, SimulatorExecutor, build_nodes};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let archs = [
//!     NodeArch::new(2, "2_ry", "u3cu3_s0").with_seed(0),
//!     NodeArch::new(2, "2_ry", "cu3_s0").with_seed(1),
//! ];
//! let mut nodes = build_nodes(&archs, ActNorm::LayerNormNoLast).unwrap();
//! let exec = SimulatorExecutor::new();
//!
//! let x = array![[0.1, 0.2], [0.3, 0.4]];
//! let y = nodes.shift_and_run(&x, &exec).await.unwrap();
//! let grads = nodes.backward(&y.mapv(|_| 1.0)).unwrap();
//! assert_eq!(grads[0].len(), nodes.nodes()[0].num_parameters());
//! # });
//! ```

pub mod config;
pub mod encoder;
pub mod error;
pub mod layer;
pub mod measure;
pub mod node;
pub mod noise;
pub mod norm;
pub mod pipeline;
pub mod processor;

pub use config::{BackendChoice, NodeArch, PipelineConfig};
pub use encoder::{EncoderOp, GeneralEncoder, NAMED_ENCODERS};
pub use error::{NodeError, NodeResult};
pub use layer::{LAYER_NAMES, VariationalLayer};
pub use measure::{MeasureAll, Observable};
pub use node::{NodeGradients, NodeTrace, QuantumNode, build_nodes};
pub use noise::{ActivationNoise, NoiseMode, ProbSchedule};
pub use norm::{ActNorm, MeanStd};
pub use pipeline::QuantumNodeList;
pub use processor::{
    CircuitExecutor, HardwareProcessor, ShiftOutput, ShiftTarget, SimulatorExecutor,
    process_parameterized, process_parameterized_and_shift,
};
