//! Pipeline configuration.
//!
//! Loaded from YAML. Environment variables with the `QNODE_` prefix
//! override the backend section:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `QNODE_BACKEND` | `simulator` or `hardware` |
//! | `QNODE_SHOTS` | shots per circuit on the hardware path |
//! | `QNODE_SEED` | sampling seed on the hardware path |
//!
//! ```yaml
//! nodes:
//!   - n_wires: 4
//!     encoder_op_list_name: 4x4_ryzxy
//!     q_layer_name: u3cu3_s0
//!     n_blocks: 2
//!     seed: 0
//!   - n_wires: 4
//!     encoder_op_list_name: 4_ry
//!     q_layer_name: u3cu3_s0
//! act_norm: batch_norm_no_last
//! backend:
//!   kind: hardware
//!   shots: 4096
//! ```

use qnode_adapter_sim::SimulatorBackend;
use qnode_hal::{BackendConfig, BackendFactory};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::encoder::GeneralEncoder;
use crate::error::{NodeError, NodeResult};
use crate::layer::LAYER_NAMES;
use crate::noise::ActivationNoise;
use crate::norm::ActNorm;
use crate::pipeline::QuantumNodeList;
use crate::processor::{CircuitExecutor, HardwareProcessor, SimulatorExecutor};

/// Architecture of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeArch {
    /// Number of wires.
    pub n_wires: u32,
    /// Named encoder op list.
    pub encoder_op_list_name: String,
    /// Named variational layer.
    pub q_layer_name: String,
    /// Times the layer block is repeated.
    #[serde(default = "default_n_blocks")]
    pub n_blocks: usize,
    /// Seed for weight initialisation; random if absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl NodeArch {
    /// Architecture with one block and random initial weights.
    pub fn new(
        n_wires: u32,
        encoder_op_list_name: impl Into<String>,
        q_layer_name: impl Into<String>,
    ) -> Self {
        Self {
            n_wires,
            encoder_op_list_name: encoder_op_list_name.into(),
            q_layer_name: q_layer_name.into(),
            n_blocks: default_n_blocks(),
            seed: None,
        }
    }

    /// Set the block count.
    pub fn with_blocks(mut self, n_blocks: usize) -> Self {
        self.n_blocks = n_blocks;
        self
    }

    /// Make weight initialisation reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check names and wire counts; returns the encoder's input width.
    pub fn validate(&self) -> NodeResult<usize> {
        if self.n_wires == 0 {
            return Err(NodeError::Config("n_wires must be positive".into()));
        }
        if !LAYER_NAMES.contains(&self.q_layer_name.as_str()) {
            return Err(NodeError::UnknownLayer(self.q_layer_name.clone()));
        }
        let encoder = GeneralEncoder::from_name(&self.encoder_op_list_name)?;
        if encoder.min_wires() > self.n_wires {
            return Err(NodeError::Config(format!(
                "encoder '{}' needs {} wires, node has {}",
                self.encoder_op_list_name,
                encoder.min_wires(),
                self.n_wires
            )));
        }
        Ok(encoder.n_inputs())
    }
}

/// Where circuits run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendChoice {
    /// Exact statevector expectations.
    #[default]
    Simulator,
    /// Shot-sampled execution through the backend job interface.
    Hardware {
        /// Shots per circuit.
        #[serde(default = "default_shots")]
        shots: u32,
        /// Cap on circuits per job.
        #[serde(default)]
        max_circuits_per_job: Option<usize>,
        /// Symmetric per-bit readout error.
        #[serde(default)]
        readout_error: f64,
        /// Sampling seed.
        #[serde(default)]
        seed: Option<u64>,
        /// Largest circuit the backend accepts.
        #[serde(default)]
        max_qubits: Option<u32>,
    },
}

impl BackendChoice {
    /// Build the executor for this choice.
    pub fn executor(&self) -> NodeResult<Arc<dyn CircuitExecutor>> {
        match self {
            BackendChoice::Simulator => Ok(Arc::new(SimulatorExecutor::new())),
            BackendChoice::Hardware {
                shots,
                max_circuits_per_job,
                readout_error,
                seed,
                max_qubits,
            } => {
                let mut config = BackendConfig::new("sampler")
                    .with_extra("readout_error", serde_json::json!(readout_error));
                if let Some(seed) = seed {
                    config = config.with_extra("seed", serde_json::json!(seed));
                }
                if let Some(max_qubits) = max_qubits {
                    config = config.with_extra("max_qubits", serde_json::json!(max_qubits));
                }
                let backend = Arc::new(SimulatorBackend::from_config(config)?);
                let mut processor = HardwareProcessor::new(backend, *shots);
                if let Some(n) = max_circuits_per_job {
                    processor = processor.with_max_circuits_per_job(*n);
                }
                info!(
                    "Using shot-based backend: {} shots, {} circuits per job",
                    processor.shots(),
                    processor.max_circuits_per_job()
                );
                Ok(Arc::new(processor))
            }
        }
    }
}

/// A full node pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Node architectures, in order.
    pub nodes: Vec<NodeArch>,
    /// Normalization between nodes.
    #[serde(default)]
    pub act_norm: ActNorm,
    /// Activation noise.
    #[serde(default)]
    pub noise: Option<ActivationNoise>,
    /// Execution backend.
    #[serde(default)]
    pub backend: BackendChoice,
    /// Mini-batch size for training; whole input if absent.
    #[serde(default)]
    pub batch: Option<usize>,
}

impl PipelineConfig {
    /// Parse YAML and validate.
    pub fn from_yaml_str(yaml: &str) -> NodeResult<Self> {
        let config: PipelineConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file and validate.
    pub fn from_file<P: AsRef<Path>>(path: P) -> NodeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Apply `QNODE_*` environment overrides.
    pub fn with_env_overrides(self) -> NodeResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> NodeResult<Self> {
        match var("QNODE_BACKEND").as_deref() {
            None => {}
            Some("simulator") => self.backend = BackendChoice::Simulator,
            Some("hardware") => {
                if self.backend == BackendChoice::Simulator {
                    self.backend = BackendChoice::Hardware {
                        shots: default_shots(),
                        max_circuits_per_job: None,
                        readout_error: 0.0,
                        seed: None,
                        max_qubits: None,
                    };
                }
            }
            Some(other) => {
                return Err(NodeError::Config(format!("QNODE_BACKEND: unknown backend '{other}'")));
            }
        }
        if let BackendChoice::Hardware { shots, seed, .. } = &mut self.backend {
            if let Some(v) = var("QNODE_SHOTS") {
                *shots = v
                    .parse()
                    .map_err(|e| NodeError::Config(format!("QNODE_SHOTS: {e}")))?;
            }
            if let Some(v) = var("QNODE_SEED") {
                *seed = Some(
                    v.parse()
                        .map_err(|e| NodeError::Config(format!("QNODE_SEED: {e}")))?,
                );
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the node chain, noise model and backend settings.
    pub fn validate(&self) -> NodeResult<()> {
        if self.nodes.is_empty() {
            return Err(NodeError::Config("at least one node is required".into()));
        }
        for (k, arch) in self.nodes.iter().enumerate() {
            let n_inputs = arch.validate()?;
            if k > 0 && n_inputs != self.nodes[k - 1].n_wires as usize {
                return Err(NodeError::Config(format!(
                    "node {k} encoder '{}' reads {n_inputs} inputs, previous node outputs {}",
                    arch.encoder_op_list_name,
                    self.nodes[k - 1].n_wires
                )));
            }
        }
        if let Some(noise) = &self.noise {
            noise.validate()?;
            if noise.mean.len() < self.nodes.len() {
                return Err(NodeError::Noise(format!(
                    "noise configured for {} nodes, pipeline has {}",
                    noise.mean.len(),
                    self.nodes.len()
                )));
            }
        }
        if let BackendChoice::Hardware {
            shots,
            readout_error,
            max_circuits_per_job,
            ..
        } = &self.backend
        {
            if *shots == 0 {
                return Err(NodeError::Config("shots must be positive".into()));
            }
            if !(0.0..=1.0).contains(readout_error) {
                return Err(NodeError::Config(format!(
                    "readout_error must be in [0, 1], got {readout_error}"
                )));
            }
            if *max_circuits_per_job == Some(0) {
                return Err(NodeError::Config("max_circuits_per_job must be positive".into()));
            }
        }
        if self.batch == Some(0) {
            return Err(NodeError::Config("batch must be positive".into()));
        }
        Ok(())
    }

    /// Input width the first node expects.
    pub fn n_inputs(&self) -> NodeResult<usize> {
        self.nodes
            .first()
            .ok_or_else(|| NodeError::Config("at least one node is required".into()))?
            .validate()
    }

    /// Check a data batch of width `width` fits the first node.
    pub fn validate_input_width(&self, width: usize) -> NodeResult<()> {
        let n_inputs = self.n_inputs()?;
        if width < n_inputs {
            return Err(NodeError::ShapeMismatch(format!(
                "first node reads {n_inputs} input columns, data has {width}"
            )));
        }
        Ok(())
    }

    /// Row ranges of the training mini-batches for `n_rows` samples.
    ///
    /// A single leftover row is folded into the previous batch, since batch
    /// statistics need at least two samples.
    pub fn mini_batches(&self, n_rows: usize) -> Vec<Range<usize>> {
        let size = self.batch.unwrap_or(n_rows).clamp(1, n_rows.max(1));
        let mut ranges: Vec<Range<usize>> = (0..n_rows)
            .step_by(size)
            .map(|start| start..(start + size).min(n_rows))
            .collect();
        if ranges.len() > 1 && ranges.last().is_some_and(|r| r.len() == 1) {
            if let Some(tail) = ranges.pop() {
                if let Some(prev) = ranges.last_mut() {
                    prev.end = tail.end;
                }
            }
        }
        ranges
    }

    /// Build the node list with the configured noise model attached.
    pub fn build_nodes(&self) -> NodeResult<QuantumNodeList> {
        let mut nodes = crate::node::build_nodes(&self.nodes, self.act_norm)?;
        nodes.set_noise_model(self.noise.clone());
        Ok(nodes)
    }

    /// Build the configured executor.
    pub fn executor(&self) -> NodeResult<Arc<dyn CircuitExecutor>> {
        self.backend.executor()
    }
}

fn default_n_blocks() -> usize {
    1
}

fn default_shots() -> u32 {
    1024
}
