//! Error types for quantum nodes.

use qnode_hal::HalError;
use qnode_ir::IrError;
use thiserror::Error;

/// Errors that can occur while building or running quantum nodes.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    /// Circuit construction or binding failed.
    #[error("Circuit error: {0}")]
    Ir(#[from] IrError),

    /// Backend execution failed.
    #[error("Backend error: {0}")]
    Hal(#[from] HalError),

    /// Encoder op list name not recognised.
    #[error("Unknown encoder op list '{0}'")]
    UnknownEncoder(String),

    /// Variational layer name not recognised.
    #[error("Unknown quantum layer '{0}'")]
    UnknownLayer(String),

    /// Activation normalization name not recognised.
    #[error("Unknown activation norm '{0}'")]
    UnknownNorm(String),

    /// Tensor shapes do not line up.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Activations cannot be normalized (zero or non-finite spread).
    #[error("Degenerate activations: {0}")]
    DegenerateActivations(String),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Activation noise model misconfigured.
    #[error("Noise model error: {0}")]
    Noise(String),

    /// `backward` called before `shift_and_run`.
    #[error("Node {0} has no parameter-shift gradients; run shift_and_run first")]
    MissingGradients(usize),
}

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
