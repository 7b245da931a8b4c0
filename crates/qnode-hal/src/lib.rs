//! qnode Hardware Abstraction Layer
//!
//! This crate provides the interface the quantum node uses to run circuits on
//! something other than the built-in exact simulator: a shot-based simulator,
//! or real hardware behind a provider API.
//!
//! # Overview
//!
//! - A common [`Backend`] trait for batch job submission and management
//! - [`Capabilities`] to describe qubit count, gate set and job limits
//! - Unified result handling via [`ExecutionResult`] and [`Counts`]
//!
//! Jobs are batches: the parameter-shift rule needs many closely related
//! circuits, and hardware providers charge per job rather than per circuit.
//!
//! # Example: Running a Batch
//!
//! ```ignore
//! use qnode_hal::Backend;
//! use qnode_adapter_sim::SimulatorBackend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SimulatorBackend::new();
//!     let job_id = backend.submit(&circuits, 2048).await?;
//!     let result = backend.wait(&job_id).await?;
//!     for z in result.expectations_z(4) {
//!         println!("{z:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod capability;
pub mod error;
pub mod job;
pub mod result;

pub use backend::{Backend, BackendAvailability, BackendConfig, BackendFactory, ValidationResult};
pub use capability::{Capabilities, GateSet};
pub use error::{HalError, HalResult};
pub use job::{Job, JobId, JobStatus};
pub use result::{Counts, ExecutionResult};
