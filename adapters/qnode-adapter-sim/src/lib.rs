//! qnode Local Simulator
//!
//! This crate provides the two execution engines used by the quantum node:
//!
//! - [`Statevector`]: exact simulation. The node's simulator path reads
//!   ⟨Z⟩ on every wire straight from the final amplitudes.
//! - [`SimulatorBackend`]: a [`qnode_hal::Backend`] that samples shots from
//!   the final distribution, optionally with symmetric readout error. It
//!   exercises the hardware-in-the-loop path without a device.
//!
//! # Performance
//!
//! | Qubits | Memory | Simulation Speed |
//! |--------|--------|------------------|
//! | 10 | ~16 KB | Instant |
//! | 15 | ~512 KB | Fast |
//! | 20 | ~16 MB | Moderate |
//! | 25 | ~512 MB | Slow |
//!
//! # Example
//!
//! ```ignore
//! use qnode_adapter_sim::SimulatorBackend;
//! use qnode_hal::Backend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SimulatorBackend::new().with_readout_error(0.02).with_seed(7);
//!     let job_id = backend.submit(&circuits, 4096).await?;
//!     let result = backend.wait(&job_id).await?;
//!     println!("{:?}", result.expectations_z(4));
//!     Ok(())
//! }
//! ```

mod simulator;
mod statevector;

pub use simulator::SimulatorBackend;
pub use statevector::Statevector;
