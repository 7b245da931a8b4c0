//! CLI command implementations.

pub mod common;
pub mod forward;
pub mod grad;
pub mod layers;
pub mod train;
pub mod version;
