//! Trainable variational layers.

use qnode_ir::{GateOp, ParametricCircuit};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use tracing::debug;

use crate::config::NodeArch;
use crate::error::{NodeError, NodeResult};

/// Known layer names.
pub const LAYER_NAMES: [&str; 7] = [
    "u3cu3_s0",
    "rxyzcx_s0",
    "seth_s0",
    "barren_s0",
    "farhi_s0",
    "cu3_s0",
    "ryrycx",
];

/// A block-structured ansatz with its own weight vector.
///
/// Every trainable gate angle is a distinct weight, so the gradient of each
/// weight is given exactly by the shift rule of the gate it feeds.
#[derive(Debug, Clone)]
pub struct VariationalLayer {
    name: String,
    n_blocks: usize,
    circuit: ParametricCircuit,
    weights: Vec<f64>,
}

impl VariationalLayer {
    /// Build the layer described by a node architecture.
    pub fn from_arch(arch: &NodeArch) -> NodeResult<Self> {
        let mut rng = arch
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self::new(&arch.q_layer_name, arch.n_wires, arch.n_blocks, &mut rng)
    }

    /// Build a named layer, drawing initial weights uniformly from `[-π, π)`.
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        n_wires: u32,
        n_blocks: usize,
        rng: &mut R,
    ) -> NodeResult<Self> {
        if n_wires == 0 {
            return Err(NodeError::Config("layer needs at least one wire".into()));
        }
        let mut circuit = ParametricCircuit::new(name, n_wires);
        match name {
            "u3cu3_s0" => build_u3cu3(&mut circuit, n_blocks)?,
            "rxyzcx_s0" => build_rxyzcx(&mut circuit, n_blocks)?,
            "seth_s0" => build_seth(&mut circuit, n_blocks)?,
            "barren_s0" => build_barren(&mut circuit, n_blocks)?,
            "farhi_s0" => build_farhi(&mut circuit, n_blocks)?,
            "cu3_s0" => build_cu3(&mut circuit, n_blocks)?,
            "ryrycx" => build_ryrycx(&mut circuit, n_blocks)?,
            other => return Err(NodeError::UnknownLayer(other.to_string())),
        }
        let weights = (0..circuit.num_trainable())
            .map(|_| rng.gen_range(-PI..PI))
            .collect::<Vec<_>>();
        debug!(layer = name, n_wires, n_blocks, n_params = weights.len(), "built variational layer");
        Ok(Self {
            name: name.to_string(),
            n_blocks,
            circuit,
            weights,
        })
    }

    /// Layer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of repeated blocks.
    pub fn n_blocks(&self) -> usize {
        self.n_blocks
    }

    /// Number of wires.
    pub fn n_wires(&self) -> u32 {
        self.circuit.num_qubits()
    }

    /// Number of trainable scalars.
    pub fn num_params(&self) -> usize {
        self.weights.len()
    }

    /// Current weights.
    pub fn parameters(&self) -> &[f64] {
        &self.weights
    }

    /// Mutable weights, for optimizers.
    pub fn parameters_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Replace all weights.
    pub fn set_parameters(&mut self, weights: &[f64]) -> NodeResult<()> {
        if weights.len() != self.weights.len() {
            return Err(NodeError::ShapeMismatch(format!(
                "layer '{}' has {} parameters, got {}",
                self.name,
                self.weights.len(),
                weights.len()
            )));
        }
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    /// Append the layer's gates to `circuit`.
    ///
    /// Weight indices are kept as-is, so `circuit` must not own any trainable
    /// angles yet.
    pub fn append_to(&self, circuit: &mut ParametricCircuit) -> NodeResult<()> {
        if circuit.num_trainable() != 0 {
            return Err(NodeError::Config(
                "variational layer must own every trainable angle".into(),
            ));
        }
        for op in self.circuit.ops() {
            let wires: Vec<u32> = op.qubits.iter().map(|q| q.0).collect();
            circuit.push(op.gate, &wires, op.params.clone())?;
        }
        Ok(())
    }
}

/// `(i, i+1 mod n)` for every wire.
fn ring(n: u32) -> Vec<(u32, u32)> {
    if n < 2 {
        return Vec::new();
    }
    (0..n).map(|i| (i, (i + 1) % n)).collect()
}

/// `(i, i+1)` without wrap-around.
fn ladder(n: u32) -> Vec<(u32, u32)> {
    (1..n).map(|i| (i - 1, i)).collect()
}

fn each_wire(c: &mut ParametricCircuit, gate: GateOp) -> NodeResult<()> {
    for w in 0..c.num_qubits() {
        c.push_trainable(gate, &[w])?;
    }
    Ok(())
}

fn each_pair(c: &mut ParametricCircuit, gate: GateOp, pairs: &[(u32, u32)]) -> NodeResult<()> {
    for &(a, b) in pairs {
        if gate.is_parameterized() {
            c.push_trainable(gate, &[a, b])?;
        } else {
            c.push_fixed(gate, &[a, b])?;
        }
    }
    Ok(())
}

fn build_u3cu3(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ring(c.num_qubits());
    for _ in 0..n_blocks {
        each_wire(c, GateOp::U3)?;
        each_pair(c, GateOp::Cu3, &pairs)?;
    }
    Ok(())
}

fn build_rxyzcx(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ring(c.num_qubits());
    for _ in 0..n_blocks {
        each_wire(c, GateOp::Rx)?;
        each_wire(c, GateOp::Ry)?;
        each_wire(c, GateOp::Rz)?;
        each_pair(c, GateOp::CX, &pairs)?;
    }
    Ok(())
}

fn build_seth(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ring(c.num_qubits());
    for _ in 0..n_blocks {
        each_pair(c, GateOp::Rzz, &pairs)?;
        each_wire(c, GateOp::Ry)?;
    }
    Ok(())
}

fn build_barren(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ladder(c.num_qubits());
    for w in 0..c.num_qubits() {
        c.h(w)?;
    }
    for _ in 0..n_blocks {
        each_wire(c, GateOp::Rx)?;
        each_wire(c, GateOp::Ry)?;
        each_wire(c, GateOp::Rz)?;
        each_pair(c, GateOp::CZ, &pairs)?;
    }
    Ok(())
}

fn build_farhi(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ring(c.num_qubits());
    for _ in 0..n_blocks {
        each_pair(c, GateOp::Rzx, &pairs)?;
        each_pair(c, GateOp::Rxx, &pairs)?;
    }
    Ok(())
}

fn build_cu3(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ring(c.num_qubits());
    for _ in 0..n_blocks {
        each_pair(c, GateOp::Cu3, &pairs)?;
    }
    Ok(())
}

fn build_ryrycx(c: &mut ParametricCircuit, n_blocks: usize) -> NodeResult<()> {
    let pairs = ladder(c.num_qubits());
    for _ in 0..n_blocks {
        each_wire(c, GateOp::Ry)?;
        each_pair(c, GateOp::CX, &pairs)?;
        each_wire(c, GateOp::Ry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnode_ir::ShiftRule;

    fn layer(name: &str, n_wires: u32, n_blocks: usize) -> VariationalLayer {
        let mut rng = StdRng::seed_from_u64(7);
        VariationalLayer::new(name, n_wires, n_blocks, &mut rng).unwrap()
    }

    #[test]
    fn test_param_counts() {
        // U3 (3) per wire + CU3 (3) per ring pair.
        assert_eq!(layer("u3cu3_s0", 4, 2).num_params(), 2 * (4 * 3 + 4 * 3));
        assert_eq!(layer("rxyzcx_s0", 4, 1).num_params(), 12);
        assert_eq!(layer("seth_s0", 3, 2).num_params(), 2 * (3 + 3));
        assert_eq!(layer("barren_s0", 4, 1).num_params(), 12);
        assert_eq!(layer("farhi_s0", 4, 1).num_params(), 8);
        assert_eq!(layer("cu3_s0", 2, 1).num_params(), 6);
        assert_eq!(layer("ryrycx", 4, 3).num_params(), 24);
    }

    #[test]
    fn test_single_wire_has_no_pairs() {
        assert_eq!(layer("u3cu3_s0", 1, 1).num_params(), 3);
        assert_eq!(layer("cu3_s0", 1, 2).num_params(), 0);
    }

    #[test]
    fn test_weights_in_range_and_seeded() {
        let a = layer("u3cu3_s0", 3, 2);
        let b = layer("u3cu3_s0", 3, 2);
        assert_eq!(a.parameters(), b.parameters());
        assert!(a.parameters().iter().all(|w| (-PI..PI).contains(w)));
    }

    #[test]
    fn test_unknown_layer() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = VariationalLayer::new("qaoa", 2, 1, &mut rng).unwrap_err();
        assert!(matches!(err, NodeError::UnknownLayer(_)));
    }

    #[test]
    fn test_append_preserves_indices() {
        let l = layer("cu3_s0", 3, 1);
        let mut c = ParametricCircuit::new("node", 3);
        c.push_input(GateOp::Ry, &[0], 0).unwrap();
        l.append_to(&mut c).unwrap();
        assert_eq!(c.num_trainable(), l.num_params());
        let rules = c.trainable_shift_rules();
        // CU3 θ, φ, λ per pair.
        assert_eq!(rules[0], ShiftRule::FourTerm);
        assert_eq!(rules[1], ShiftRule::TwoTerm);
        assert_eq!(rules[3], ShiftRule::FourTerm);

        assert!(l.append_to(&mut c).is_err());
    }

    #[test]
    fn test_set_parameters() {
        let mut l = layer("ryrycx", 2, 1);
        l.set_parameters(&[0.0; 4]).unwrap();
        assert!(l.parameters().iter().all(|&w| w == 0.0));
        l.parameters_mut()[1] = 0.5;
        assert_eq!(l.parameters()[1], 0.5);
        assert!(l.set_parameters(&[0.0]).is_err());
    }
}
