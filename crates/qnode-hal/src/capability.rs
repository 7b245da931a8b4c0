//! Backend capability introspection.

use serde::{Deserialize, Serialize};

use qnode_ir::Circuit;

/// Hardware capabilities of a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Name of the backend.
    pub name: String,
    /// Number of qubits available.
    pub num_qubits: u32,
    /// Supported gate names.
    pub gate_set: GateSet,
    /// Maximum number of shots per circuit.
    pub max_shots: u32,
    /// Maximum number of circuits accepted in one job.
    pub max_circuits_per_job: usize,
    /// Whether this is a simulator (`true`) or real hardware (`false`).
    pub is_simulator: bool,
}

impl Capabilities {
    /// Capabilities of a local sampling simulator.
    pub fn simulator(num_qubits: u32) -> Self {
        Self {
            name: "simulator".into(),
            num_qubits,
            gate_set: GateSet::universal(),
            max_shots: 100_000,
            max_circuits_per_job: 1_000,
            is_simulator: true,
        }
    }

    /// Check a circuit against qubit count and gate set.
    ///
    /// Returns the list of violations; empty means the circuit fits.
    pub fn violations(&self, circuit: &Circuit) -> Vec<String> {
        let mut reasons = Vec::new();
        if circuit.num_qubits() > self.num_qubits as usize {
            reasons.push(format!(
                "circuit '{}' uses {} qubits, backend has {}",
                circuit.name(),
                circuit.num_qubits(),
                self.num_qubits
            ));
        }
        for gate in circuit.gate_names() {
            if !self.gate_set.contains(gate) {
                reasons.push(format!("gate '{gate}' not supported by {}", self.name));
            }
        }
        reasons
    }
}

/// Gates a backend accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateSet {
    /// Single-qubit gates supported.
    pub single_qubit: Vec<String>,
    /// Two-qubit gates supported.
    pub two_qubit: Vec<String>,
}

impl GateSet {
    /// Every gate of the qnode IR.
    pub fn universal() -> Self {
        let mut set = Self::default();
        for gate in qnode_ir::GateOp::ALL {
            let name = gate.name().to_string();
            if gate.num_qubits() == 1 {
                set.single_qubit.push(name);
            } else {
                set.two_qubit.push(name);
            }
        }
        set
    }

    /// Create a gate set from explicit lists.
    pub fn new(single_qubit: &[&str], two_qubit: &[&str]) -> Self {
        Self {
            single_qubit: single_qubit.iter().map(|s| (*s).to_string()).collect(),
            two_qubit: two_qubit.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Check if a gate name is supported.
    pub fn contains(&self, gate: &str) -> bool {
        self.single_qubit.iter().any(|g| g == gate) || self.two_qubit.iter().any(|g| g == gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnode_ir::{GateOp, ParametricCircuit};

    #[test]
    fn test_universal_contains_all() {
        let set = GateSet::universal();
        for gate in GateOp::ALL {
            assert!(set.contains(gate.name()));
        }
    }

    #[test]
    fn test_violations() {
        let mut template = ParametricCircuit::new("c", 3);
        template.push_trainable(GateOp::Cu3, &[0, 2]).unwrap();
        let circuit = template.bind(&[], &[0.1, 0.2, 0.3]).unwrap();

        let mut caps = Capabilities::simulator(2);
        caps.gate_set = GateSet::new(&["rz", "sx"], &["cx"]);
        let reasons = caps.violations(&circuit);
        assert_eq!(reasons.len(), 2);

        assert!(Capabilities::simulator(5).violations(&circuit).is_empty());
    }
}
