//! Parameterized circuits and their bound form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{IrError, IrResult};
use crate::gate::{GateOp, ShiftRule};
use crate::parameter::ParamSource;
use crate::qubit::QubitId;

/// A gate whose angles are still symbolic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// The gate.
    pub gate: GateOp,
    /// Wires the gate acts on (control first for controlled gates).
    pub qubits: Vec<QubitId>,
    /// One source per angle.
    pub params: Vec<ParamSource>,
}

/// A circuit template: gates with angles drawn from inputs and weights.
///
/// Every call to [`ParametricCircuit::push_trainable`] allocates fresh
/// trainable indices, so each weight feeds exactly one gate angle and the
/// per-gate shift rule is exact for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricCircuit {
    name: String,
    num_qubits: u32,
    ops: Vec<Operation>,
    num_trainable: usize,
}

impl ParametricCircuit {
    /// Create an empty circuit on `num_qubits` wires.
    pub fn new(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            ops: Vec::new(),
            num_trainable: 0,
        }
    }

    /// Circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of wires.
    pub fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    /// Operations in application order.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if the circuit has no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Number of trainable angles allocated so far.
    pub fn num_trainable(&self) -> usize {
        self.num_trainable
    }

    /// Append a gate with explicit angle sources.
    pub fn push(
        &mut self,
        gate: GateOp,
        qubits: &[u32],
        params: Vec<ParamSource>,
    ) -> IrResult<&mut Self> {
        let expected = gate.num_qubits();
        if qubits.len() != expected as usize {
            return Err(IrError::QubitCountMismatch {
                gate,
                expected,
                got: qubits.len() as u32,
            });
        }
        if params.len() != gate.num_params() {
            return Err(IrError::ParamCountMismatch {
                gate,
                expected: gate.num_params(),
                got: params.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for &q in qubits {
            if q >= self.num_qubits {
                return Err(IrError::QubitOutOfRange {
                    qubit: QubitId(q),
                    num_qubits: self.num_qubits,
                    gate,
                });
            }
            if !seen.insert(q) {
                return Err(IrError::DuplicateQubit {
                    qubit: QubitId(q),
                    gate,
                });
            }
        }
        for p in &params {
            if let ParamSource::Trainable(i) = p {
                self.num_trainable = self.num_trainable.max(i + 1);
            }
        }
        self.ops.push(Operation {
            gate,
            qubits: qubits.iter().map(|&q| QubitId(q)).collect(),
            params,
        });
        Ok(self)
    }

    /// Append a gate with no angles.
    pub fn push_fixed(&mut self, gate: GateOp, qubits: &[u32]) -> IrResult<&mut Self> {
        self.push(gate, qubits, Vec::new())
    }

    /// Append a gate whose angles are all new trainable weights.
    pub fn push_trainable(&mut self, gate: GateOp, qubits: &[u32]) -> IrResult<&mut Self> {
        let start = self.num_trainable;
        let params = (start..start + gate.num_params())
            .map(ParamSource::Trainable)
            .collect();
        self.push(gate, qubits, params)
    }

    /// Append a single-angle gate bound to input column `input`.
    pub fn push_input(&mut self, gate: GateOp, qubits: &[u32], input: usize) -> IrResult<&mut Self> {
        self.push(gate, qubits, vec![ParamSource::Input(input)])
    }

    /// Apply Hadamard gate.
    pub fn h(&mut self, qubit: u32) -> IrResult<&mut Self> {
        self.push_fixed(GateOp::H, &[qubit])
    }

    /// Apply CNOT gate.
    pub fn cx(&mut self, control: u32, target: u32) -> IrResult<&mut Self> {
        self.push_fixed(GateOp::CX, &[control, target])
    }

    /// Apply CZ gate.
    pub fn cz(&mut self, control: u32, target: u32) -> IrResult<&mut Self> {
        self.push_fixed(GateOp::CZ, &[control, target])
    }

    /// Input columns referenced anywhere in the circuit, ascending.
    pub fn input_indices(&self) -> Vec<usize> {
        let set: BTreeSet<usize> = self
            .ops
            .iter()
            .flat_map(|op| op.params.iter().filter_map(ParamSource::as_input))
            .collect();
        set.into_iter().collect()
    }

    /// Width of the data row this circuit reads.
    pub fn num_inputs(&self) -> usize {
        self.input_indices().last().map_or(0, |&i| i + 1)
    }

    /// Shift rule for each trainable weight, indexed by weight.
    pub fn trainable_shift_rules(&self) -> Vec<ShiftRule> {
        let mut rules = vec![ShiftRule::TwoTerm; self.num_trainable];
        for op in &self.ops {
            for (slot, p) in op.params.iter().enumerate() {
                if let (Some(i), Some(rule)) = (p.as_trainable(), op.gate.shift_rule(slot)) {
                    rules[i] = rules[i].combine(rule);
                }
            }
        }
        rules
    }

    /// Shift rule for input column `input`.
    pub fn input_shift_rule(&self, input: usize) -> ShiftRule {
        self.ops
            .iter()
            .flat_map(|op| {
                op.params
                    .iter()
                    .enumerate()
                    .filter(move |(_, p)| p.as_input() == Some(input))
                    .filter_map(move |(slot, _)| op.gate.shift_rule(slot))
            })
            .fold(ShiftRule::TwoTerm, ShiftRule::combine)
    }

    /// Resolve every angle against one data row and the weights.
    pub fn bind(&self, inputs: &[f64], weights: &[f64]) -> IrResult<Circuit> {
        let instructions = self
            .ops
            .iter()
            .map(|op| {
                let angles = op
                    .params
                    .iter()
                    .map(|p| p.resolve(inputs, weights))
                    .collect::<IrResult<Vec<_>>>()?;
                Ok(Instruction {
                    gate: op.gate,
                    qubits: op.qubits.clone(),
                    angles,
                })
            })
            .collect::<IrResult<Vec<_>>>()?;
        Ok(Circuit {
            name: self.name.clone(),
            num_qubits: self.num_qubits,
            instructions,
        })
    }
}

/// A gate with concrete angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The gate.
    pub gate: GateOp,
    /// Wires the gate acts on.
    pub qubits: Vec<QubitId>,
    /// Concrete angles, one per gate parameter.
    pub angles: Vec<f64>,
}

/// A fully bound circuit, ready for a simulator or a backend.
///
/// Measurement of every wire in the Z basis is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    name: String,
    num_qubits: u32,
    instructions: Vec<Instruction>,
}

impl Circuit {
    /// Build directly from instructions.
    pub fn from_instructions(
        name: impl Into<String>,
        num_qubits: u32,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            instructions,
        }
    }

    /// Circuit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of wires.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits as usize
    }

    /// Instructions in application order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of gate operations.
    pub fn num_ops(&self) -> usize {
        self.instructions.len()
    }

    /// Distinct gate names used by the circuit.
    pub fn gate_names(&self) -> BTreeSet<&'static str> {
        self.instructions.iter().map(|i| i.gate.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_template() -> ParametricCircuit {
        let mut c = ParametricCircuit::new("t", 2);
        c.push_input(GateOp::Ry, &[0], 0).unwrap();
        c.push_input(GateOp::Ry, &[1], 1).unwrap();
        c.push_trainable(GateOp::U3, &[0]).unwrap();
        c.push_trainable(GateOp::Cu3, &[0, 1]).unwrap();
        c.cx(1, 0).unwrap();
        c
    }

    #[test]
    fn test_trainable_allocation() {
        let c = small_template();
        assert_eq!(c.num_trainable(), 6);
        assert_eq!(c.len(), 5);
        assert_eq!(c.num_inputs(), 2);
        assert_eq!(c.input_indices(), vec![0, 1]);
    }

    #[test]
    fn test_shift_rules() {
        let c = small_template();
        let rules = c.trainable_shift_rules();
        assert_eq!(rules[..3], [ShiftRule::TwoTerm; 3]);
        assert_eq!(rules[3], ShiftRule::FourTerm);
        assert_eq!(rules[4], ShiftRule::TwoTerm);
        assert_eq!(c.input_shift_rule(0), ShiftRule::TwoTerm);
    }

    #[test]
    fn test_bind() {
        let c = small_template();
        let bound = c.bind(&[0.3, 0.4], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        assert_eq!(bound.num_qubits(), 2);
        assert_eq!(bound.num_ops(), 5);
        assert_eq!(bound.instructions()[1].angles, vec![0.4]);
        assert_eq!(bound.instructions()[3].angles, vec![4.0, 5.0, 6.0]);
        assert!(bound.gate_names().contains("cu3"));
    }

    #[test]
    fn test_bind_missing_weights() {
        let c = small_template();
        let err = c.bind(&[0.3, 0.4], &[1.0]).unwrap_err();
        assert!(matches!(err, IrError::WeightOutOfRange { .. }));
    }

    #[test]
    fn test_push_validation() {
        let mut c = ParametricCircuit::new("bad", 2);
        assert!(matches!(
            c.push_fixed(GateOp::CX, &[0]),
            Err(IrError::QubitCountMismatch { .. })
        ));
        assert!(matches!(
            c.push_fixed(GateOp::CX, &[1, 1]),
            Err(IrError::DuplicateQubit { .. })
        ));
        assert!(matches!(
            c.push_fixed(GateOp::H, &[2]),
            Err(IrError::QubitOutOfRange { .. })
        ));
        assert!(matches!(
            c.push(GateOp::Rx, &[0], vec![]),
            Err(IrError::ParamCountMismatch { .. })
        ));
        assert!(c.is_empty());
    }

    #[test]
    fn test_serde_roundtrip() {
        let bound = small_template()
            .bind(&[0.1, 0.2], &[0.0; 6])
            .unwrap();
        let json = serde_json::to_string(&bound).unwrap();
        let back: Circuit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bound);
    }
}
