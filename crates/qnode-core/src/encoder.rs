//! Classical-to-quantum encoders.
//!
//! An encoder is an ordered list of single-angle rotations, each reading one
//! column of the input row. Named op lists:
//!
//! | Name | Inputs | Wires | Layout |
//! |------|--------|-------|--------|
//! | `4x4_ryzxy` | 16 | 4 | RY, RZ, RX, RY on wires 0..4 |
//! | `3x3_ryzxy` | 9 | 4 | RY, RZ on wires 0..4, RX on wire 0 |
//! | `10_ryzxy` | 10 | 4 | RY, RZ on wires 0..4, RX on wires 0..2 |
//! | `2x2_ryzxy` | 4 | 2 | RY, RZ on wires 0..2 |
//! | `{n}_ry`, `{n}_rx`, `{n}_rz` | n | n | one rotation per wire |

use qnode_ir::{GateOp, ParametricCircuit};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};

/// Fixed encoder names, for listing.
pub const NAMED_ENCODERS: [&str; 4] = ["4x4_ryzxy", "3x3_ryzxy", "10_ryzxy", "2x2_ryzxy"];

/// One data-bound rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderOp {
    /// Rotation gate (`rx`, `ry`, `rz`, ...).
    pub func: GateOp,
    /// Input column feeding the angle.
    pub input_idx: usize,
    /// Wires the rotation acts on.
    pub wires: Vec<u32>,
}

impl EncoderOp {
    fn new(func: GateOp, input_idx: usize, wire: u32) -> Self {
        Self {
            func,
            input_idx,
            wires: vec![wire],
        }
    }
}

/// Encoder built from an op list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralEncoder {
    name: String,
    ops: Vec<EncoderOp>,
}

impl GeneralEncoder {
    /// Build an encoder from explicit ops.
    pub fn new(name: impl Into<String>, ops: Vec<EncoderOp>) -> NodeResult<Self> {
        let name = name.into();
        for op in &ops {
            if op.func.num_params() != 1 {
                return Err(NodeError::Config(format!(
                    "encoder '{name}': gate '{}' must take exactly one angle",
                    op.func
                )));
            }
        }
        Ok(Self { name, ops })
    }

    /// Look up a named op list.
    pub fn from_name(name: &str) -> NodeResult<Self> {
        let ops = match name {
            "4x4_ryzxy" => layered(&[GateOp::Ry, GateOp::Rz, GateOp::Rx, GateOp::Ry], 4, 16),
            "3x3_ryzxy" => layered(&[GateOp::Ry, GateOp::Rz, GateOp::Rx], 4, 9),
            "10_ryzxy" => layered(&[GateOp::Ry, GateOp::Rz, GateOp::Rx], 4, 10),
            "2x2_ryzxy" => layered(&[GateOp::Ry, GateOp::Rz], 2, 4),
            other => single_rotation(other)
                .ok_or_else(|| NodeError::UnknownEncoder(other.to_string()))?,
        };
        Self::new(name, ops)
    }

    /// Encoder name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ops in application order.
    pub fn ops(&self) -> &[EncoderOp] {
        &self.ops
    }

    /// Width of the data row this encoder reads.
    pub fn n_inputs(&self) -> usize {
        self.ops.iter().map(|op| op.input_idx + 1).max().unwrap_or(0)
    }

    /// Highest wire touched, plus one.
    pub fn min_wires(&self) -> u32 {
        self.ops
            .iter()
            .flat_map(|op| op.wires.iter().map(|w| w + 1))
            .max()
            .unwrap_or(0)
    }

    /// Append the encoding rotations to `circuit`.
    pub fn append_to(&self, circuit: &mut ParametricCircuit) -> NodeResult<()> {
        for op in &self.ops {
            circuit.push_input(op.func, &op.wires, op.input_idx)?;
        }
        Ok(())
    }
}

/// Rotations cycling through `gates`, `n_wires` per gate, until `n_inputs` are used.
fn layered(gates: &[GateOp], n_wires: u32, n_inputs: usize) -> Vec<EncoderOp> {
    (0..n_inputs)
        .map(|i| {
            let gate = gates[(i / n_wires as usize) % gates.len()];
            EncoderOp::new(gate, i, (i % n_wires as usize) as u32)
        })
        .collect()
}

/// `{n}_ry`, `{n}_rx`, `{n}_rz`.
fn single_rotation(name: &str) -> Option<Vec<EncoderOp>> {
    let (count, gate) = name.split_once('_')?;
    let gate = match gate {
        "rx" => GateOp::Rx,
        "ry" => GateOp::Ry,
        "rz" => GateOp::Rz,
        _ => return None,
    };
    let n: u32 = count.parse().ok().filter(|&n| n > 0)?;
    Some((0..n).map(|w| EncoderOp::new(gate, w as usize, w)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_4x4_layout() {
        let enc = GeneralEncoder::from_name("4x4_ryzxy").unwrap();
        assert_eq!(enc.n_inputs(), 16);
        assert_eq!(enc.min_wires(), 4);
        let ops = enc.ops();
        assert_eq!(ops[0], EncoderOp::new(GateOp::Ry, 0, 0));
        assert_eq!(ops[5], EncoderOp::new(GateOp::Rz, 5, 1));
        assert_eq!(ops[10], EncoderOp::new(GateOp::Rx, 10, 2));
        assert_eq!(ops[15], EncoderOp::new(GateOp::Ry, 15, 3));
    }

    #[test]
    fn test_partial_layouts() {
        let enc = GeneralEncoder::from_name("3x3_ryzxy").unwrap();
        assert_eq!(enc.n_inputs(), 9);
        assert_eq!(enc.ops()[8], EncoderOp::new(GateOp::Rx, 8, 0));

        let enc = GeneralEncoder::from_name("10_ryzxy").unwrap();
        assert_eq!(enc.n_inputs(), 10);
        assert_eq!(enc.ops()[9], EncoderOp::new(GateOp::Rx, 9, 1));

        let enc = GeneralEncoder::from_name("2x2_ryzxy").unwrap();
        assert_eq!(enc.min_wires(), 2);
    }

    #[test]
    fn test_single_rotation_family() {
        let enc = GeneralEncoder::from_name("6_rx").unwrap();
        assert_eq!(enc.n_inputs(), 6);
        assert!(enc.ops().iter().all(|op| op.func == GateOp::Rx));
        assert!(GeneralEncoder::from_name("0_ry").is_err());
        assert!(GeneralEncoder::from_name("4_cx").is_err());
    }

    #[test]
    fn test_unknown_encoder() {
        let err = GeneralEncoder::from_name("amplitude").unwrap_err();
        assert!(matches!(err, NodeError::UnknownEncoder(name) if name == "amplitude"));
    }

    #[test]
    fn test_append_checks_wires() {
        let enc = GeneralEncoder::from_name("4_ry").unwrap();
        let mut narrow = ParametricCircuit::new("narrow", 2);
        assert!(matches!(enc.append_to(&mut narrow), Err(NodeError::Ir(_))));

        let mut c = ParametricCircuit::new("ok", 4);
        enc.append_to(&mut c).unwrap();
        assert_eq!(c.num_inputs(), 4);
        assert_eq!(c.num_trainable(), 0);
    }

    #[test]
    fn test_rejects_multi_angle_gate() {
        let op = EncoderOp::new(GateOp::U3, 0, 0);
        assert!(GeneralEncoder::new("bad", vec![op]).is_err());
    }
}
