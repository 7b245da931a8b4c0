//! Gate set and parameter-shift rules.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, SQRT_2};
use std::fmt;

use crate::error::{IrError, IrResult};

/// Gates understood by the encoders, variational layers and the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateOp {
    // Fixed single-qubit gates
    /// Hadamard gate.
    H,
    /// Pauli-X gate.
    X,
    /// Pauli-Y gate.
    Y,
    /// Pauli-Z gate.
    Z,
    /// S gate (sqrt(Z)).
    S,
    /// T gate (fourth root of Z).
    T,
    /// sqrt(X) gate.
    SX,

    // Parameterized single-qubit gates
    /// Rotation around X axis.
    Rx,
    /// Rotation around Y axis.
    Ry,
    /// Rotation around Z axis.
    Rz,
    /// Phase gate diag(1, e^{iθ}).
    Phase,
    /// U3(θ, φ, λ) = P(φ) · RY(θ) · P(λ).
    U3,

    // Fixed two-qubit gates
    /// Controlled-X (CNOT) gate.
    CX,
    /// Controlled-Z gate.
    CZ,
    /// SWAP gate.
    Swap,

    // Parameterized two-qubit gates
    /// Controlled rotation around X.
    Crx,
    /// Controlled rotation around Y.
    Cry,
    /// Controlled rotation around Z.
    Crz,
    /// Controlled U3.
    Cu3,
    /// XX rotation exp(-iθ/2 X⊗X).
    Rxx,
    /// ZZ rotation exp(-iθ/2 Z⊗Z).
    Rzz,
    /// ZX rotation exp(-iθ/2 Z⊗X).
    Rzx,
}

impl GateOp {
    /// All gates, in declaration order.
    pub const ALL: [GateOp; 22] = [
        GateOp::H,
        GateOp::X,
        GateOp::Y,
        GateOp::Z,
        GateOp::S,
        GateOp::T,
        GateOp::SX,
        GateOp::Rx,
        GateOp::Ry,
        GateOp::Rz,
        GateOp::Phase,
        GateOp::U3,
        GateOp::CX,
        GateOp::CZ,
        GateOp::Swap,
        GateOp::Crx,
        GateOp::Cry,
        GateOp::Crz,
        GateOp::Cu3,
        GateOp::Rxx,
        GateOp::Rzz,
        GateOp::Rzx,
    ];

    /// Get the name of this gate.
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            GateOp::H => "h",
            GateOp::X => "x",
            GateOp::Y => "y",
            GateOp::Z => "z",
            GateOp::S => "s",
            GateOp::T => "t",
            GateOp::SX => "sx",
            GateOp::Rx => "rx",
            GateOp::Ry => "ry",
            GateOp::Rz => "rz",
            GateOp::Phase => "p",
            GateOp::U3 => "u3",
            GateOp::CX => "cx",
            GateOp::CZ => "cz",
            GateOp::Swap => "swap",
            GateOp::Crx => "crx",
            GateOp::Cry => "cry",
            GateOp::Crz => "crz",
            GateOp::Cu3 => "cu3",
            GateOp::Rxx => "rxx",
            GateOp::Rzz => "rzz",
            GateOp::Rzx => "rzx",
        }
    }

    /// Look a gate up by name. Accepts `cnot` as an alias for `cx`.
    pub fn from_name(name: &str) -> IrResult<Self> {
        let lower = name.to_ascii_lowercase();
        if lower == "cnot" {
            return Ok(GateOp::CX);
        }
        GateOp::ALL
            .iter()
            .copied()
            .find(|g| g.name() == lower)
            .ok_or_else(|| IrError::UnknownGate(name.to_string()))
    }

    /// Get the number of qubits this gate operates on.
    #[inline]
    pub fn num_qubits(self) -> u32 {
        match self {
            GateOp::H
            | GateOp::X
            | GateOp::Y
            | GateOp::Z
            | GateOp::S
            | GateOp::T
            | GateOp::SX
            | GateOp::Rx
            | GateOp::Ry
            | GateOp::Rz
            | GateOp::Phase
            | GateOp::U3 => 1,
            GateOp::CX
            | GateOp::CZ
            | GateOp::Swap
            | GateOp::Crx
            | GateOp::Cry
            | GateOp::Crz
            | GateOp::Cu3
            | GateOp::Rxx
            | GateOp::Rzz
            | GateOp::Rzx => 2,
        }
    }

    /// Get the number of angles this gate takes.
    #[inline]
    pub fn num_params(self) -> usize {
        match self {
            GateOp::H
            | GateOp::X
            | GateOp::Y
            | GateOp::Z
            | GateOp::S
            | GateOp::T
            | GateOp::SX
            | GateOp::CX
            | GateOp::CZ
            | GateOp::Swap => 0,
            GateOp::U3 | GateOp::Cu3 => 3,
            _ => 1,
        }
    }

    /// Check if this gate has any angle.
    #[inline]
    pub fn is_parameterized(self) -> bool {
        self.num_params() > 0
    }

    /// Shift rule that yields the exact derivative with respect to angle `slot`.
    ///
    /// Returns `None` if the gate has no such angle.
    pub fn shift_rule(self, slot: usize) -> Option<ShiftRule> {
        if slot >= self.num_params() {
            return None;
        }
        let rule = match self {
            // Generator spectrum {0, ±1/2}.
            GateOp::Crx | GateOp::Cry | GateOp::Crz => ShiftRule::FourTerm,
            // θ is a controlled RY; φ and λ are controlled phases (spectrum {0, 1}).
            GateOp::Cu3 if slot == 0 => ShiftRule::FourTerm,
            _ => ShiftRule::TwoTerm,
        };
        Some(rule)
    }
}

impl fmt::Display for GateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One evaluation of a shift rule: run at `θ + shift`, weight the result by `coeff`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftTerm {
    /// Offset added to the angle.
    pub shift: f64,
    /// Weight of the shifted evaluation in the derivative.
    pub coeff: f64,
}

const FOUR_TERM_D1: f64 = (SQRT_2 + 1.0) / (4.0 * SQRT_2);
const FOUR_TERM_D2: f64 = (SQRT_2 - 1.0) / (4.0 * SQRT_2);

const TWO_TERM: [ShiftTerm; 2] = [
    ShiftTerm {
        shift: FRAC_PI_2,
        coeff: 0.5,
    },
    ShiftTerm {
        shift: -FRAC_PI_2,
        coeff: -0.5,
    },
];

const FOUR_TERM: [ShiftTerm; 4] = [
    ShiftTerm {
        shift: FRAC_PI_2,
        coeff: FOUR_TERM_D1,
    },
    ShiftTerm {
        shift: -FRAC_PI_2,
        coeff: -FOUR_TERM_D1,
    },
    ShiftTerm {
        shift: 3.0 * FRAC_PI_2,
        coeff: -FOUR_TERM_D2,
    },
    ShiftTerm {
        shift: -3.0 * FRAC_PI_2,
        coeff: FOUR_TERM_D2,
    },
];

/// Parameter-shift recipe for a single angle.
///
/// `TwoTerm` is exact when the gate generator has two distinct eigenvalues
/// one apart (Pauli rotations, phases, controlled phases). `FourTerm` covers
/// controlled rotations, whose generator spectrum is `{0, ±1/2}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShiftRule {
    /// `½ [f(θ + π/2) − f(θ − π/2)]`.
    TwoTerm,
    /// `d₁ [f(θ + π/2) − f(θ − π/2)] − d₂ [f(θ + 3π/2) − f(θ − 3π/2)]`.
    FourTerm,
}

impl ShiftRule {
    /// The shifted evaluations making up this rule.
    pub fn terms(self) -> &'static [ShiftTerm] {
        match self {
            ShiftRule::TwoTerm => &TWO_TERM,
            ShiftRule::FourTerm => &FOUR_TERM,
        }
    }

    /// Number of circuit evaluations this rule costs.
    #[inline]
    pub fn num_evaluations(self) -> usize {
        self.terms().len()
    }

    /// Stronger of two rules, used when one source feeds several gates.
    pub fn combine(self, other: ShiftRule) -> ShiftRule {
        if self == ShiftRule::FourTerm || other == ShiftRule::FourTerm {
            ShiftRule::FourTerm
        } else {
            ShiftRule::TwoTerm
        }
    }
}
