//! Statevector simulation engine.

use num_complex::Complex64;
use rand::Rng;
use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2, FRAC_PI_4};

use qnode_ir::{Circuit, GateOp, Instruction};

type Matrix2 = [[Complex64; 2]; 2];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const I: Complex64 = Complex64::new(0.0, 1.0);

/// A statevector representing a quantum state.
///
/// Wire `q` is bit `q` of the basis-state index.
#[derive(Debug, Clone)]
pub struct Statevector {
    /// The state amplitudes (2^n complex numbers).
    amplitudes: Vec<Complex64>,
    /// Number of qubits.
    num_qubits: usize,
}

impl Statevector {
    /// Create a new statevector initialized to |0...0⟩.
    pub fn new(num_qubits: usize) -> Self {
        let size = 1 << num_qubits;
        let mut amplitudes = vec![ZERO; size];
        amplitudes[0] = ONE;
        Self {
            amplitudes,
            num_qubits,
        }
    }

    /// Run every instruction of `circuit` from |0...0⟩.
    pub fn from_circuit(circuit: &Circuit) -> Self {
        let mut sv = Self::new(circuit.num_qubits());
        for inst in circuit.instructions() {
            sv.apply(inst);
        }
        sv
    }

    /// Get the number of qubits.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// The raw amplitudes.
    pub fn amplitudes(&self) -> &[Complex64] {
        &self.amplitudes
    }

    /// Apply a bound instruction.
    pub fn apply(&mut self, inst: &Instruction) {
        let q: Vec<usize> = inst.qubits.iter().map(|q| q.index()).collect();
        let a = &inst.angles;
        match inst.gate {
            GateOp::H => self.apply_1q(q[0], hadamard()),
            GateOp::X => self.apply_x(q[0]),
            GateOp::Y => self.apply_1q(q[0], [[ZERO, -I], [I, ZERO]]),
            GateOp::Z => self.apply_1q(q[0], phase(std::f64::consts::PI)),
            GateOp::S => self.apply_1q(q[0], phase(FRAC_PI_2)),
            GateOp::T => self.apply_1q(q[0], phase(FRAC_PI_4)),
            GateOp::SX => self.apply_1q(q[0], rx(FRAC_PI_2)),
            GateOp::Rx => self.apply_1q(q[0], rx(a[0])),
            GateOp::Ry => self.apply_1q(q[0], ry(a[0])),
            GateOp::Rz => self.apply_1q(q[0], rz(a[0])),
            GateOp::Phase => self.apply_1q(q[0], phase(a[0])),
            GateOp::U3 => self.apply_1q(q[0], u3(a[0], a[1], a[2])),
            GateOp::CX => self.apply_cx(q[0], q[1]),
            GateOp::CZ => self.apply_controlled(q[0], q[1], phase(std::f64::consts::PI)),
            GateOp::Swap => self.apply_swap(q[0], q[1]),
            GateOp::Crx => self.apply_controlled(q[0], q[1], rx(a[0])),
            GateOp::Cry => self.apply_controlled(q[0], q[1], ry(a[0])),
            GateOp::Crz => self.apply_controlled(q[0], q[1], rz(a[0])),
            GateOp::Cu3 => self.apply_controlled(q[0], q[1], u3(a[0], a[1], a[2])),
            GateOp::Rxx => self.apply_rxx(q[0], q[1], a[0]),
            GateOp::Rzz => self.apply_rzz(q[0], q[1], a[0]),
            // exp(-iθ/2 Z⊗X) = |0⟩⟨0| ⊗ RX(θ) + |1⟩⟨1| ⊗ RX(-θ)
            GateOp::Rzx => self.apply_conditional(q[0], q[1], rx(a[0]), rx(-a[0])),
        }
    }

    // =========================================================================
    // Kernels
    // =========================================================================

    fn apply_1q(&mut self, qubit: usize, m: Matrix2) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                let j = i | mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    /// Apply `m0` to `target` where `control` is 0 and `m1` where it is 1.
    fn apply_conditional(&mut self, control: usize, target: usize, m0: Matrix2, m1: Matrix2) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if i & tgt_mask == 0 {
                let j = i | tgt_mask;
                let m = if i & ctrl_mask == 0 { &m0 } else { &m1 };
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    fn apply_controlled(&mut self, control: usize, target: usize, m: Matrix2) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                let j = i | tgt_mask;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = m[0][0] * a + m[0][1] * b;
                self.amplitudes[j] = m[1][0] * a + m[1][1] * b;
            }
        }
    }

    fn apply_x(&mut self, qubit: usize) {
        let mask = 1 << qubit;
        for i in 0..self.amplitudes.len() {
            if i & mask == 0 {
                self.amplitudes.swap(i, i | mask);
            }
        }
    }

    fn apply_cx(&mut self, control: usize, target: usize) {
        let ctrl_mask = 1 << control;
        let tgt_mask = 1 << target;
        for i in 0..self.amplitudes.len() {
            if (i & ctrl_mask != 0) && (i & tgt_mask == 0) {
                self.amplitudes.swap(i, i | tgt_mask);
            }
        }
    }

    fn apply_swap(&mut self, q1: usize, q2: usize) {
        let mask1 = 1 << q1;
        let mask2 = 1 << q2;
        for i in 0..self.amplitudes.len() {
            if (i & mask1 != 0) && (i & mask2 == 0) {
                let j = (i & !mask1) | mask2;
                self.amplitudes.swap(i, j);
            }
        }
    }

    fn apply_rxx(&mut self, q1: usize, q2: usize, theta: f64) {
        let mask1 = 1 << q1;
        let both = mask1 | (1 << q2);
        let c = Complex64::new((theta / 2.0).cos(), 0.0);
        let neg_i_s = Complex64::new(0.0, -(theta / 2.0).sin());
        for i in 0..self.amplitudes.len() {
            if i & mask1 == 0 {
                let j = i ^ both;
                let a = self.amplitudes[i];
                let b = self.amplitudes[j];
                self.amplitudes[i] = c * a + neg_i_s * b;
                self.amplitudes[j] = neg_i_s * a + c * b;
            }
        }
    }

    fn apply_rzz(&mut self, q1: usize, q2: usize, theta: f64) {
        let even = Complex64::from_polar(1.0, -theta / 2.0);
        let odd = Complex64::from_polar(1.0, theta / 2.0);
        for (i, amp) in self.amplitudes.iter_mut().enumerate() {
            let parity = ((i >> q1) ^ (i >> q2)) & 1;
            *amp *= if parity == 0 { even } else { odd };
        }
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Probability of each basis state.
    pub fn probabilities(&self) -> Vec<f64> {
        self.amplitudes.iter().map(|a| a.norm_sqr()).collect()
    }

    /// ⟨Z⟩ on `wire`.
    pub fn expectation_z(&self, wire: usize) -> f64 {
        let mask = 1 << wire;
        self.amplitudes
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let p = a.norm_sqr();
                if i & mask == 0 { p } else { -p }
            })
            .sum()
    }

    /// ⟨Z⟩ on every wire, in wire order.
    pub fn expectations_z(&self) -> Vec<f64> {
        (0..self.num_qubits).map(|w| self.expectation_z(w)).collect()
    }

    /// Sample a measurement outcome.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let r: f64 = rng.r#gen();
        let mut cumulative = 0.0;
        for (i, amp) in self.amplitudes.iter().enumerate() {
            cumulative += amp.norm_sqr();
            if r < cumulative {
                return i;
            }
        }
        // Rounding can leave the total a hair under 1.
        self.amplitudes.len() - 1
    }

    /// Convert measurement outcome to bitstring (wire 0 rightmost).
    pub fn outcome_to_bitstring(&self, outcome: usize) -> String {
        format!("{:0width$b}", outcome, width = self.num_qubits)
    }
}

fn hadamard() -> Matrix2 {
    let h = Complex64::new(FRAC_1_SQRT_2, 0.0);
    [[h, h], [h, -h]]
}

fn phase(theta: f64) -> Matrix2 {
    [[ONE, ZERO], [ZERO, Complex64::from_polar(1.0, theta)]]
}

fn rx(theta: f64) -> Matrix2 {
    let c = Complex64::new((theta / 2.0).cos(), 0.0);
    let neg_i_s = Complex64::new(0.0, -(theta / 2.0).sin());
    [[c, neg_i_s], [neg_i_s, c]]
}

fn ry(theta: f64) -> Matrix2 {
    let c = Complex64::new((theta / 2.0).cos(), 0.0);
    let s = Complex64::new((theta / 2.0).sin(), 0.0);
    [[c, -s], [s, c]]
}

fn rz(theta: f64) -> Matrix2 {
    [
        [Complex64::from_polar(1.0, -theta / 2.0), ZERO],
        [ZERO, Complex64::from_polar(1.0, theta / 2.0)],
    ]
}

fn u3(theta: f64, phi: f64, lambda: f64) -> Matrix2 {
    let c = (theta / 2.0).cos();
    let s = (theta / 2.0).sin();
    [
        [
            Complex64::new(c, 0.0),
            -Complex64::from_polar(s, lambda),
        ],
        [
            Complex64::from_polar(s, phi),
            Complex64::from_polar(c, phi + lambda),
        ],
    ]
}
