// src/validation/mod.rs

//! Gate unitaries and unitary-equivalence checks.
//!
//! Used by the reference simulator to apply gates and by the compiler tests
//! to verify that flavour decompositions preserve semantics up to a global
//! phase.

use num_complex::Complex;
use num_traits::{One, Zero};

use crate::flavour::RotAxis;
use crate::isa::angle::Angle;
use crate::isa::instr::Opcode;

pub type C64 = Complex<f64>;

const DEFAULT_PHASE_TOLERANCE: f64 = 1e-9;

/// A 2x2 unitary in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat2(pub [[C64; 2]; 2]);

/// A 4x4 unitary in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [[C64; 4]; 4]);

impl Mat2 {
    pub fn identity() -> Mat2 {
        Mat2([[C64::one(), C64::zero()], [C64::zero(), C64::one()]])
    }

    /// Matrix product `self * rhs`.
    pub fn mul(&self, rhs: &Mat2) -> Mat2 {
        let mut out = [[C64::zero(); 2]; 2];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                for k in 0..2 {
                    *cell += self.0[i][k] * rhs.0[k][j];
                }
            }
        }
        Mat2(out)
    }
}

impl Mat4 {
    pub fn identity() -> Mat4 {
        let mut out = [[C64::zero(); 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            row[i] = C64::one();
        }
        Mat4(out)
    }

    /// Matrix product `self * rhs`.
    pub fn mul(&self, rhs: &Mat4) -> Mat4 {
        let mut out = [[C64::zero(); 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                for k in 0..4 {
                    *cell += self.0[i][k] * rhs.0[k][j];
                }
            }
        }
        Mat4(out)
    }

    /// Kronecker product of two single-qubit unitaries, first factor on the
    /// higher-order qubit.
    pub fn kron(a: &Mat2, b: &Mat2) -> Mat4 {
        let mut out = [[C64::zero(); 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a.0[i / 2][j / 2] * b.0[i % 2][j % 2];
            }
        }
        Mat4(out)
    }
}

fn c(re: f64, im: f64) -> C64 {
    Complex::new(re, im)
}

/// The unitary of a fixed single-qubit gate, `None` for opcodes that are
/// not fixed single-qubit gates.
pub fn single_gate_unitary(opcode: Opcode) -> Option<Mat2> {
    let s = std::f64::consts::FRAC_1_SQRT_2;
    Some(match opcode {
        Opcode::X => Mat2([[c(0.0, 0.0), c(1.0, 0.0)], [c(1.0, 0.0), c(0.0, 0.0)]]),
        Opcode::Y => Mat2([[c(0.0, 0.0), c(0.0, -1.0)], [c(0.0, 1.0), c(0.0, 0.0)]]),
        Opcode::Z => Mat2([[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(-1.0, 0.0)]]),
        Opcode::H => Mat2([[c(s, 0.0), c(s, 0.0)], [c(s, 0.0), c(-s, 0.0)]]),
        Opcode::S => Mat2([[c(1.0, 0.0), c(0.0, 0.0)], [c(0.0, 0.0), c(0.0, 1.0)]]),
        // (Y + Z) / sqrt(2), carried with an extra global phase i.
        Opcode::K => Mat2([[c(0.0, s), c(s, 0.0)], [c(-s, 0.0), c(0.0, -s)]]),
        Opcode::T => Mat2([
            [c(1.0, 0.0), c(0.0, 0.0)],
            [c(0.0, 0.0), c(s, s)],
        ]),
        _ => return None,
    })
}

/// The unitary of a rotation by `angle` about `axis`.
pub fn rotation_unitary(axis: RotAxis, angle: Angle) -> Mat2 {
    raw_rotation_unitary(axis, angle.to_radians())
}

fn raw_rotation_unitary(axis: RotAxis, radians: f64) -> Mat2 {
    let half = radians / 2.0;
    let (cos, sin) = (half.cos(), half.sin());
    match axis {
        RotAxis::X => Mat2([
            [c(cos, 0.0), c(0.0, -sin)],
            [c(0.0, -sin), c(cos, 0.0)],
        ]),
        RotAxis::Y => Mat2([
            [c(cos, 0.0), c(-sin, 0.0)],
            [c(sin, 0.0), c(cos, 0.0)],
        ]),
        RotAxis::Z => Mat2([
            [c(cos, -sin), c(0.0, 0.0)],
            [c(0.0, 0.0), c(cos, sin)],
        ]),
    }
}

/// The unitary of a fixed two-qubit gate with the control on the
/// higher-order qubit, `None` for other opcodes.
pub fn two_qubit_unitary(opcode: Opcode) -> Option<Mat4> {
    Some(match opcode {
        Opcode::Cnot => controlled_unitary(&single_gate_unitary(Opcode::X)?),
        Opcode::Cphase => controlled_unitary(&single_gate_unitary(Opcode::Z)?),
        _ => return None,
    })
}

/// Extends a single-qubit unitary to a controlled two-qubit unitary, the
/// control on the higher-order qubit.
pub fn controlled_unitary(gate: &Mat2) -> Mat4 {
    let mut out = Mat4::identity();
    for i in 0..2 {
        for j in 0..2 {
            out.0[2 + i][2 + j] = gate.0[i][j];
        }
    }
    out
}

/// The unitary of a conditional rotation, the control on the higher-order
/// qubit.
///
/// This is the native electron-carbon interaction: the target rotates by
/// `+angle` when the control is in |0> and by `-angle` when it is in |1>,
/// not the textbook controlled rotation.
pub fn controlled_rotation_unitary(axis: RotAxis, angle: Angle) -> Mat4 {
    let positive = rotation_unitary(axis, angle);
    let radians = angle.to_radians();
    let negative = raw_rotation_unitary(axis, -radians);
    let mut out = Mat4::identity();
    for i in 0..2 {
        for j in 0..2 {
            out.0[i][j] = positive.0[i][j];
            out.0[2 + i][2 + j] = negative.0[i][j];
        }
    }
    out
}

/// Whether two single-qubit unitaries agree up to a global phase.
pub fn mat2_equal_up_to_global_phase(a: &Mat2, b: &Mat2, tolerance: Option<f64>) -> bool {
    let flat_a: Vec<C64> = a.0.iter().flatten().copied().collect();
    let flat_b: Vec<C64> = b.0.iter().flatten().copied().collect();
    equal_up_to_global_phase(&flat_a, &flat_b, tolerance)
}

/// Whether two two-qubit unitaries agree up to a global phase.
pub fn mat4_equal_up_to_global_phase(a: &Mat4, b: &Mat4, tolerance: Option<f64>) -> bool {
    let flat_a: Vec<C64> = a.0.iter().flatten().copied().collect();
    let flat_b: Vec<C64> = b.0.iter().flatten().copied().collect();
    equal_up_to_global_phase(&flat_a, &flat_b, tolerance)
}

/// Whether two flattened complex matrices agree up to a single global phase
/// factor, to within `tolerance` per entry.
pub fn equal_up_to_global_phase(a: &[C64], b: &[C64], tolerance: Option<f64>) -> bool {
    let tolerance = tolerance.unwrap_or(DEFAULT_PHASE_TOLERANCE);
    if a.len() != b.len() {
        return false;
    }
    // Fix the phase on the entry of largest magnitude to avoid dividing by
    // a near-zero amplitude.
    let Some(pivot) = (0..a.len()).max_by(|&i, &j| {
        a[i].norm_sqr().partial_cmp(&a[j].norm_sqr()).unwrap_or(std::cmp::Ordering::Equal)
    }) else {
        return true;
    };
    if a[pivot].norm() < tolerance && b[pivot].norm() < tolerance {
        return a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).norm() <= tolerance);
    }
    if b[pivot].norm() < tolerance {
        return false;
    }
    let phase = a[pivot] / b[pivot];
    if (phase.norm() - 1.0).abs() > tolerance {
        return false;
    }
    a.iter().zip(b).all(|(x, y)| (x - y * phase).norm() <= tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hadamard_squares_to_identity() {
        let h = single_gate_unitary(Opcode::H).unwrap();
        assert!(mat2_equal_up_to_global_phase(&h.mul(&h), &Mat2::identity(), None));
    }

    #[test]
    fn t_squares_to_s() {
        let t = single_gate_unitary(Opcode::T).unwrap();
        let s = single_gate_unitary(Opcode::S).unwrap();
        assert!(mat2_equal_up_to_global_phase(&t.mul(&t), &s, None));
    }

    #[test]
    fn pi_rotation_about_x_is_x_up_to_phase() {
        let rot = rotation_unitary(RotAxis::X, Angle::new(1, 0).unwrap());
        let x = single_gate_unitary(Opcode::X).unwrap();
        assert!(mat2_equal_up_to_global_phase(&rot, &x, None));
    }

    #[test]
    fn global_phase_is_ignored_but_relative_phase_is_not() {
        let z = single_gate_unitary(Opcode::Z).unwrap();
        let minus_z = Mat2([
            [-z.0[0][0], -z.0[0][1]],
            [-z.0[1][0], -z.0[1][1]],
        ]);
        assert!(mat2_equal_up_to_global_phase(&z, &minus_z, None));
        let identity = Mat2::identity();
        assert!(!mat2_equal_up_to_global_phase(&z, &identity, None));
    }

    #[test]
    fn conditional_rotation_negates_angle_on_set_control() {
        let m = controlled_rotation_unitary(RotAxis::X, Angle::new(8, 4).unwrap());
        let s = std::f64::consts::FRAC_PI_4.sin();
        // Control |0>: rotate by +pi/2. Control |1>: rotate by -pi/2.
        assert!((m.0[0][1].im + s).abs() < 1e-12);
        assert!((m.0[2][3].im - s).abs() < 1e-12);
    }

    #[test]
    fn cnot_is_controlled_x() {
        let cnot = two_qubit_unitary(Opcode::Cnot).unwrap();
        assert_eq!(cnot.0[0][0], Complex::new(1.0, 0.0));
        assert_eq!(cnot.0[2][3], Complex::new(1.0, 0.0));
        assert_eq!(cnot.0[3][2], Complex::new(1.0, 0.0));
        assert_eq!(cnot.0[2][2], Complex::new(0.0, 0.0));
    }

    #[test]
    fn kron_orders_factors_high_to_low() {
        let x = single_gate_unitary(Opcode::X).unwrap();
        let id = Mat2::identity();
        // X on the high qubit flips the high bit of each basis index.
        let m = Mat4::kron(&x, &id);
        assert_eq!(m.0[0][2], Complex::new(1.0, 0.0));
        assert_eq!(m.0[1][3], Complex::new(1.0, 0.0));
    }
}
