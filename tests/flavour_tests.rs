// tests/flavour_tests.rs

use std::collections::HashMap;

use netqasm::builder::transpile::to_nv;
use netqasm::flavour::RotAxis;
use netqasm::validation::{
    controlled_rotation_unitary, mat2_equal_up_to_global_phase, mat4_equal_up_to_global_phase,
    rotation_unitary, single_gate_unitary, two_qubit_unitary, Mat2, Mat4,
};
use netqasm::{lang, Flavour, Instr, Opcode, Register, Subroutine};

/// Fold the quantum instructions of an NV subroutine over two qubits into
/// one 4x4 unitary. Qubit 0 (the electron) sits on the high-order bit.
fn nv_circuit_unitary(subroutine: &Subroutine) -> Mat4 {
    let mut values: HashMap<Register, i32> = HashMap::new();
    let mut unitary = Mat4::identity();
    for instr in &subroutine.instrs {
        let gate = match instr {
            Instr::Set { reg, imm } => {
                values.insert(*reg, *imm);
                continue;
            }
            Instr::RotX { reg, angle } => {
                embed(&rotation_unitary(RotAxis::X, *angle), values[reg])
            }
            Instr::RotY { reg, angle } => {
                embed(&rotation_unitary(RotAxis::Y, *angle), values[reg])
            }
            Instr::RotZ { reg, angle } => {
                embed(&rotation_unitary(RotAxis::Z, *angle), values[reg])
            }
            Instr::CrotX { reg0, angle, .. } => {
                assert_eq!(values[reg0], 0, "conditional rotations are electron-controlled");
                controlled_rotation_unitary(RotAxis::X, *angle)
            }
            Instr::CrotY { reg0, angle, .. } => {
                assert_eq!(values[reg0], 0, "conditional rotations are electron-controlled");
                controlled_rotation_unitary(RotAxis::Y, *angle)
            }
            other => panic!("unexpected instruction in transpiled output: {other}"),
        };
        unitary = gate.mul(&unitary);
    }
    unitary
}

fn embed(gate: &Mat2, qubit: i32) -> Mat4 {
    match qubit {
        0 => Mat4::kron(gate, &Mat2::identity()),
        1 => Mat4::kron(&Mat2::identity(), gate),
        other => panic!("qubit {other} does not fit a two-qubit circuit"),
    }
}

fn transpiled(body: &str) -> Subroutine {
    let source = format!("# NETQASM 0.0\n# APPID 0\n{body}");
    let vanilla = lang::parse(&source)
        .and_then(|pre| pre.finalize(&Flavour::vanilla()))
        .expect("vanilla subroutine");
    to_nv(&vanilla).expect("transpiled subroutine")
}

#[test]
fn test_single_qubit_decompositions_are_exact() {
    let flavour = Flavour::nv();
    for opcode in [
        Opcode::X,
        Opcode::Y,
        Opcode::Z,
        Opcode::H,
        Opcode::S,
        Opcode::K,
        Opcode::T,
    ] {
        let steps = flavour.decomposition(opcode).expect("table entry");
        let mut unitary = Mat2::identity();
        for step in steps {
            unitary = rotation_unitary(step.axis, step.angle).mul(&unitary);
        }
        let target = single_gate_unitary(opcode).expect("fixed gate");
        assert!(
            mat2_equal_up_to_global_phase(&unitary, &target, Some(1e-9)),
            "decomposition of `{opcode}` does not reproduce the gate",
        );
    }
}

#[test]
fn test_cnot_electron_to_carbon_is_exact() {
    let subroutine = transpiled("set Q0 0\nset Q1 1\ncnot Q0 Q1\n");
    let expected = two_qubit_unitary(Opcode::Cnot).unwrap();
    assert!(mat4_equal_up_to_global_phase(
        &nv_circuit_unitary(&subroutine),
        &expected,
        Some(1e-9),
    ));
}

#[test]
fn test_cnot_carbon_to_electron_is_exact() {
    let subroutine = transpiled("set Q0 0\nset Q1 1\ncnot Q1 Q0\n");
    // Control on the low-order qubit: flip the high bit where the low bit
    // is set.
    let mut expected = Mat4::identity();
    expected.0[1][1] = 0.0.into();
    expected.0[3][3] = 0.0.into();
    expected.0[1][3] = 1.0.into();
    expected.0[3][1] = 1.0.into();
    assert!(mat4_equal_up_to_global_phase(
        &nv_circuit_unitary(&subroutine),
        &expected,
        Some(1e-9),
    ));
}

#[test]
fn test_cphase_is_exact_and_symmetric() {
    let expected = two_qubit_unitary(Opcode::Cphase).unwrap();
    for body in ["set Q0 0\nset Q1 1\ncphase Q0 Q1\n", "set Q0 0\nset Q1 1\ncphase Q1 Q0\n"] {
        let subroutine = transpiled(body);
        assert!(mat4_equal_up_to_global_phase(
            &nv_circuit_unitary(&subroutine),
            &expected,
            Some(1e-9),
        ));
    }
}

#[test]
fn test_transpiled_rotations_use_the_hardware_denominator() {
    let subroutine = transpiled("set Q0 0\nrot_x Q0 1 1\nh Q0\nt Q0\n");
    for instr in &subroutine.instrs {
        let angle = match instr {
            Instr::RotX { angle, .. }
            | Instr::RotY { angle, .. }
            | Instr::RotZ { angle, .. }
            | Instr::CrotX { angle, .. }
            | Instr::CrotY { angle, .. } => *angle,
            _ => continue,
        };
        assert_eq!(angle.denom(), 4, "`{instr}` is not at the hardware denominator");
    }
}

#[test]
fn test_nv_flavour_has_no_table_for_native_rotations() {
    let flavour = Flavour::nv();
    assert!(flavour.decomposition(Opcode::RotX).is_none());
    assert!(flavour.decomposition(Opcode::Cnot).is_none());
}
