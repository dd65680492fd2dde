// src/flavour/mod.rs

//! Instruction-set flavours.
//!
//! A flavour is the set of quantum instructions a hardware family actually
//! implements, together with the wire-id assignment for those instructions
//! and the rewrite rules a compiler needs to lower the universal gate set
//! onto it. The classical core (allocation, arrays, branches, arithmetic,
//! waits, returns) is shared by every flavour.

use std::collections::HashMap;

use crate::core::NetQasmError;
use crate::isa::angle::Angle;
use crate::isa::instr::Opcode;

/// A rotation axis of the Bloch sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotAxis {
    X,
    Y,
    Z,
}

impl RotAxis {
    /// The single-qubit rotation opcode about this axis.
    pub fn rotation_opcode(self) -> Opcode {
        match self {
            RotAxis::X => Opcode::RotX,
            RotAxis::Y => Opcode::RotY,
            RotAxis::Z => Opcode::RotZ,
        }
    }
}

/// One rotation in a fixed-gate decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotStep {
    pub axis: RotAxis,
    pub angle: Angle,
}

impl RotStep {
    fn new(axis: RotAxis, num: u8, denom: u8) -> RotStep {
        // The tables below only hold in-range angles.
        let angle = Angle::new(num, denom).expect("decomposition table angle");
        RotStep { axis, angle }
    }
}

/// Which hardware family a [`Flavour`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlavourKind {
    /// The universal flavour: the full idealized gate set.
    Vanilla,
    /// Nitrogen-vacancy centres: native rotations and electron-controlled
    /// rotations only.
    Nv,
}

/// An instruction-set flavour.
///
/// Holds the id assignment for decoding, the supported-opcode set for
/// validation, and the single-qubit decomposition tables the transpiler
/// applies when lowering universal gates.
#[derive(Debug, Clone)]
pub struct Flavour {
    kind: FlavourKind,
    id_to_opcode: HashMap<u8, Opcode>,
    decompositions: HashMap<Opcode, Vec<RotStep>>,
    rotation_denom: Option<u8>,
}

/// Opcodes shared by every flavour.
const CORE_OPCODES: [Opcode; 31] = [
    Opcode::QAlloc,
    Opcode::Init,
    Opcode::Array,
    Opcode::Set,
    Opcode::Store,
    Opcode::Load,
    Opcode::Undef,
    Opcode::Lea,
    Opcode::Jmp,
    Opcode::Bez,
    Opcode::Bnz,
    Opcode::Beq,
    Opcode::Bne,
    Opcode::Blt,
    Opcode::Bge,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Addm,
    Opcode::Subm,
    Opcode::Meas,
    Opcode::CreateEpr,
    Opcode::RecvEpr,
    Opcode::WaitAll,
    Opcode::WaitAny,
    Opcode::WaitSingle,
    Opcode::SendMsg,
    Opcode::RecvMsg,
    Opcode::QFree,
    Opcode::RetReg,
    Opcode::RetArr,
    Opcode::Breakpoint,
];

const VANILLA_QUANTUM: [Opcode; 13] = [
    Opcode::X,
    Opcode::Y,
    Opcode::Z,
    Opcode::H,
    Opcode::S,
    Opcode::K,
    Opcode::T,
    Opcode::RotX,
    Opcode::RotY,
    Opcode::RotZ,
    Opcode::Cnot,
    Opcode::Cphase,
    Opcode::Mov,
];

const NV_QUANTUM: [Opcode; 9] = [
    Opcode::X,
    Opcode::Y,
    Opcode::Z,
    Opcode::H,
    Opcode::RotX,
    Opcode::RotY,
    Opcode::RotZ,
    Opcode::CrotX,
    Opcode::CrotY,
];

impl Flavour {
    fn from_opcodes(
        kind: FlavourKind,
        quantum: &[Opcode],
        decompositions: HashMap<Opcode, Vec<RotStep>>,
        rotation_denom: Option<u8>,
    ) -> Flavour {
        let id_to_opcode = CORE_OPCODES
            .iter()
            .chain(quantum)
            .map(|&op| (op.id(), op))
            .collect();
        Flavour { kind, id_to_opcode, decompositions, rotation_denom }
    }

    /// The universal flavour.
    pub fn vanilla() -> Flavour {
        Flavour::from_opcodes(FlavourKind::Vanilla, &VANILLA_QUANTUM, HashMap::new(), None)
    }

    /// The nitrogen-vacancy flavour.
    ///
    /// Carries the hardware decomposition of each non-native single-qubit
    /// gate into rotations, all expressed at denominator exponent 4.
    pub fn nv() -> Flavour {
        use RotAxis::{X, Y};
        let mut table = HashMap::new();
        table.insert(Opcode::X, vec![RotStep::new(X, 16, 4)]);
        table.insert(Opcode::Y, vec![RotStep::new(Y, 16, 4)]);
        table.insert(
            Opcode::Z,
            vec![RotStep::new(X, 24, 4), RotStep::new(Y, 16, 4), RotStep::new(X, 8, 4)],
        );
        table.insert(Opcode::H, vec![RotStep::new(Y, 8, 4), RotStep::new(X, 16, 4)]);
        table.insert(Opcode::K, vec![RotStep::new(X, 24, 4), RotStep::new(Y, 16, 4)]);
        table.insert(
            Opcode::S,
            vec![RotStep::new(X, 24, 4), RotStep::new(Y, 8, 4), RotStep::new(X, 8, 4)],
        );
        table.insert(
            Opcode::T,
            vec![RotStep::new(X, 24, 4), RotStep::new(Y, 4, 4), RotStep::new(X, 8, 4)],
        );
        Flavour::from_opcodes(FlavourKind::Nv, &NV_QUANTUM, table, Some(4))
    }

    pub fn kind(&self) -> FlavourKind {
        self.kind
    }

    /// Flavour name as used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self.kind {
            FlavourKind::Vanilla => "vanilla",
            FlavourKind::Nv => "nv",
        }
    }

    /// Whether this flavour implements `opcode`.
    pub fn supports(&self, opcode: Opcode) -> bool {
        self.id_to_opcode.get(&opcode.id()) == Some(&opcode)
    }

    /// Maps a wire id back to the opcode it denotes in this flavour.
    pub fn opcode_for_id(&self, id: u8) -> Option<Opcode> {
        self.id_to_opcode.get(&id).copied()
    }

    /// The rotation sequence a non-native single-qubit gate lowers to, if
    /// this flavour defines one.
    pub fn decomposition(&self, opcode: Opcode) -> Option<&[RotStep]> {
        self.decompositions.get(&opcode).map(Vec::as_slice)
    }

    /// The denominator exponent all compiled rotation angles must carry on
    /// this flavour, if fixed.
    pub fn rotation_denom(&self) -> Option<u8> {
        self.rotation_denom
    }

    /// Errors unless this flavour implements `opcode`.
    pub fn check_supported(&self, opcode: Opcode) -> Result<(), NetQasmError> {
        if self.supports(opcode) {
            Ok(())
        } else {
            Err(NetQasmError::UnsupportedOperation {
                message: format!("instruction `{opcode}` is not in the {} flavour", self.name()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vanilla_supports_universal_gates() {
        let flavour = Flavour::vanilla();
        for opcode in [Opcode::Cnot, Opcode::Cphase, Opcode::T, Opcode::Mov] {
            assert!(flavour.supports(opcode));
        }
        assert!(!flavour.supports(Opcode::CrotX));
    }

    #[test]
    fn nv_rejects_two_qubit_universal_gates() {
        let flavour = Flavour::nv();
        assert!(!flavour.supports(Opcode::Cnot));
        assert!(!flavour.supports(Opcode::T));
        assert!(flavour.supports(Opcode::CrotX));
        assert!(flavour.check_supported(Opcode::Cphase).is_err());
    }

    #[test]
    fn overlapping_ids_resolve_per_flavour() {
        assert_eq!(Opcode::Cnot.id(), Opcode::CrotX.id());
        assert_eq!(Flavour::vanilla().opcode_for_id(30), Some(Opcode::Cnot));
        assert_eq!(Flavour::nv().opcode_for_id(30), Some(Opcode::CrotX));
    }

    #[test]
    fn nv_decompositions_are_native_rotations() {
        let flavour = Flavour::nv();
        for opcode in [Opcode::X, Opcode::Y, Opcode::Z, Opcode::H, Opcode::S, Opcode::K, Opcode::T] {
            let steps = flavour.decomposition(opcode).unwrap();
            assert!(!steps.is_empty());
            for step in steps {
                assert_eq!(step.angle.denom(), 4);
            }
        }
        assert!(Flavour::vanilla().decomposition(Opcode::H).is_none());
    }

    #[test]
    fn nv_fixes_rotation_denominator() {
        assert_eq!(Flavour::nv().rotation_denom(), Some(4));
        assert_eq!(Flavour::vanilla().rotation_denom(), None);
    }
}
