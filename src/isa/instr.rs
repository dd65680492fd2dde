// src/isa/instr.rs

//! The typed instruction set.
//!
//! [`Opcode`] names every instruction the protocol knows, including the
//! flavour-specific quantum ones; [`Instr`] is the fully typed form where
//! every operand has been checked against the opcode's operand shape and
//! branch targets are absolute instruction indices.

use std::fmt;

use crate::core::NetQasmError;
use crate::isa::angle::Angle;
use crate::isa::operand::{Address, ArrayEntry, ArraySlice, Operand, Register};

/// Every instruction mnemonic in the protocol.
///
/// Wire ids are not unique across flavours: id 30 is `cnot` in the vanilla
/// flavour and `crot_x` in the NV flavour, so decoding requires a
/// [`Flavour`](crate::flavour::Flavour) to map ids back to opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    // Allocation and initialization
    QAlloc,
    Init,
    Array,
    Set,
    // Memory
    Store,
    Load,
    Undef,
    Lea,
    // Classical control flow
    Jmp,
    Bez,
    Bnz,
    Beq,
    Bne,
    Blt,
    Bge,
    // Classical arithmetic
    Add,
    Sub,
    Addm,
    Subm,
    // Single-qubit gates
    X,
    Y,
    Z,
    H,
    S,
    K,
    T,
    // Single-qubit rotations
    RotX,
    RotY,
    RotZ,
    // Two-qubit gates
    Cnot,
    Cphase,
    Mov,
    // Controlled rotations (NV flavour)
    CrotX,
    CrotY,
    // Measurement
    Meas,
    // Entanglement generation
    CreateEpr,
    RecvEpr,
    // Waiting
    WaitAll,
    WaitAny,
    WaitSingle,
    // Classical messaging
    SendMsg,
    RecvMsg,
    // Deallocation
    QFree,
    // Return values
    RetReg,
    RetArr,
    // Debugging
    Breakpoint,
}

/// The operand shape expected at one position of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// A register reference.
    Register,
    /// A 32-bit immediate.
    Immediate,
    /// A one-byte rotation immediate (angle numerator or denominator
    /// exponent).
    RotImmediate,
    /// An array address.
    Address,
    /// An array entry `@addr[reg]`.
    ArrayEntry,
    /// An array slice `@addr[reg:reg]`.
    ArraySlice,
    /// A branch target: a label before resolution, an absolute instruction
    /// index afterwards.
    BranchTarget,
}

use OperandKind as K;

impl Opcode {
    /// All opcodes, used to build mnemonic and id lookup tables.
    pub const ALL: [Opcode; 46] = [
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
        Opcode::CrotX,
        Opcode::CrotY,
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

    /// The assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::QAlloc => "qalloc",
            Opcode::Init => "init",
            Opcode::Array => "array",
            Opcode::Set => "set",
            Opcode::Store => "store",
            Opcode::Load => "load",
            Opcode::Undef => "undef",
            Opcode::Lea => "lea",
            Opcode::Jmp => "jmp",
            Opcode::Bez => "bez",
            Opcode::Bnz => "bnz",
            Opcode::Beq => "beq",
            Opcode::Bne => "bne",
            Opcode::Blt => "blt",
            Opcode::Bge => "bge",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Addm => "addm",
            Opcode::Subm => "subm",
            Opcode::X => "x",
            Opcode::Y => "y",
            Opcode::Z => "z",
            Opcode::H => "h",
            Opcode::S => "s",
            Opcode::K => "k",
            Opcode::T => "t",
            Opcode::RotX => "rot_x",
            Opcode::RotY => "rot_y",
            Opcode::RotZ => "rot_z",
            Opcode::Cnot => "cnot",
            Opcode::Cphase => "cphase",
            Opcode::Mov => "mov",
            Opcode::CrotX => "crot_x",
            Opcode::CrotY => "crot_y",
            Opcode::Meas => "meas",
            Opcode::CreateEpr => "create_epr",
            Opcode::RecvEpr => "recv_epr",
            Opcode::WaitAll => "wait_all",
            Opcode::WaitAny => "wait_any",
            Opcode::WaitSingle => "wait_single",
            Opcode::SendMsg => "send_msg",
            Opcode::RecvMsg => "recv_msg",
            Opcode::QFree => "qfree",
            Opcode::RetReg => "ret_reg",
            Opcode::RetArr => "ret_arr",
            Opcode::Breakpoint => "breakpoint",
        }
    }

    /// Looks up an opcode by its assembly mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        Opcode::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }

    /// The wire id used in the binary encoding.
    ///
    /// Unique within any one flavour but not globally; see the type docs.
    pub fn id(self) -> u8 {
        match self {
            Opcode::QAlloc => 1,
            Opcode::Init => 2,
            Opcode::Array => 3,
            Opcode::Set => 4,
            Opcode::Store => 5,
            Opcode::Load => 6,
            Opcode::Undef => 7,
            Opcode::Lea => 8,
            Opcode::Jmp => 9,
            Opcode::Bez => 10,
            Opcode::Bnz => 11,
            Opcode::Beq => 12,
            Opcode::Bne => 13,
            Opcode::Blt => 14,
            Opcode::Bge => 15,
            Opcode::Add => 16,
            Opcode::Sub => 17,
            Opcode::Addm => 18,
            Opcode::Subm => 19,
            Opcode::X => 20,
            Opcode::Y => 21,
            Opcode::Z => 22,
            Opcode::H => 23,
            Opcode::S => 24,
            Opcode::K => 25,
            Opcode::T => 26,
            Opcode::RotX => 27,
            Opcode::RotY => 28,
            Opcode::RotZ => 29,
            Opcode::Cnot => 30,
            Opcode::Cphase => 31,
            Opcode::Mov => 41,
            Opcode::CrotX => 30,
            Opcode::CrotY => 31,
            Opcode::Meas => 32,
            Opcode::CreateEpr => 33,
            Opcode::RecvEpr => 34,
            Opcode::WaitAll => 35,
            Opcode::WaitAny => 36,
            Opcode::WaitSingle => 37,
            Opcode::SendMsg => 42,
            Opcode::RecvMsg => 43,
            Opcode::QFree => 38,
            Opcode::RetReg => 39,
            Opcode::RetArr => 40,
            Opcode::Breakpoint => 100,
        }
    }

    /// The fixed operand shape of this opcode.
    pub fn operand_kinds(self) -> &'static [OperandKind] {
        match self {
            Opcode::QAlloc
            | Opcode::Init
            | Opcode::QFree
            | Opcode::RetReg
            | Opcode::X
            | Opcode::Y
            | Opcode::Z
            | Opcode::H
            | Opcode::S
            | Opcode::K
            | Opcode::T => &[K::Register],
            Opcode::Array => &[K::Register, K::Address],
            Opcode::Set => &[K::Register, K::Immediate],
            Opcode::Store | Opcode::Load => &[K::Register, K::ArrayEntry],
            Opcode::Undef | Opcode::WaitSingle => &[K::ArrayEntry],
            Opcode::Lea => &[K::Register, K::Address],
            Opcode::Jmp => &[K::BranchTarget],
            Opcode::Bez | Opcode::Bnz => &[K::Register, K::BranchTarget],
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bge => {
                &[K::Register, K::Register, K::BranchTarget]
            }
            Opcode::Add | Opcode::Sub => &[K::Register, K::Register, K::Register],
            Opcode::Addm | Opcode::Subm => {
                &[K::Register, K::Register, K::Register, K::Register]
            }
            Opcode::RotX | Opcode::RotY | Opcode::RotZ => {
                &[K::Register, K::RotImmediate, K::RotImmediate]
            }
            Opcode::Cnot | Opcode::Cphase | Opcode::Mov | Opcode::Meas => {
                &[K::Register, K::Register]
            }
            Opcode::CrotX | Opcode::CrotY => {
                &[K::Register, K::Register, K::RotImmediate, K::RotImmediate]
            }
            Opcode::CreateEpr => &[
                K::Register,
                K::Register,
                K::Register,
                K::Register,
                K::Register,
            ],
            Opcode::RecvEpr => &[K::Register, K::Register, K::Register, K::Register],
            Opcode::WaitAll | Opcode::WaitAny => &[K::ArraySlice],
            Opcode::SendMsg | Opcode::RecvMsg => &[K::Register, K::Address],
            Opcode::RetArr => &[K::Address],
            Opcode::Breakpoint => &[K::Immediate, K::Immediate],
        }
    }

    /// Whether this opcode jumps: `jmp` or any conditional branch.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Jmp | Opcode::Bez | Opcode::Bnz | Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bge
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// What a breakpoint instruction asks the processor to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointAction {
    /// Record nothing; marker only.
    Nop = 0,
    /// Snapshot the local node state.
    DumpLocalState = 1,
    /// Snapshot the global (all-node) state.
    DumpGlobalState = 2,
}

impl BreakpointAction {
    /// Decodes the action immediate.
    pub fn from_i32(value: i32) -> Option<BreakpointAction> {
        match value {
            0 => Some(BreakpointAction::Nop),
            1 => Some(BreakpointAction::DumpLocalState),
            2 => Some(BreakpointAction::DumpGlobalState),
            _ => None,
        }
    }
}

/// Which side of an entanglement generation a breakpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointRole {
    /// The node that initiated the generation.
    Create = 0,
    /// The node that received it.
    Receive = 1,
}

impl BreakpointRole {
    /// Decodes the role immediate.
    pub fn from_i32(value: i32) -> Option<BreakpointRole> {
        match value {
            0 => Some(BreakpointRole::Create),
            1 => Some(BreakpointRole::Receive),
            _ => None,
        }
    }
}

/// A fully typed instruction.
///
/// Branch targets (`line`) are absolute instruction indices within the owning
/// subroutine; the symbolic-label form only exists in
/// [`PreSubroutine`](crate::subroutine::PreSubroutine)s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instr {
    /// Allocate a qubit; its virtual id is read from `reg`.
    QAlloc { reg: Register },
    /// Initialize the qubit whose virtual id is in `reg` to |0>.
    Init { reg: Register },
    /// Create an array of length `size` (read from a register) at `address`.
    Array { size: Register, address: Address },
    /// Load an immediate into a register.
    Set { reg: Register, imm: i32 },
    /// Store a register value into an array slot.
    Store { reg: Register, entry: ArrayEntry },
    /// Load an array slot into a register.
    Load { reg: Register, entry: ArrayEntry },
    /// Reset an array slot to the unfilled state.
    Undef { entry: ArrayEntry },
    /// Load an array address into a register.
    Lea { reg: Register, address: Address },
    /// Unconditional jump.
    Jmp { line: i32 },
    /// Branch if `reg` is zero.
    Bez { reg: Register, line: i32 },
    /// Branch if `reg` is nonzero.
    Bnz { reg: Register, line: i32 },
    /// Branch if `reg0 == reg1`.
    Beq { reg0: Register, reg1: Register, line: i32 },
    /// Branch if `reg0 != reg1`.
    Bne { reg0: Register, reg1: Register, line: i32 },
    /// Branch if `reg0 < reg1`.
    Blt { reg0: Register, reg1: Register, line: i32 },
    /// Branch if `reg0 >= reg1`.
    Bge { reg0: Register, reg1: Register, line: i32 },
    /// `out = in0 + in1` (wrapping).
    Add { out: Register, in0: Register, in1: Register },
    /// `out = in0 - in1` (wrapping).
    Sub { out: Register, in0: Register, in1: Register },
    /// `out = (in0 + in1) mod modulus`.
    Addm { out: Register, in0: Register, in1: Register, modulus: Register },
    /// `out = (in0 - in1) mod modulus`.
    Subm { out: Register, in0: Register, in1: Register, modulus: Register },
    /// Pauli-X on the qubit in `reg`.
    X { reg: Register },
    /// Pauli-Y on the qubit in `reg`.
    Y { reg: Register },
    /// Pauli-Z on the qubit in `reg`.
    Z { reg: Register },
    /// Hadamard on the qubit in `reg`.
    H { reg: Register },
    /// Phase gate (S) on the qubit in `reg`.
    S { reg: Register },
    /// K gate ((Y+Z)/sqrt(2)) on the qubit in `reg`.
    K { reg: Register },
    /// T gate on the qubit in `reg`.
    T { reg: Register },
    /// Rotation about X by `angle`.
    RotX { reg: Register, angle: Angle },
    /// Rotation about Y by `angle`.
    RotY { reg: Register, angle: Angle },
    /// Rotation about Z by `angle`.
    RotZ { reg: Register, angle: Angle },
    /// Controlled-NOT; control in `reg0`, target in `reg1`.
    Cnot { reg0: Register, reg1: Register },
    /// Controlled-phase; control in `reg0`, target in `reg1`.
    Cphase { reg0: Register, reg1: Register },
    /// Move the state of the qubit in `reg0` onto the qubit in `reg1`
    /// (target state is overwritten).
    Mov { reg0: Register, reg1: Register },
    /// Conditional rotation about X (NV flavour): `reg1` rotates by the
    /// angle when `reg0` is |0> and by its negation when `reg0` is |1>.
    CrotX { reg0: Register, reg1: Register, angle: Angle },
    /// Conditional rotation about Y (NV flavour).
    CrotY { reg0: Register, reg1: Register, angle: Angle },
    /// Measure the qubit in `qreg`, outcome into `creg`.
    Meas { qreg: Register, creg: Register },
    /// Request entanglement generation with a peer.
    ///
    /// All five operands are registers holding, in order: the remote node
    /// id, the EPR socket id, the address of the array of virtual qubit ids
    /// to bind pairs to, the address of the request-argument array, and the
    /// address of the results array.
    CreateEpr {
        remote_node: Register,
        epr_socket: Register,
        qubit_addrs: Register,
        args: Register,
        results: Register,
    },
    /// Receive entanglement generation initiated by a peer; operands as for
    /// [`Instr::CreateEpr`] minus the argument array.
    RecvEpr {
        remote_node: Register,
        epr_socket: Register,
        qubit_addrs: Register,
        results: Register,
    },
    /// Wait until every slot in the slice is filled.
    WaitAll { slice: ArraySlice },
    /// Wait until at least one slot in the slice is filled.
    WaitAny { slice: ArraySlice },
    /// Wait until the single slot is filled.
    WaitSingle { entry: ArrayEntry },
    /// Send the contents of the array at `address` over the classical socket
    /// whose id is in `socket`.
    SendMsg { socket: Register, address: Address },
    /// Receive a classical message into the array at `address`; may suspend
    /// until the peer sends.
    RecvMsg { socket: Register, address: Address },
    /// Free the qubit whose virtual id is in `reg`.
    QFree { reg: Register },
    /// Return a register value to the host.
    RetReg { reg: Register },
    /// Return an array to the host.
    RetArr { address: Address },
    /// Ask the processor to record a state snapshot.
    Breakpoint { action: BreakpointAction, role: BreakpointRole },
}

// --- Operand extraction helpers ---

fn shape_err(opcode: Opcode, operands: &[Operand]) -> NetQasmError {
    NetQasmError::Encoding {
        message: format!(
            "instruction `{opcode}` expects operands {:?}, got ({})",
            opcode.operand_kinds(),
            operands
                .iter()
                .map(|op| op.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ),
    }
}

fn want_reg(opcode: Opcode, operands: &[Operand], i: usize) -> Result<Register, NetQasmError> {
    match operands.get(i) {
        Some(Operand::Register(r)) => Ok(*r),
        _ => Err(shape_err(opcode, operands)),
    }
}

fn want_imm(opcode: Opcode, operands: &[Operand], i: usize) -> Result<i32, NetQasmError> {
    match operands.get(i) {
        Some(Operand::Immediate(v)) => Ok(*v),
        _ => Err(shape_err(opcode, operands)),
    }
}

fn want_addr(opcode: Opcode, operands: &[Operand], i: usize) -> Result<Address, NetQasmError> {
    match operands.get(i) {
        Some(Operand::Address(a)) => Ok(*a),
        _ => Err(shape_err(opcode, operands)),
    }
}

fn want_entry(opcode: Opcode, operands: &[Operand], i: usize) -> Result<ArrayEntry, NetQasmError> {
    match operands.get(i) {
        Some(Operand::ArrayEntry(e)) => Ok(*e),
        _ => Err(shape_err(opcode, operands)),
    }
}

fn want_slice(opcode: Opcode, operands: &[Operand], i: usize) -> Result<ArraySlice, NetQasmError> {
    match operands.get(i) {
        Some(Operand::ArraySlice(s)) => Ok(*s),
        _ => Err(shape_err(opcode, operands)),
    }
}

fn want_angle(opcode: Opcode, operands: &[Operand], i: usize) -> Result<Angle, NetQasmError> {
    let num = want_imm(opcode, operands, i)?;
    let denom = want_imm(opcode, operands, i + 1)?;
    let as_u8 = |v: i32| -> Result<u8, NetQasmError> {
        u8::try_from(v).map_err(|_| NetQasmError::Encoding {
            message: format!("rotation immediate {v} of `{opcode}` does not fit one byte"),
        })
    };
    Angle::new(as_u8(num)?, as_u8(denom)?)
}

impl Instr {
    /// Builds a typed instruction from an opcode and untyped operands,
    /// checking the operand shape.
    ///
    /// Branch targets must already be resolved to immediates; a leftover
    /// [`Operand::Label`] is rejected here.
    pub fn from_operands(opcode: Opcode, operands: &[Operand]) -> Result<Instr, NetQasmError> {
        let arity = opcode.operand_kinds().len();
        // Rotation angles occupy two immediate slots in text/untyped form.
        if operands.len() != arity {
            return Err(shape_err(opcode, operands));
        }
        let reg = |i| want_reg(opcode, operands, i);
        let imm = |i| want_imm(opcode, operands, i);
        let addr = |i| want_addr(opcode, operands, i);
        let entry = |i| want_entry(opcode, operands, i);
        let slice = |i| want_slice(opcode, operands, i);
        let angle = |i| want_angle(opcode, operands, i);
        Ok(match opcode {
            Opcode::QAlloc => Instr::QAlloc { reg: reg(0)? },
            Opcode::Init => Instr::Init { reg: reg(0)? },
            Opcode::Array => Instr::Array { size: reg(0)?, address: addr(1)? },
            Opcode::Set => Instr::Set { reg: reg(0)?, imm: imm(1)? },
            Opcode::Store => Instr::Store { reg: reg(0)?, entry: entry(1)? },
            Opcode::Load => Instr::Load { reg: reg(0)?, entry: entry(1)? },
            Opcode::Undef => Instr::Undef { entry: entry(0)? },
            Opcode::Lea => Instr::Lea { reg: reg(0)?, address: addr(1)? },
            Opcode::Jmp => Instr::Jmp { line: imm(0)? },
            Opcode::Bez => Instr::Bez { reg: reg(0)?, line: imm(1)? },
            Opcode::Bnz => Instr::Bnz { reg: reg(0)?, line: imm(1)? },
            Opcode::Beq => Instr::Beq { reg0: reg(0)?, reg1: reg(1)?, line: imm(2)? },
            Opcode::Bne => Instr::Bne { reg0: reg(0)?, reg1: reg(1)?, line: imm(2)? },
            Opcode::Blt => Instr::Blt { reg0: reg(0)?, reg1: reg(1)?, line: imm(2)? },
            Opcode::Bge => Instr::Bge { reg0: reg(0)?, reg1: reg(1)?, line: imm(2)? },
            Opcode::Add => Instr::Add { out: reg(0)?, in0: reg(1)?, in1: reg(2)? },
            Opcode::Sub => Instr::Sub { out: reg(0)?, in0: reg(1)?, in1: reg(2)? },
            Opcode::Addm => Instr::Addm {
                out: reg(0)?,
                in0: reg(1)?,
                in1: reg(2)?,
                modulus: reg(3)?,
            },
            Opcode::Subm => Instr::Subm {
                out: reg(0)?,
                in0: reg(1)?,
                in1: reg(2)?,
                modulus: reg(3)?,
            },
            Opcode::X => Instr::X { reg: reg(0)? },
            Opcode::Y => Instr::Y { reg: reg(0)? },
            Opcode::Z => Instr::Z { reg: reg(0)? },
            Opcode::H => Instr::H { reg: reg(0)? },
            Opcode::S => Instr::S { reg: reg(0)? },
            Opcode::K => Instr::K { reg: reg(0)? },
            Opcode::T => Instr::T { reg: reg(0)? },
            Opcode::RotX => Instr::RotX { reg: reg(0)?, angle: angle(1)? },
            Opcode::RotY => Instr::RotY { reg: reg(0)?, angle: angle(1)? },
            Opcode::RotZ => Instr::RotZ { reg: reg(0)?, angle: angle(1)? },
            Opcode::Cnot => Instr::Cnot { reg0: reg(0)?, reg1: reg(1)? },
            Opcode::Cphase => Instr::Cphase { reg0: reg(0)?, reg1: reg(1)? },
            Opcode::Mov => Instr::Mov { reg0: reg(0)?, reg1: reg(1)? },
            Opcode::CrotX => Instr::CrotX { reg0: reg(0)?, reg1: reg(1)?, angle: angle(2)? },
            Opcode::CrotY => Instr::CrotY { reg0: reg(0)?, reg1: reg(1)?, angle: angle(2)? },
            Opcode::Meas => Instr::Meas { qreg: reg(0)?, creg: reg(1)? },
            Opcode::CreateEpr => Instr::CreateEpr {
                remote_node: reg(0)?,
                epr_socket: reg(1)?,
                qubit_addrs: reg(2)?,
                args: reg(3)?,
                results: reg(4)?,
            },
            Opcode::RecvEpr => Instr::RecvEpr {
                remote_node: reg(0)?,
                epr_socket: reg(1)?,
                qubit_addrs: reg(2)?,
                results: reg(3)?,
            },
            Opcode::WaitAll => Instr::WaitAll { slice: slice(0)? },
            Opcode::WaitAny => Instr::WaitAny { slice: slice(0)? },
            Opcode::WaitSingle => Instr::WaitSingle { entry: entry(0)? },
            Opcode::SendMsg => Instr::SendMsg { socket: reg(0)?, address: addr(1)? },
            Opcode::RecvMsg => Instr::RecvMsg { socket: reg(0)?, address: addr(1)? },
            Opcode::QFree => Instr::QFree { reg: reg(0)? },
            Opcode::RetReg => Instr::RetReg { reg: reg(0)? },
            Opcode::RetArr => Instr::RetArr { address: addr(0)? },
            Opcode::Breakpoint => {
                let action = BreakpointAction::from_i32(imm(0)?).ok_or_else(|| {
                    NetQasmError::Encoding {
                        message: format!("invalid breakpoint action {}", imm(0).unwrap_or(-1)),
                    }
                })?;
                let role = BreakpointRole::from_i32(imm(1)?).ok_or_else(|| {
                    NetQasmError::Encoding {
                        message: format!("invalid breakpoint role {}", imm(1).unwrap_or(-1)),
                    }
                })?;
                Instr::Breakpoint { action, role }
            }
        })
    }

    /// This instruction's opcode.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instr::QAlloc { .. } => Opcode::QAlloc,
            Instr::Init { .. } => Opcode::Init,
            Instr::Array { .. } => Opcode::Array,
            Instr::Set { .. } => Opcode::Set,
            Instr::Store { .. } => Opcode::Store,
            Instr::Load { .. } => Opcode::Load,
            Instr::Undef { .. } => Opcode::Undef,
            Instr::Lea { .. } => Opcode::Lea,
            Instr::Jmp { .. } => Opcode::Jmp,
            Instr::Bez { .. } => Opcode::Bez,
            Instr::Bnz { .. } => Opcode::Bnz,
            Instr::Beq { .. } => Opcode::Beq,
            Instr::Bne { .. } => Opcode::Bne,
            Instr::Blt { .. } => Opcode::Blt,
            Instr::Bge { .. } => Opcode::Bge,
            Instr::Add { .. } => Opcode::Add,
            Instr::Sub { .. } => Opcode::Sub,
            Instr::Addm { .. } => Opcode::Addm,
            Instr::Subm { .. } => Opcode::Subm,
            Instr::X { .. } => Opcode::X,
            Instr::Y { .. } => Opcode::Y,
            Instr::Z { .. } => Opcode::Z,
            Instr::H { .. } => Opcode::H,
            Instr::S { .. } => Opcode::S,
            Instr::K { .. } => Opcode::K,
            Instr::T { .. } => Opcode::T,
            Instr::RotX { .. } => Opcode::RotX,
            Instr::RotY { .. } => Opcode::RotY,
            Instr::RotZ { .. } => Opcode::RotZ,
            Instr::Cnot { .. } => Opcode::Cnot,
            Instr::Cphase { .. } => Opcode::Cphase,
            Instr::Mov { .. } => Opcode::Mov,
            Instr::CrotX { .. } => Opcode::CrotX,
            Instr::CrotY { .. } => Opcode::CrotY,
            Instr::Meas { .. } => Opcode::Meas,
            Instr::CreateEpr { .. } => Opcode::CreateEpr,
            Instr::RecvEpr { .. } => Opcode::RecvEpr,
            Instr::WaitAll { .. } => Opcode::WaitAll,
            Instr::WaitAny { .. } => Opcode::WaitAny,
            Instr::WaitSingle { .. } => Opcode::WaitSingle,
            Instr::SendMsg { .. } => Opcode::SendMsg,
            Instr::RecvMsg { .. } => Opcode::RecvMsg,
            Instr::QFree { .. } => Opcode::QFree,
            Instr::RetReg { .. } => Opcode::RetReg,
            Instr::RetArr { .. } => Opcode::RetArr,
            Instr::Breakpoint { .. } => Opcode::Breakpoint,
        }
    }

    /// The untyped operand list, in the order the operand shape defines.
    pub fn operands(&self) -> Vec<Operand> {
        use Operand as O;
        match self {
            Instr::QAlloc { reg }
            | Instr::Init { reg }
            | Instr::X { reg }
            | Instr::Y { reg }
            | Instr::Z { reg }
            | Instr::H { reg }
            | Instr::S { reg }
            | Instr::K { reg }
            | Instr::T { reg }
            | Instr::QFree { reg }
            | Instr::RetReg { reg } => vec![O::Register(*reg)],
            Instr::Array { size, address } => {
                vec![O::Register(*size), O::Address(*address)]
            }
            Instr::Set { reg, imm } => vec![O::Register(*reg), O::Immediate(*imm)],
            Instr::Store { reg, entry } | Instr::Load { reg, entry } => {
                vec![O::Register(*reg), O::ArrayEntry(*entry)]
            }
            Instr::Undef { entry } | Instr::WaitSingle { entry } => {
                vec![O::ArrayEntry(*entry)]
            }
            Instr::Lea { reg, address } => vec![O::Register(*reg), O::Address(*address)],
            Instr::Jmp { line } => vec![O::Immediate(*line)],
            Instr::Bez { reg, line } | Instr::Bnz { reg, line } => {
                vec![O::Register(*reg), O::Immediate(*line)]
            }
            Instr::Beq { reg0, reg1, line }
            | Instr::Bne { reg0, reg1, line }
            | Instr::Blt { reg0, reg1, line }
            | Instr::Bge { reg0, reg1, line } => {
                vec![O::Register(*reg0), O::Register(*reg1), O::Immediate(*line)]
            }
            Instr::Add { out, in0, in1 } | Instr::Sub { out, in0, in1 } => {
                vec![O::Register(*out), O::Register(*in0), O::Register(*in1)]
            }
            Instr::Addm { out, in0, in1, modulus }
            | Instr::Subm { out, in0, in1, modulus } => vec![
                O::Register(*out),
                O::Register(*in0),
                O::Register(*in1),
                O::Register(*modulus),
            ],
            Instr::RotX { reg, angle }
            | Instr::RotY { reg, angle }
            | Instr::RotZ { reg, angle } => vec![
                O::Register(*reg),
                O::Immediate(angle.num() as i32),
                O::Immediate(angle.denom() as i32),
            ],
            Instr::Cnot { reg0, reg1 }
            | Instr::Cphase { reg0, reg1 }
            | Instr::Mov { reg0, reg1 } => vec![O::Register(*reg0), O::Register(*reg1)],
            Instr::CrotX { reg0, reg1, angle } | Instr::CrotY { reg0, reg1, angle } => vec![
                O::Register(*reg0),
                O::Register(*reg1),
                O::Immediate(angle.num() as i32),
                O::Immediate(angle.denom() as i32),
            ],
            Instr::Meas { qreg, creg } => vec![O::Register(*qreg), O::Register(*creg)],
            Instr::CreateEpr {
                remote_node,
                epr_socket,
                qubit_addrs,
                args,
                results,
            } => vec![
                O::Register(*remote_node),
                O::Register(*epr_socket),
                O::Register(*qubit_addrs),
                O::Register(*args),
                O::Register(*results),
            ],
            Instr::RecvEpr {
                remote_node,
                epr_socket,
                qubit_addrs,
                results,
            } => vec![
                O::Register(*remote_node),
                O::Register(*epr_socket),
                O::Register(*qubit_addrs),
                O::Register(*results),
            ],
            Instr::WaitAll { slice } | Instr::WaitAny { slice } => {
                vec![O::ArraySlice(*slice)]
            }
            Instr::SendMsg { socket, address } | Instr::RecvMsg { socket, address } => {
                vec![O::Register(*socket), O::Address(*address)]
            }
            Instr::RetArr { address } => vec![O::Address(*address)],
            Instr::Breakpoint { action, role } => {
                vec![O::Immediate(*action as i32), O::Immediate(*role as i32)]
            }
        }
    }

    /// The branch target of a jump/branch instruction, if any.
    pub fn branch_target(&self) -> Option<i32> {
        match self {
            Instr::Jmp { line }
            | Instr::Bez { line, .. }
            | Instr::Bnz { line, .. }
            | Instr::Beq { line, .. }
            | Instr::Bne { line, .. }
            | Instr::Blt { line, .. }
            | Instr::Bge { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// Rewrites the branch target of a jump/branch instruction.
    ///
    /// No-op for non-branching instructions; used by the transpiler when
    /// gate expansion shifts instruction indices.
    pub fn set_branch_target(&mut self, new_line: i32) {
        match self {
            Instr::Jmp { line }
            | Instr::Bez { line, .. }
            | Instr::Bnz { line, .. }
            | Instr::Beq { line, .. }
            | Instr::Bne { line, .. }
            | Instr::Blt { line, .. }
            | Instr::Bge { line, .. } => *line = new_line,
            _ => {}
        }
    }

    /// The register this instruction writes a classical value into, if any.
    pub fn writes_to(&self) -> Option<Register> {
        match self {
            Instr::Set { reg, .. } | Instr::Load { reg, .. } | Instr::Lea { reg, .. } => Some(*reg),
            Instr::Add { out, .. }
            | Instr::Sub { out, .. }
            | Instr::Addm { out, .. }
            | Instr::Subm { out, .. } => Some(*out),
            Instr::Meas { creg, .. } => Some(*creg),
            _ => None,
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode().mnemonic())?;
        for operand in self.operands() {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}
