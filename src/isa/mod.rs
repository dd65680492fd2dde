// src/isa/mod.rs

//! The NetQASM instruction set: operands, typed instructions, rotation
//! angles and the fixed-layout binary encoding.

pub mod angle;
pub mod encoding;
pub mod instr;
pub mod operand;

pub use angle::Angle;
pub use instr::{BreakpointAction, BreakpointRole, Instr, Opcode};
pub use operand::{Address, ArrayEntry, ArraySlice, Operand, Register, RegisterName};
