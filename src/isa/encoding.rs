// src/isa/encoding.rs

//! The binary subroutine format.
//!
//! A serialized subroutine is a 4-byte metadata header followed by
//! fixed-width 7-byte commands. The header carries the protocol version
//! (major, minor) and the application id (little-endian u16). Each command
//! is one opcode id byte, the operands in wire form, and zero padding up to
//! the command width. Decoding is strict: unknown ids, nonzero padding and
//! trailing bytes that do not fill a whole command are all rejected.
//!
//! Wire ids are flavour-relative, so [`decode`] takes the [`Flavour`] the
//! bytes were produced for.

use crate::core::{AppId, NetQasmError};
use crate::flavour::Flavour;
use crate::isa::instr::{Instr, Opcode, OperandKind};
use crate::isa::operand::{Address, ArrayEntry, ArraySlice, Operand, Register};
use crate::subroutine::Subroutine;

/// Width of the metadata header in bytes.
pub const HEADER_BYTES: usize = 4;

/// Width of every serialized command in bytes.
pub const COMMAND_BYTES: usize = 7;

/// Serializes a subroutine to its wire form.
pub fn encode(subroutine: &Subroutine) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_BYTES + COMMAND_BYTES * subroutine.instrs.len());
    out.push(subroutine.version.0);
    out.push(subroutine.version.1);
    out.extend_from_slice(&subroutine.app_id.0.to_le_bytes());
    for instr in &subroutine.instrs {
        encode_command(instr, &mut out);
    }
    out
}

fn encode_command(instr: &Instr, out: &mut Vec<u8>) {
    let start = out.len();
    let opcode = instr.opcode();
    out.push(opcode.id());
    let operands = instr.operands();
    for (kind, operand) in wire_kinds(opcode).iter().zip(&operands) {
        match (kind, operand) {
            (OperandKind::Register, Operand::Register(reg)) => out.push(reg.to_byte()),
            (OperandKind::Immediate, Operand::Immediate(value))
            | (OperandKind::BranchTarget, Operand::Immediate(value)) => {
                out.extend_from_slice(&value.to_le_bytes());
            }
            (OperandKind::RotImmediate, Operand::Immediate(value)) => out.push(*value as u8),
            (OperandKind::Address, Operand::Address(address)) => {
                out.extend_from_slice(&address.0.to_le_bytes());
            }
            (OperandKind::ArrayEntry, Operand::ArrayEntry(entry)) => {
                out.extend_from_slice(&entry.address.0.to_le_bytes());
                out.push(entry.index.to_byte());
            }
            (OperandKind::ArraySlice, Operand::ArraySlice(slice)) => {
                out.extend_from_slice(&slice.address.0.to_le_bytes());
                out.push(slice.start.to_byte());
                out.push(slice.stop.to_byte());
            }
            // Typed instructions always carry operands of the declared
            // kinds.
            _ => unreachable!("operand shape mismatch in typed instruction"),
        }
    }
    // Zero padding up to the fixed command width.
    out.resize(start + COMMAND_BYTES, 0);
}

/// Deserializes a subroutine from its wire form.
pub fn decode(bytes: &[u8], flavour: &Flavour) -> Result<Subroutine, NetQasmError> {
    if bytes.len() < HEADER_BYTES {
        return Err(NetQasmError::Encoding {
            message: format!("subroutine shorter than the {HEADER_BYTES}-byte header"),
        });
    }
    let (header, body) = bytes.split_at(HEADER_BYTES);
    let version = (header[0], header[1]);
    let app_id = AppId(u16::from_le_bytes([header[2], header[3]]));
    if body.len() % COMMAND_BYTES != 0 {
        return Err(NetQasmError::Encoding {
            message: format!(
                "subroutine body of {} bytes is not a whole number of {COMMAND_BYTES}-byte commands",
                body.len(),
            ),
        });
    }
    let mut instrs = Vec::with_capacity(body.len() / COMMAND_BYTES);
    for command in body.chunks_exact(COMMAND_BYTES) {
        instrs.push(decode_command(command, flavour, instrs.len())?);
    }
    Ok(Subroutine::new(version, app_id, instrs))
}

fn decode_command(
    command: &[u8],
    flavour: &Flavour,
    index: usize,
) -> Result<Instr, NetQasmError> {
    let id = command[0];
    let opcode = flavour.opcode_for_id(id).ok_or_else(|| NetQasmError::Encoding {
        message: format!(
            "unknown opcode id {id} at command {index} for the {} flavour",
            flavour.name(),
        ),
    })?;
    let mut cursor = Cursor { bytes: &command[1..], pos: 0 };
    let mut operands = Vec::new();
    for kind in wire_kinds(opcode) {
        operands.push(match kind {
            OperandKind::Register => Operand::Register(cursor.register()?),
            OperandKind::Immediate | OperandKind::BranchTarget => {
                Operand::Immediate(cursor.i32()?)
            }
            OperandKind::RotImmediate => Operand::Immediate(cursor.u8()? as i32),
            OperandKind::Address => Operand::Address(Address(cursor.i32()?)),
            OperandKind::ArrayEntry => Operand::ArrayEntry(ArrayEntry {
                address: Address(cursor.i32()?),
                index: cursor.register()?,
            }),
            OperandKind::ArraySlice => Operand::ArraySlice(ArraySlice {
                address: Address(cursor.i32()?),
                start: cursor.register()?,
                stop: cursor.register()?,
            }),
        });
    }
    if cursor.rest().iter().any(|&byte| byte != 0) {
        return Err(NetQasmError::Encoding {
            message: format!("nonzero padding in `{opcode}` command at index {index}"),
        });
    }
    Instr::from_operands(opcode, &operands)
}

/// The operand layout of a command on the wire.
///
/// Identical to [`Opcode::operand_kinds`] except that breakpoint operands
/// are single bytes.
fn wire_kinds(opcode: Opcode) -> &'static [OperandKind] {
    match opcode {
        Opcode::Breakpoint => &[OperandKind::RotImmediate, OperandKind::RotImmediate],
        _ => opcode.operand_kinds(),
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Result<u8, NetQasmError> {
        let byte = *self.bytes.get(self.pos).ok_or_else(|| NetQasmError::Encoding {
            message: "command operands overrun the command width".to_string(),
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn i32(&mut self) -> Result<i32, NetQasmError> {
        let mut word = [0u8; 4];
        for slot in &mut word {
            *slot = self.u8()?;
        }
        Ok(i32::from_le_bytes(word))
    }

    fn register(&mut self) -> Result<Register, NetQasmError> {
        Register::from_byte(self.u8()?)
    }

    fn rest(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }
}
