// src/isa/operand.rs

//! Operand types: registers, array addresses, entries and slices.

use std::fmt;
use std::str::FromStr;

use crate::core::NetQasmError;

/// Number of register banks.
pub const REGISTER_BANKS: usize = 4;
/// Number of slots per register bank.
pub const REGISTERS_PER_BANK: u8 = 16;

/// The four register banks.
///
/// By convention the compiler uses `R` for general temporaries, `C` for
/// constants, `Q` for virtual qubit addresses and `M` for measurement
/// outcomes. The executor treats all banks uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegisterName {
    /// General-purpose registers.
    R = 0,
    /// Registers for constants.
    C = 1,
    /// Registers holding virtual qubit addresses.
    Q = 2,
    /// Registers holding measurement outcomes.
    M = 3,
}

impl RegisterName {
    /// All banks, in encoding order.
    pub const ALL: [RegisterName; REGISTER_BANKS] = [
        RegisterName::R,
        RegisterName::C,
        RegisterName::Q,
        RegisterName::M,
    ];

    /// Decodes the two-bit bank tag used in the binary form.
    pub fn from_tag(tag: u8) -> Option<RegisterName> {
        Self::ALL.get(tag as usize).copied()
    }
}

impl fmt::Display for RegisterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            RegisterName::R => 'R',
            RegisterName::C => 'C',
            RegisterName::Q => 'Q',
            RegisterName::M => 'M',
        };
        write!(f, "{c}")
    }
}

/// A register reference: a bank plus a slot index in `0..16`.
///
/// Encoded as a single byte: two bits of bank tag in the low bits, four bits
/// of index above them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    /// The bank this register lives in.
    pub name: RegisterName,
    /// Slot index within the bank; must be below [`REGISTERS_PER_BANK`].
    pub index: u8,
}

impl Register {
    /// Creates a register reference, validating the slot index.
    pub fn new(name: RegisterName, index: u8) -> Result<Register, NetQasmError> {
        if index >= REGISTERS_PER_BANK {
            return Err(NetQasmError::Layout {
                message: format!(
                    "register index {index} out of range (bank {name} has {REGISTERS_PER_BANK} slots)"
                ),
            });
        }
        Ok(Register { name, index })
    }

    /// Packs this register into its one-byte binary form.
    pub fn to_byte(self) -> u8 {
        (self.name as u8) | (self.index << 2)
    }

    /// Unpacks a register from its one-byte binary form.
    pub fn from_byte(byte: u8) -> Result<Register, NetQasmError> {
        let name = RegisterName::from_tag(byte & 0b11).ok_or_else(|| NetQasmError::Encoding {
            message: format!("invalid register bank tag in byte {byte:#04x}"),
        })?;
        let index = (byte >> 2) & 0b1111;
        if byte >> 6 != 0 {
            return Err(NetQasmError::Encoding {
                message: format!("nonzero padding bits in register byte {byte:#04x}"),
            });
        }
        Ok(Register { name, index })
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.index)
    }
}

impl FromStr for Register {
    type Err = NetQasmError;

    /// Parses the textual form, e.g. `R0`, `Q15`.
    fn from_str(s: &str) -> Result<Register, NetQasmError> {
        let err = || NetQasmError::Encoding {
            message: format!("`{s}` is not a valid register"),
        };
        let mut chars = s.chars();
        let name = match chars.next().ok_or_else(err)? {
            'R' => RegisterName::R,
            'C' => RegisterName::C,
            'Q' => RegisterName::Q,
            'M' => RegisterName::M,
            _ => return Err(err()),
        };
        let index: u8 = chars.as_str().parse().map_err(|_| err())?;
        Register::new(name, index).map_err(|_| err())
    }
}

/// The compile-time address of an array, written `@addr` in text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub i32);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A single array slot, written `@addr[index]`; the index is read from a
/// register at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayEntry {
    /// Array this entry belongs to.
    pub address: Address,
    /// Register holding the slot index.
    pub index: Register,
}

impl fmt::Display for ArrayEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.address, self.index)
    }
}

/// A half-open range of array slots, written `@addr[start:stop]`; both
/// bounds are read from registers at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArraySlice {
    /// Array this slice belongs to.
    pub address: Address,
    /// Register holding the inclusive start index.
    pub start: Register,
    /// Register holding the exclusive stop index.
    pub stop: Register,
}

impl fmt::Display for ArraySlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.address, self.start, self.stop)
    }
}

/// An operand as it appears in an untyped command, before the opcode's
/// operand shape has been checked.
///
/// `Label` only occurs in pre-subroutines; label resolution replaces it with
/// an `Immediate` instruction index before instructions are typed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A literal 32-bit value.
    Immediate(i32),
    /// A register reference.
    Register(Register),
    /// An array address.
    Address(Address),
    /// A single array slot.
    ArrayEntry(ArrayEntry),
    /// A range of array slots.
    ArraySlice(ArraySlice),
    /// A symbolic branch target; compile-time only.
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Immediate(v) => write!(f, "{v}"),
            Operand::Register(r) => write!(f, "{r}"),
            Operand::Address(a) => write!(f, "{a}"),
            Operand::ArrayEntry(e) => write!(f, "{e}"),
            Operand::ArraySlice(s) => write!(f, "{s}"),
            Operand::Label(l) => write!(f, "{l}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_byte_round_trip() {
        for name in RegisterName::ALL {
            for index in 0..REGISTERS_PER_BANK {
                let reg = Register { name, index };
                assert_eq!(Register::from_byte(reg.to_byte()).unwrap(), reg);
            }
        }
    }

    #[test]
    fn register_text_round_trip() {
        let reg: Register = "M7".parse().unwrap();
        assert_eq!(reg.name, RegisterName::M);
        assert_eq!(reg.index, 7);
        assert_eq!(reg.to_string(), "M7");
    }

    #[test]
    fn register_index_out_of_range_rejected() {
        assert!("R16".parse::<Register>().is_err());
        assert!(Register::new(RegisterName::R, 16).is_err());
    }

    #[test]
    fn register_byte_with_padding_bits_rejected() {
        assert!(Register::from_byte(0b1100_0000).is_err());
    }
}
