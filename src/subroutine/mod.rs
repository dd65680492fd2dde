// src/subroutine/mod.rs

//! Subroutines and their pre-assembly form.
//!
//! A [`PreSubroutine`] is the raw command stream a parser or builder
//! produces: opcodes with untyped operands, symbolic branch labels still in
//! place, and immediates allowed where the instruction wants a register.
//! [`PreSubroutine::finalize`] assembles it into a [`Subroutine`] of fully
//! typed instructions by materializing constants into registers, resolving
//! labels to absolute indices and checking every instruction against the
//! target flavour.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::{AppId, HostLine, NetQasmError, NETQASM_VERSION};
use crate::flavour::Flavour;
use crate::isa::instr::{Instr, Opcode, OperandKind};
use crate::isa::operand::{Operand, Register, RegisterName, REGISTERS_PER_BANK};

/// One raw command: an opcode, untyped operands and the host source line it
/// came from, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub lineno: Option<HostLine>,
}

impl Cmd {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Cmd {
        Cmd { opcode, operands, lineno: None }
    }

    pub fn with_lineno(opcode: Opcode, operands: Vec<Operand>, lineno: HostLine) -> Cmd {
        Cmd { opcode, operands, lineno: Some(lineno) }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        for operand in &self.operands {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

/// One item of a pre-assembly command stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Cmd(Cmd),
    /// A branch label naming the position of the next command.
    Label(String),
}

/// A subroutine before assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct PreSubroutine {
    pub app_id: AppId,
    pub items: Vec<Item>,
}

impl PreSubroutine {
    pub fn new(app_id: AppId) -> PreSubroutine {
        PreSubroutine { app_id, items: Vec::new() }
    }

    pub fn push(&mut self, cmd: Cmd) {
        self.items.push(Item::Cmd(cmd));
    }

    pub fn push_label(&mut self, name: impl Into<String>) {
        self.items.push(Item::Label(name.into()));
    }

    /// Number of commands, ignoring labels.
    pub fn command_count(&self) -> usize {
        self.items.iter().filter(|item| matches!(item, Item::Cmd(_))).count()
    }

    /// Assembles into a typed [`Subroutine`] for `flavour`.
    ///
    /// Runs, in order: constant materialization (an immediate in a register
    /// position becomes a fresh `set` plus a register reference), label
    /// resolution to absolute instruction indices, flavour support checks
    /// and operand type checks.
    pub fn finalize(&self, flavour: &Flavour) -> Result<Subroutine, NetQasmError> {
        let items = replace_constants(&self.items)?;
        let (cmds, labels) = resolve_labels(&items)?;
        let mut instrs = Vec::with_capacity(cmds.len());
        let mut debug_lines = HashMap::new();
        for (pc, cmd) in cmds.into_iter().enumerate() {
            flavour.check_supported(cmd.opcode)?;
            let operands = substitute_labels(cmd.opcode, &cmd.operands, &labels)?;
            instrs.push(Instr::from_operands(cmd.opcode, &operands)?);
            if let Some(lineno) = cmd.lineno {
                debug_lines.insert(pc, lineno);
            }
        }
        let mut subroutine = Subroutine::new(NETQASM_VERSION, self.app_id, instrs);
        subroutine.debug_lines = debug_lines;
        Ok(subroutine)
    }
}

impl fmt::Display for PreSubroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# NETQASM {}.{}", NETQASM_VERSION.0, NETQASM_VERSION.1)?;
        writeln!(f, "# APPID {}", self.app_id.0)?;
        for item in &self.items {
            match item {
                Item::Cmd(cmd) => writeln!(f, "{cmd}")?,
                Item::Label(name) => writeln!(f, "{name}:")?,
            }
        }
        Ok(())
    }
}

/// Rewrites immediates occupying register positions into fresh registers.
///
/// Each constant gets its own previously unused general-purpose register
/// and a `set` command immediately before the use.
fn replace_constants(items: &[Item]) -> Result<Vec<Item>, NetQasmError> {
    let mut used = used_registers(items);
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Item::Cmd(cmd) = item else {
            out.push(item.clone());
            continue;
        };
        let kinds = cmd.opcode.operand_kinds();
        let mut operands = cmd.operands.clone();
        for (i, operand) in operands.iter_mut().enumerate() {
            let wants_register = kinds.get(i) == Some(&OperandKind::Register);
            if !wants_register {
                continue;
            }
            if let Operand::Immediate(value) = *operand {
                let reg = fresh_register(&mut used)?;
                out.push(Item::Cmd(Cmd {
                    opcode: Opcode::Set,
                    operands: vec![Operand::Register(reg), Operand::Immediate(value)],
                    lineno: cmd.lineno,
                }));
                *operand = Operand::Register(reg);
            }
        }
        out.push(Item::Cmd(Cmd { opcode: cmd.opcode, operands, lineno: cmd.lineno }));
    }
    Ok(out)
}

fn used_registers(items: &[Item]) -> HashSet<Register> {
    let mut used = HashSet::new();
    for item in items {
        let Item::Cmd(cmd) = item else { continue };
        for operand in &cmd.operands {
            match operand {
                Operand::Register(reg) => {
                    used.insert(*reg);
                }
                Operand::ArrayEntry(entry) => {
                    used.insert(entry.index);
                }
                Operand::ArraySlice(slice) => {
                    used.insert(slice.start);
                    used.insert(slice.stop);
                }
                Operand::Immediate(_) | Operand::Address(_) | Operand::Label(_) => {}
            }
        }
    }
    used
}

fn fresh_register(used: &mut HashSet<Register>) -> Result<Register, NetQasmError> {
    for index in 0..REGISTERS_PER_BANK {
        let reg = Register { name: RegisterName::R, index };
        if used.insert(reg) {
            return Ok(reg);
        }
    }
    Err(NetQasmError::Layout {
        message: "no general-purpose register left for constant materialization".to_string(),
    })
}

/// Splits the stream into commands and a label table of absolute indices.
///
/// A label names the index of the command that follows it; a label at the
/// very end names one past the last command.
fn resolve_labels(items: &[Item]) -> Result<(Vec<Cmd>, HashMap<String, i32>), NetQasmError> {
    let mut cmds = Vec::new();
    let mut labels = HashMap::new();
    for item in items {
        match item {
            Item::Cmd(cmd) => cmds.push(cmd.clone()),
            Item::Label(name) => {
                if labels.insert(name.clone(), cmds.len() as i32).is_some() {
                    return Err(NetQasmError::Layout {
                        message: format!("duplicate label `{name}`"),
                    });
                }
            }
        }
    }
    Ok((cmds, labels))
}

fn substitute_labels(
    opcode: Opcode,
    operands: &[Operand],
    labels: &HashMap<String, i32>,
) -> Result<Vec<Operand>, NetQasmError> {
    operands
        .iter()
        .map(|operand| match operand {
            Operand::Label(name) => {
                let index = labels.get(name).ok_or_else(|| NetQasmError::Layout {
                    message: format!("branch of `{opcode}` targets unknown label `{name}`"),
                })?;
                Ok(Operand::Immediate(*index))
            }
            other => Ok(other.clone()),
        })
        .collect()
}

/// A fully assembled subroutine.
#[derive(Debug, Clone, PartialEq)]
pub struct Subroutine {
    /// Protocol version the subroutine was produced for.
    pub version: (u8, u8),
    pub app_id: AppId,
    pub instrs: Vec<Instr>,
    /// Instruction index to host source line, for error reporting. Not part
    /// of the wire form.
    pub debug_lines: HashMap<usize, HostLine>,
}

impl Subroutine {
    pub fn new(version: (u8, u8), app_id: AppId, instrs: Vec<Instr>) -> Subroutine {
        Subroutine { version, app_id, instrs, debug_lines: HashMap::new() }
    }

    /// Serializes to the binary wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::isa::encoding::encode(self)
    }

    /// Deserializes from the binary wire form produced for `flavour`.
    pub fn from_bytes(bytes: &[u8], flavour: &Flavour) -> Result<Subroutine, NetQasmError> {
        crate::isa::encoding::decode(bytes, flavour)
    }
}

impl fmt::Display for Subroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# NETQASM {}.{}", self.version.0, self.version.1)?;
        writeln!(f, "# APPID {}", self.app_id.0)?;
        for instr in &self.instrs {
            writeln!(f, "{instr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::operand::Address;

    fn reg(name: RegisterName, index: u8) -> Register {
        Register { name, index }
    }

    #[test]
    fn labels_resolve_to_command_indices() -> Result<(), NetQasmError> {
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push(Cmd::new(
            Opcode::Set,
            vec![Operand::Register(reg(RegisterName::R, 0)), Operand::Immediate(0)],
        ));
        pre.push_label("LOOP");
        pre.push(Cmd::new(
            Opcode::Bez,
            vec![
                Operand::Register(reg(RegisterName::R, 0)),
                Operand::Label("END".to_string()),
            ],
        ));
        pre.push(Cmd::new(
            Opcode::Jmp,
            vec![Operand::Label("LOOP".to_string())],
        ));
        pre.push_label("END");
        let sub = pre.finalize(&Flavour::vanilla())?;
        assert_eq!(sub.instrs[1], Instr::Bez { reg: reg(RegisterName::R, 0), line: 3 });
        assert_eq!(sub.instrs[2], Instr::Jmp { line: 1 });
        Ok(())
    }

    #[test]
    fn unknown_label_is_a_layout_error() {
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push(Cmd::new(Opcode::Jmp, vec![Operand::Label("NOWHERE".to_string())]));
        assert!(matches!(
            pre.finalize(&Flavour::vanilla()),
            Err(NetQasmError::Layout { .. }),
        ));
    }

    #[test]
    fn duplicate_label_is_a_layout_error() {
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push_label("L");
        pre.push(Cmd::new(Opcode::QAlloc, vec![Operand::Register(reg(RegisterName::Q, 0))]));
        pre.push_label("L");
        assert!(matches!(
            pre.finalize(&Flavour::vanilla()),
            Err(NetQasmError::Layout { .. }),
        ));
    }

    #[test]
    fn register_exhaustion_is_a_layout_error() {
        // Every R register is taken, so the immediate in `add` has nowhere
        // to be materialized.
        let mut pre = PreSubroutine::new(AppId(0));
        for index in 0..REGISTERS_PER_BANK {
            pre.push(Cmd::new(
                Opcode::Set,
                vec![Operand::Register(reg(RegisterName::R, index)), Operand::Immediate(0)],
            ));
        }
        pre.push(Cmd::new(
            Opcode::Add,
            vec![
                Operand::Register(reg(RegisterName::R, 0)),
                Operand::Register(reg(RegisterName::R, 1)),
                Operand::Immediate(7),
            ],
        ));
        assert!(matches!(
            pre.finalize(&Flavour::vanilla()),
            Err(NetQasmError::Layout { .. }),
        ));
    }

    #[test]
    fn constants_in_register_positions_become_set_commands() -> Result<(), NetQasmError> {
        // `add R5 1 2` needs two fresh registers; R5 itself stays.
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push(Cmd::new(
            Opcode::Add,
            vec![
                Operand::Register(reg(RegisterName::R, 5)),
                Operand::Immediate(1),
                Operand::Immediate(2),
            ],
        ));
        let sub = pre.finalize(&Flavour::vanilla())?;
        assert_eq!(sub.instrs.len(), 3);
        assert_eq!(sub.instrs[0], Instr::Set { reg: reg(RegisterName::R, 0), imm: 1 });
        assert_eq!(sub.instrs[1], Instr::Set { reg: reg(RegisterName::R, 1), imm: 2 });
        assert_eq!(
            sub.instrs[2],
            Instr::Add {
                out: reg(RegisterName::R, 5),
                in0: reg(RegisterName::R, 0),
                in1: reg(RegisterName::R, 1),
            },
        );
        Ok(())
    }

    #[test]
    fn set_immediate_is_not_materialized() -> Result<(), NetQasmError> {
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push(Cmd::new(
            Opcode::Set,
            vec![Operand::Register(reg(RegisterName::R, 0)), Operand::Immediate(9)],
        ));
        let sub = pre.finalize(&Flavour::vanilla())?;
        assert_eq!(sub.instrs, vec![Instr::Set { reg: reg(RegisterName::R, 0), imm: 9 }]);
        Ok(())
    }

    #[test]
    fn flavour_rejects_unsupported_opcode() {
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push(Cmd::new(
            Opcode::Cnot,
            vec![
                Operand::Register(reg(RegisterName::Q, 0)),
                Operand::Register(reg(RegisterName::Q, 1)),
            ],
        ));
        assert!(matches!(
            pre.finalize(&Flavour::nv()),
            Err(NetQasmError::UnsupportedOperation { .. }),
        ));
    }

    #[test]
    fn finalize_records_source_lines() -> Result<(), NetQasmError> {
        let mut pre = PreSubroutine::new(AppId(0));
        pre.push(Cmd::with_lineno(
            Opcode::RetArr,
            vec![Operand::Address(Address(0))],
            HostLine(12),
        ));
        let sub = pre.finalize(&Flavour::vanilla())?;
        assert_eq!(sub.debug_lines.get(&0), Some(&HostLine(12)));
        Ok(())
    }
}
