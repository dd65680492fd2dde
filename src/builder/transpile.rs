// src/builder/transpile.rs

//! Lowering of universal-flavour subroutines onto the NV flavour.
//!
//! Single-qubit gates are replaced by the fixed rotation sequences the
//! flavour tables carry, rotations are re-expressed at the hardware
//! denominator exponent, and the universal two-qubit gates are rewritten
//! into electron-controlled rotations. The electron is the communication
//! qubit and always has virtual id 0; a gate between two carbons is
//! realized by swapping one carbon onto a freshly addressed electron
//! register, applying the electron-carbon form and swapping back.
//!
//! Gate expansion shifts instruction indices, so branch targets are
//! remapped afterwards.

use std::collections::{HashMap, HashSet};

use crate::core::NetQasmError;
use crate::flavour::{Flavour, RotAxis};
use crate::isa::angle::Angle;
use crate::isa::instr::{Instr, Opcode};
use crate::isa::operand::{Operand, Register, RegisterName, REGISTERS_PER_BANK};
use crate::subroutine::Subroutine;

/// Virtual id of the electron (communication) qubit.
const ELECTRON_ID: i32 = 0;

/// Denominator exponent every compiled rotation angle carries.
const HARDWARE_DENOM: u8 = 4;

/// Rewrites a universal-flavour subroutine into the NV flavour.
pub fn to_nv(subroutine: &Subroutine) -> Result<Subroutine, NetQasmError> {
    Transpiler::new(subroutine).run()
}

struct Transpiler<'a> {
    source: &'a Subroutine,
    flavour: Flavour,
    /// Compile-time Q-register values, tracked through `set` instructions.
    register_values: HashMap<Register, i32>,
    used_registers: HashSet<Register>,
}

fn angle4(num: u8) -> Angle {
    Angle::new(num, HARDWARE_DENOM).expect("hardware denominator is in range")
}

fn rot(axis: RotAxis, reg: Register, num: u8) -> Instr {
    let angle = angle4(num);
    match axis {
        RotAxis::X => Instr::RotX { reg, angle },
        RotAxis::Y => Instr::RotY { reg, angle },
        RotAxis::Z => Instr::RotZ { reg, angle },
    }
}

fn crot_x(control: Register, target: Register, num: u8) -> Instr {
    Instr::CrotX { reg0: control, reg1: target, angle: angle4(num) }
}

fn crot_y(control: Register, target: Register, num: u8) -> Instr {
    Instr::CrotY { reg0: control, reg1: target, angle: angle4(num) }
}

impl<'a> Transpiler<'a> {
    fn new(source: &'a Subroutine) -> Transpiler<'a> {
        Transpiler {
            source,
            flavour: Flavour::nv(),
            register_values: HashMap::new(),
            used_registers: HashSet::new(),
        }
    }

    fn run(mut self) -> Result<Subroutine, NetQasmError> {
        let mut out: Vec<Instr> = Vec::with_capacity(self.source.instrs.len());
        let mut debug_lines = HashMap::new();
        // Old instruction index to its first replacement's index.
        let mut index_changes = HashMap::new();

        for (old_index, instr) in self.source.instrs.iter().enumerate() {
            if let Instr::Set { reg, imm } = instr {
                if reg.name == RegisterName::Q {
                    self.register_values.insert(*reg, *imm);
                }
            }
            for operand in instr.operands() {
                if let Operand::Register(reg) = operand {
                    self.used_registers.insert(reg);
                }
            }

            index_changes.insert(old_index as i32, out.len() as i32);
            if let Some(line) = self.source.debug_lines.get(&old_index) {
                debug_lines.insert(out.len(), *line);
            }
            out.extend(self.map_instr(instr)?);
        }

        let old_len = self.source.instrs.len() as i32;
        let new_len = out.len() as i32;
        let mut needs_trailing_no_op = false;
        for instr in &mut out {
            let Some(target) = instr.branch_target() else { continue };
            if target == old_len {
                // A label sat past the last instruction; give the branch a
                // harmless instruction to land on.
                needs_trailing_no_op = true;
                instr.set_branch_target(new_len);
            } else {
                let mapped = index_changes.get(&target).ok_or_else(|| {
                    NetQasmError::Compile {
                        message: format!("branch targets invalid instruction index {target}"),
                    }
                })?;
                instr.set_branch_target(*mapped);
            }
        }
        if needs_trailing_no_op {
            out.push(Instr::Set {
                reg: Register { name: RegisterName::C, index: 15 },
                imm: 1337,
            });
        }

        let mut compiled = Subroutine::new(self.source.version, self.source.app_id, out);
        compiled.debug_lines = debug_lines;
        Ok(compiled)
    }

    fn map_instr(&mut self, instr: &Instr) -> Result<Vec<Instr>, NetQasmError> {
        Ok(match instr {
            Instr::X { reg }
            | Instr::Y { reg }
            | Instr::Z { reg }
            | Instr::H { reg }
            | Instr::S { reg }
            | Instr::K { reg }
            | Instr::T { reg } => self.fixed_gate(instr.opcode(), *reg)?,
            Instr::RotX { reg, angle } => vec![Instr::RotX {
                reg: *reg,
                angle: angle.with_denominator(HARDWARE_DENOM)?,
            }],
            Instr::RotY { reg, angle } => vec![Instr::RotY {
                reg: *reg,
                angle: angle.with_denominator(HARDWARE_DENOM)?,
            }],
            Instr::RotZ { reg, angle } => vec![Instr::RotZ {
                reg: *reg,
                angle: angle.with_denominator(HARDWARE_DENOM)?,
            }],
            Instr::Cnot { reg0, reg1 } => self.map_cnot(*reg0, *reg1)?,
            Instr::Cphase { reg0, reg1 } => self.map_cphase(*reg0, *reg1)?,
            Instr::Mov { reg0, reg1 } => self.map_mov(*reg0, *reg1)?,
            other => vec![other.clone()],
        })
    }

    fn fixed_gate(&self, opcode: Opcode, reg: Register) -> Result<Vec<Instr>, NetQasmError> {
        let steps = self.flavour.decomposition(opcode).ok_or_else(|| {
            NetQasmError::Compile {
                message: format!("no decomposition for `{opcode}`"),
            }
        })?;
        Ok(steps.iter().map(|step| rot(step.axis, reg, step.angle.num())).collect())
    }

    fn value_of(&self, reg: Register) -> Option<i32> {
        self.register_values.get(&reg).copied()
    }

    fn fresh_electron_register(&self) -> Result<Register, NetQasmError> {
        for index in 0..REGISTERS_PER_BANK {
            let reg = Register { name: RegisterName::Q, index };
            if !self.used_registers.contains(&reg) {
                return Ok(reg);
            }
        }
        Err(NetQasmError::Compile {
            message: "no free qubit register for a carbon-carbon rewrite".to_string(),
        })
    }

    /// The state swap between the electron and a carbon.
    fn swap(&self, electron: Register, carbon: Register) -> Vec<Instr> {
        vec![
            crot_x(electron, carbon, 8),
            rot(RotAxis::X, electron, 24),
            rot(RotAxis::Y, electron, 16),
            rot(RotAxis::Z, carbon, 24),
            crot_x(electron, carbon, 8),
            rot(RotAxis::X, electron, 8),
            rot(RotAxis::Y, electron, 8),
            rot(RotAxis::X, carbon, 8),
            rot(RotAxis::Z, carbon, 8),
            crot_x(electron, carbon, 8),
            rot(RotAxis::Y, electron, 16),
            rot(RotAxis::Z, carbon, 16),
        ]
    }

    fn map_cnot(&mut self, reg0: Register, reg1: Register) -> Result<Vec<Instr>, NetQasmError> {
        let (id0, id1) = self.two_qubit_ids(Opcode::Cnot, reg0, reg1)?;
        Ok(if id0 == ELECTRON_ID {
            cnot_electron_carbon(reg0, reg1)
        } else if id1 == ELECTRON_ID {
            cnot_carbon_electron(self, reg1, reg0)?
        } else {
            self.via_electron_swap(reg0, reg1, cnot_electron_carbon)?
        })
    }

    fn map_cphase(&mut self, reg0: Register, reg1: Register) -> Result<Vec<Instr>, NetQasmError> {
        let (id0, id1) = self.two_qubit_ids(Opcode::Cphase, reg0, reg1)?;
        Ok(if id0 == ELECTRON_ID {
            cphase_electron_carbon(reg0, reg1)
        } else if id1 == ELECTRON_ID {
            // A controlled phase is symmetric in its qubits.
            cphase_electron_carbon(reg1, reg0)
        } else {
            self.via_electron_swap(reg0, reg1, cphase_electron_carbon)?
        })
    }

    fn map_mov(&mut self, reg0: Register, reg1: Register) -> Result<Vec<Instr>, NetQasmError> {
        match (self.value_of(reg0), self.value_of(reg1)) {
            // Values unknown at compile time only happen when moving the
            // freshly delivered communication qubit into memory.
            (None, _) | (_, None) => Ok(mov_electron_carbon(reg0, reg1)),
            (Some(ELECTRON_ID), Some(id1)) if id1 != ELECTRON_ID => {
                Ok(mov_electron_carbon(reg0, reg1))
            }
            (Some(id0), Some(ELECTRON_ID)) if id0 != ELECTRON_ID => {
                Ok(mov_carbon_electron(reg1, reg0))
            }
            (Some(id0), Some(id1)) => Err(NetQasmError::Compile {
                message: format!("cannot move qubit {id0} onto qubit {id1}"),
            }),
        }
    }

    fn two_qubit_ids(
        &self,
        opcode: Opcode,
        reg0: Register,
        reg1: Register,
    ) -> Result<(i32, i32), NetQasmError> {
        let resolve = |reg: Register| {
            self.value_of(reg).ok_or_else(|| NetQasmError::Compile {
                message: format!(
                    "cannot compile `{opcode}`: the value of {reg} is unknown at compile time",
                ),
            })
        };
        let (id0, id1) = (resolve(reg0)?, resolve(reg1)?);
        if id0 == id1 {
            return Err(NetQasmError::Compile {
                message: format!("`{opcode}` applied to qubit {id0} twice"),
            });
        }
        Ok((id0, id1))
    }

    /// Rewrites a carbon-carbon gate: swap one carbon onto the electron,
    /// apply the electron-carbon form, swap back.
    fn via_electron_swap(
        &mut self,
        carbon0: Register,
        carbon1: Register,
        electron_carbon: fn(Register, Register) -> Vec<Instr>,
    ) -> Result<Vec<Instr>, NetQasmError> {
        let electron = self.fresh_electron_register()?;
        let mut result = vec![Instr::Set { reg: electron, imm: ELECTRON_ID }];
        result.extend(self.swap(electron, carbon0));
        result.extend(electron_carbon(electron, carbon1));
        result.extend(self.swap(electron, carbon0));
        Ok(result)
    }
}

fn cnot_electron_carbon(electron: Register, carbon: Register) -> Vec<Instr> {
    vec![
        crot_x(electron, carbon, 8),
        rot(RotAxis::Z, electron, 24),
        rot(RotAxis::X, carbon, 24),
    ]
}

fn cnot_carbon_electron(
    transpiler: &Transpiler<'_>,
    electron: Register,
    carbon: Register,
) -> Result<Vec<Instr>, NetQasmError> {
    let electron_hadamard = transpiler.fixed_gate(Opcode::H, electron)?;
    let mut gates = electron_hadamard.clone();
    gates.extend([
        rot(RotAxis::Y, carbon, 8),
        crot_x(electron, carbon, 8),
        rot(RotAxis::Z, electron, 24),
        rot(RotAxis::X, carbon, 24),
        rot(RotAxis::Y, carbon, 24),
    ]);
    gates.extend(electron_hadamard);
    Ok(gates)
}

fn cphase_electron_carbon(electron: Register, carbon: Register) -> Vec<Instr> {
    vec![
        rot(RotAxis::Y, carbon, 8),
        crot_x(electron, carbon, 8),
        rot(RotAxis::Z, electron, 24),
        rot(RotAxis::X, carbon, 24),
        rot(RotAxis::Y, carbon, 24),
    ]
}

fn mov_electron_carbon(electron: Register, carbon: Register) -> Vec<Instr> {
    vec![
        rot(RotAxis::Y, electron, 8),
        crot_y(electron, carbon, 24),
        rot(RotAxis::X, electron, 24),
        crot_x(electron, carbon, 8),
    ]
}

fn mov_carbon_electron(electron: Register, carbon: Register) -> Vec<Instr> {
    vec![
        rot(RotAxis::Y, electron, 8),
        crot_y(electron, carbon, 24),
        rot(RotAxis::X, electron, 24),
        crot_x(electron, carbon, 8),
        rot(RotAxis::Y, electron, 24),
        rot(RotAxis::Z, electron, 24),
    ]
}
