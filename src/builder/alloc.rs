// src/builder/alloc.rs

//! Physical register assignment for built subroutines.
//!
//! The builder works with an unbounded supply of virtual registers; this
//! pass maps each one onto a physical register of its bank. Liveness is
//! computed per virtual register as the span from its first to its last
//! occurrence, found with one backward sweep, and a linear scan then hands
//! out the lowest free index at each interval start. Two virtual registers
//! share a physical one only when their spans are disjoint; running out of
//! indices in a bank is a layout error.
//!
//! Control flow makes occurrence spans a safe over-approximation: a branch
//! can only jump within the subroutine, so the span from first to last
//! occurrence covers every path on which the register is live.

use std::collections::HashMap;

use crate::core::NetQasmError;
use crate::isa::instr::Opcode;
use crate::isa::operand::{Register, RegisterName, REGISTERS_PER_BANK};

use super::{VItem, VOperand, VirtReg};

/// Assigns a physical register to every virtual register in the stream.
pub(super) fn assign_registers(
    items: &[VItem],
) -> Result<HashMap<VirtReg, Register>, NetQasmError> {
    let mut first_seen: HashMap<VirtReg, usize> = HashMap::new();
    let mut last_seen: HashMap<VirtReg, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate().rev() {
        let VItem::Cmd { opcode, operands, .. } = item else { continue };
        // A returned register is read out by the host after the run, so its
        // span extends to the end of the stream.
        let end = if *opcode == Opcode::RetReg { items.len() } else { index };
        for operand in operands {
            for virt in operand.virt_regs() {
                let slot = last_seen.entry(virt).or_insert(end);
                *slot = (*slot).max(end);
                first_seen.insert(virt, index);
            }
        }
    }

    // Spans sorted by start for the linear scan.
    let mut spans: Vec<(VirtReg, usize, usize)> = first_seen
        .iter()
        .map(|(&virt, &start)| (virt, start, last_seen[&virt]))
        .collect();
    spans.sort_by_key(|&(virt, start, _)| (start, virt));

    let mut free: HashMap<RegisterName, Vec<bool>> = RegisterName::ALL
        .iter()
        .map(|&bank| (bank, vec![true; REGISTERS_PER_BANK as usize]))
        .collect();
    let mut active: Vec<(usize, Register, VirtReg)> = Vec::new();
    let mut assignment = HashMap::new();

    for (virt, start, stop) in spans {
        // Release registers whose spans ended before this one starts.
        active.retain(|&(end, reg, _)| {
            if end < start {
                if let Some(bank) = free.get_mut(&reg.name) {
                    bank[reg.index as usize] = true;
                }
                false
            } else {
                true
            }
        });
        let bank = free.get_mut(&virt.bank).ok_or_else(|| NetQasmError::Layout {
            message: format!("unknown register bank {:?}", virt.bank),
        })?;
        let index = bank.iter().position(|&slot| slot).ok_or_else(|| {
            NetQasmError::Layout {
                message: format!(
                    "out of {} registers: more than {REGISTERS_PER_BANK} values live at once",
                    virt.bank,
                ),
            }
        })?;
        bank[index] = false;
        let reg = Register { name: virt.bank, index: index as u8 };
        active.push((stop, reg, virt));
        assignment.insert(virt, reg);
    }
    Ok(assignment)
}
