// src/executor/mod.rs

//! The subroutine execution engine.
//!
//! [`Executor`] owns the classical state of one application: the register
//! file and the array memory. It interprets a [`Subroutine`] instruction by
//! instruction, dispatching every quantum and network operation to an
//! injected [`Processor`]. Classical memory persists across runs, so a host
//! can submit a sequence of subroutines that share arrays.

pub mod processor;

pub use processor::{Processor, ProcessorError, SimProcessor, ENT_INFO_LENGTH};

use std::collections::HashMap;

use crate::core::NetQasmError;
use crate::flavour::RotAxis;
use crate::isa::instr::Instr;
use crate::isa::operand::{
    Address, ArrayEntry, ArraySlice, Register, REGISTERS_PER_BANK, REGISTER_BANKS,
};
use crate::subroutine::Subroutine;

/// Values a subroutine returned to the host via `ret_reg` and `ret_arr`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Output {
    pub registers: HashMap<Register, i32>,
    pub arrays: HashMap<Address, Vec<Option<i32>>>,
}

impl Output {
    /// Convenience accessor for a returned register by text name.
    pub fn register(&self, name: &str) -> Option<i32> {
        let reg: Register = name.parse().ok()?;
        self.registers.get(&reg).copied()
    }
}

/// Executes subroutines against a [`Processor`].
#[derive(Debug)]
pub struct Executor<P> {
    processor: P,
    registers: [[i32; REGISTERS_PER_BANK as usize]; REGISTER_BANKS],
    arrays: HashMap<Address, Vec<Option<i32>>>,
    pc: usize,
}

impl<P: Processor> Executor<P> {
    /// Creates an executor with a zeroed register file and empty memory.
    pub fn new(processor: P) -> Executor<P> {
        Executor {
            processor,
            registers: [[0; REGISTERS_PER_BANK as usize]; REGISTER_BANKS],
            arrays: HashMap::new(),
            pc: 0,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    pub fn into_processor(self) -> P {
        self.processor
    }

    /// Current value of a register.
    pub fn register(&self, reg: Register) -> i32 {
        self.registers[reg.name as usize][reg.index as usize]
    }

    fn set_register(&mut self, reg: Register, value: i32) {
        self.registers[reg.name as usize][reg.index as usize] = value;
    }

    /// The array at `address`, if declared.
    pub fn array(&self, address: Address) -> Option<&[Option<i32>]> {
        self.arrays.get(&address).map(Vec::as_slice)
    }

    /// Runs one subroutine to completion and collects its returned values.
    ///
    /// The program counter starts at 0 and the run ends when it moves past
    /// the last instruction. Branch instructions set it to their target;
    /// every other instruction advances it by one.
    pub fn run(&mut self, subroutine: &Subroutine) -> Result<Output, NetQasmError> {
        self.pc = 0;
        let mut output = Output::default();
        while self.pc < subroutine.instrs.len() {
            let pc = self.pc;
            let instr = &subroutine.instrs[pc];
            let next = self
                .execute(instr, &mut output)
                .map_err(|err| self.attach_location(err, subroutine))?;
            self.pc = match next {
                Some(target) => target,
                None => pc + 1,
            };
        }
        Ok(output)
    }

    /// Executes one instruction; `Ok(Some(pc))` is a taken branch.
    fn execute(
        &mut self,
        instr: &Instr,
        output: &mut Output,
    ) -> Result<Option<usize>, NetQasmError> {
        match instr {
            Instr::QAlloc { reg } => {
                let virt_id = self.register(*reg);
                self.dispatch(|p| p.qalloc(virt_id))?;
            }
            Instr::Init { reg } => {
                let virt_id = self.register(*reg);
                self.dispatch(|p| p.init(virt_id))?;
            }
            Instr::Array { size, address } => {
                let size = self.register(*size);
                let size = usize::try_from(size).map_err(|_| self.address_error(
                    format!("array at {address} declared with negative length {size}"),
                ))?;
                if self.arrays.insert(*address, vec![None; size]).is_some() {
                    return Err(self.execution_error(format!(
                        "array at {address} is already declared",
                    )));
                }
            }
            Instr::Set { reg, imm } => self.set_register(*reg, *imm),
            Instr::Store { reg, entry } => {
                let value = self.register(*reg);
                let (address, index) = self.resolve_entry(*entry)?;
                if let Some(array) = self.arrays.get_mut(&address) {
                    array[index] = Some(value);
                }
            }
            Instr::Load { reg, entry } => {
                let (address, index) = self.resolve_entry(*entry)?;
                let slot = self.arrays[&address][index];
                let value = slot.ok_or_else(|| NetQasmError::NotYetAvailable {
                    message: format!("array slot {address}[{index}] holds no value yet"),
                })?;
                self.set_register(*reg, value);
            }
            Instr::Undef { entry } => {
                let (address, index) = self.resolve_entry(*entry)?;
                if let Some(array) = self.arrays.get_mut(&address) {
                    array[index] = None;
                }
            }
            Instr::Lea { reg, address } => self.set_register(*reg, address.0),
            Instr::Jmp { line } => return self.branch_target(*line).map(Some),
            Instr::Bez { reg, line } => {
                if self.register(*reg) == 0 {
                    return self.branch_target(*line).map(Some);
                }
            }
            Instr::Bnz { reg, line } => {
                if self.register(*reg) != 0 {
                    return self.branch_target(*line).map(Some);
                }
            }
            Instr::Beq { reg0, reg1, line } => {
                if self.register(*reg0) == self.register(*reg1) {
                    return self.branch_target(*line).map(Some);
                }
            }
            Instr::Bne { reg0, reg1, line } => {
                if self.register(*reg0) != self.register(*reg1) {
                    return self.branch_target(*line).map(Some);
                }
            }
            Instr::Blt { reg0, reg1, line } => {
                if self.register(*reg0) < self.register(*reg1) {
                    return self.branch_target(*line).map(Some);
                }
            }
            Instr::Bge { reg0, reg1, line } => {
                if self.register(*reg0) >= self.register(*reg1) {
                    return self.branch_target(*line).map(Some);
                }
            }
            Instr::Add { out, in0, in1 } => {
                let value = self.register(*in0).wrapping_add(self.register(*in1));
                self.set_register(*out, value);
            }
            Instr::Sub { out, in0, in1 } => {
                let value = self.register(*in0).wrapping_sub(self.register(*in1));
                self.set_register(*out, value);
            }
            Instr::Addm { out, in0, in1, modulus } => {
                let value = self.modular(*in0, *in1, *modulus, i64::checked_add)?;
                self.set_register(*out, value);
            }
            Instr::Subm { out, in0, in1, modulus } => {
                let value = self.modular(*in0, *in1, *modulus, i64::checked_sub)?;
                self.set_register(*out, value);
            }
            Instr::X { reg }
            | Instr::Y { reg }
            | Instr::Z { reg }
            | Instr::H { reg }
            | Instr::S { reg }
            | Instr::K { reg }
            | Instr::T { reg } => {
                let opcode = instr.opcode();
                let virt_id = self.register(*reg);
                self.dispatch(|p| p.single_gate(opcode, virt_id))?;
            }
            Instr::RotX { reg, angle } => self.rotate(RotAxis::X, *reg, *angle)?,
            Instr::RotY { reg, angle } => self.rotate(RotAxis::Y, *reg, *angle)?,
            Instr::RotZ { reg, angle } => self.rotate(RotAxis::Z, *reg, *angle)?,
            Instr::Cnot { reg0, reg1 } | Instr::Cphase { reg0, reg1 } => {
                let opcode = instr.opcode();
                let control = self.register(*reg0);
                let target = self.register(*reg1);
                self.dispatch(|p| p.two_qubit_gate(opcode, control, target))?;
            }
            Instr::Mov { reg0, reg1 } => {
                let source = self.register(*reg0);
                let target = self.register(*reg1);
                self.dispatch(|p| p.mov(source, target))?;
            }
            Instr::CrotX { reg0, reg1, angle } => {
                let control = self.register(*reg0);
                let target = self.register(*reg1);
                let angle = *angle;
                self.dispatch(|p| p.controlled_rotation(RotAxis::X, control, target, angle))?;
            }
            Instr::CrotY { reg0, reg1, angle } => {
                let control = self.register(*reg0);
                let target = self.register(*reg1);
                let angle = *angle;
                self.dispatch(|p| p.controlled_rotation(RotAxis::Y, control, target, angle))?;
            }
            Instr::Meas { qreg, creg } => {
                let virt_id = self.register(*qreg);
                let outcome = self.dispatch(|p| p.measure(virt_id))?;
                self.set_register(*creg, outcome);
            }
            Instr::CreateEpr { remote_node, epr_socket, qubit_addrs, args, results } => {
                let remote_node = self.register(*remote_node);
                let epr_socket = self.register(*epr_socket);
                let qubit_ids = self.filled_array(Address(self.register(*qubit_addrs)))?;
                let request_args: Vec<i32> = self
                    .array_or_error(Address(self.register(*args)))?
                    .iter()
                    .map(|slot| slot.unwrap_or(0))
                    .collect();
                let words = self.dispatch(|p| {
                    p.create_epr(remote_node, epr_socket, &qubit_ids, &request_args)
                })?;
                self.write_results(Address(self.register(*results)), &words)?;
            }
            Instr::RecvEpr { remote_node, epr_socket, qubit_addrs, results } => {
                let remote_node = self.register(*remote_node);
                let epr_socket = self.register(*epr_socket);
                let qubit_ids = self.filled_array(Address(self.register(*qubit_addrs)))?;
                let words =
                    self.dispatch(|p| p.recv_epr(remote_node, epr_socket, &qubit_ids))?;
                self.write_results(Address(self.register(*results)), &words)?;
            }
            Instr::WaitAll { slice } => {
                self.wait(*slice, |slots| slots.iter().all(Option::is_some))?;
            }
            Instr::WaitAny { slice } => {
                self.wait(*slice, |slots| slots.iter().any(Option::is_some))?;
            }
            Instr::WaitSingle { entry } => {
                let (address, index) = self.resolve_entry(*entry)?;
                self.wait_single(address, index)?;
            }
            Instr::SendMsg { socket, address } => {
                let socket = self.register(*socket);
                let payload = self.filled_array(*address)?;
                self.dispatch(|p| p.send_msg(socket, &payload))?;
            }
            Instr::RecvMsg { socket, address } => {
                let socket = self.register(*socket);
                let words = self.dispatch(|p| p.recv_msg(socket))?;
                self.write_results(*address, &words)?;
            }
            Instr::QFree { reg } => {
                let virt_id = self.register(*reg);
                self.dispatch(|p| p.qfree(virt_id))?;
            }
            Instr::RetReg { reg } => {
                output.registers.insert(*reg, self.register(*reg));
            }
            Instr::RetArr { address } => {
                let array = self.array_or_error(*address)?.to_vec();
                output.arrays.insert(*address, array);
            }
            Instr::Breakpoint { action, role } => {
                let (action, role) = (*action, *role);
                self.dispatch(|p| p.breakpoint(action, role))?;
            }
        }
        Ok(None)
    }

    fn rotate(&mut self, axis: RotAxis, reg: Register, angle: crate::isa::angle::Angle)
        -> Result<(), NetQasmError>
    {
        let virt_id = self.register(reg);
        self.dispatch(|p| p.rotation(axis, virt_id, angle))
    }

    fn modular(
        &self,
        in0: Register,
        in1: Register,
        modulus: Register,
        op: fn(i64, i64) -> Option<i64>,
    ) -> Result<i32, NetQasmError> {
        let modulus = self.register(modulus) as i64;
        if modulus <= 0 {
            return Err(self.execution_error(format!(
                "modular arithmetic with non-positive modulus {modulus}",
            )));
        }
        let raw = op(self.register(in0) as i64, self.register(in1) as i64)
            .ok_or_else(|| self.execution_error("modular arithmetic overflow".to_string()))?;
        Ok(raw.rem_euclid(modulus) as i32)
    }

    fn dispatch<T>(
        &mut self,
        call: impl FnOnce(&mut P) -> Result<T, ProcessorError>,
    ) -> Result<T, NetQasmError> {
        let pc = self.pc;
        call(&mut self.processor).map_err(|err| match err {
            ProcessorError::Failed { message } => {
                NetQasmError::Execution { pc, host_line: None, message }
            }
            ProcessorError::Aborted { message } => NetQasmError::Aborted { pc, message },
        })
    }

    fn branch_target(&self, line: i32) -> Result<usize, NetQasmError> {
        usize::try_from(line).map_err(|_| {
            self.execution_error(format!("branch to negative instruction index {line}"))
        })
    }

    fn execution_error(&self, message: String) -> NetQasmError {
        NetQasmError::Execution { pc: self.pc, host_line: None, message }
    }

    fn address_error(&self, message: String) -> NetQasmError {
        NetQasmError::Address { pc: self.pc, message }
    }

    /// Adds the host source line of the faulting instruction, when the
    /// subroutine carries debug information for it.
    fn attach_location(&self, err: NetQasmError, subroutine: &Subroutine) -> NetQasmError {
        match err {
            NetQasmError::Execution { pc, host_line: None, message } => NetQasmError::Execution {
                pc,
                host_line: subroutine.debug_lines.get(&pc).copied(),
                message,
            },
            other => other,
        }
    }

    fn array_or_error(&self, address: Address) -> Result<&[Option<i32>], NetQasmError> {
        self.arrays
            .get(&address)
            .map(Vec::as_slice)
            .ok_or_else(|| self.address_error(format!("no array declared at {address}")))
    }

    /// Resolves an entry to a bounds-checked (address, index) pair.
    fn resolve_entry(&self, entry: ArrayEntry) -> Result<(Address, usize), NetQasmError> {
        let array = self.array_or_error(entry.address)?;
        let raw = self.register(entry.index);
        let index = usize::try_from(raw)
            .ok()
            .filter(|&i| i < array.len())
            .ok_or_else(|| {
                self.address_error(format!(
                    "index {raw} is out of bounds for the {}-slot array at {}",
                    array.len(),
                    entry.address,
                ))
            })?;
        Ok((entry.address, index))
    }

    /// Resolves a slice to a bounds-checked half-open index range.
    fn resolve_slice(&self, slice: ArraySlice) -> Result<(Address, usize, usize), NetQasmError> {
        let array = self.array_or_error(slice.address)?;
        let start = self.register(slice.start);
        let stop = self.register(slice.stop);
        let valid = (|| {
            let start = usize::try_from(start).ok()?;
            let stop = usize::try_from(stop).ok()?;
            (start <= stop && stop <= array.len()).then_some((start, stop))
        })();
        let (start, stop) = valid.ok_or_else(|| {
            self.address_error(format!(
                "slice {start}:{stop} is out of bounds for the {}-slot array at {}",
                array.len(),
                slice.address,
            ))
        })?;
        Ok((slice.address, start, stop))
    }

    /// Reads an array whose every slot must already hold a value.
    fn filled_array(&self, address: Address) -> Result<Vec<i32>, NetQasmError> {
        let array = self.array_or_error(address)?;
        array
            .iter()
            .map(|slot| {
                slot.ok_or_else(|| NetQasmError::NotYetAvailable {
                    message: format!("array at {address} has unfilled slots"),
                })
            })
            .collect()
    }

    /// Writes result words into the array at `address`, starting at slot 0.
    fn write_results(&mut self, address: Address, words: &[i32]) -> Result<(), NetQasmError> {
        let len = self.array_or_error(address)?.len();
        if words.len() > len {
            return Err(self.address_error(format!(
                "{} result words do not fit the {len}-slot array at {address}",
                words.len(),
            )));
        }
        if let Some(array) = self.arrays.get_mut(&address) {
            for (slot, word) in array.iter_mut().zip(words) {
                *slot = Some(*word);
            }
        }
        Ok(())
    }

    /// Blocks on a slice condition, giving the processor one chance to
    /// deliver pending results before declaring the wait stuck.
    fn wait(
        &mut self,
        slice: ArraySlice,
        done: impl Fn(&[Option<i32>]) -> bool,
    ) -> Result<(), NetQasmError> {
        let (address, start, stop) = self.resolve_slice(slice)?;
        if start == stop {
            return Ok(());
        }
        if done(&self.array_or_error(address)?[start..stop]) {
            return Ok(());
        }
        self.dispatch(Processor::wait_for)?;
        if done(&self.array_or_error(address)?[start..stop]) {
            Ok(())
        } else {
            Err(self.execution_error(format!(
                "wait on {address}[{start}:{stop}] cannot complete",
            )))
        }
    }

    fn wait_single(&mut self, address: Address, index: usize) -> Result<(), NetQasmError> {
        if self.array_or_error(address)?[index].is_some() {
            return Ok(());
        }
        self.dispatch(Processor::wait_for)?;
        if self.array_or_error(address)?[index].is_some() {
            Ok(())
        } else {
            Err(self.execution_error(format!(
                "wait on {address}[{index}] cannot complete",
            )))
        }
    }
}
