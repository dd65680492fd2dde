// src/builder/mod.rs

//! The host-side subroutine builder.
//!
//! [`Builder`] records quantum and classical operations against virtual
//! registers and structured control-flow scopes, then flushes them into a
//! ready-to-run [`Subroutine`]: control flow is flattened to branches and
//! labels, virtual registers are mapped onto the physical banks, and when
//! the target flavour is NV the universal gates are transpiled away.
//!
//! Measurement outcomes come back as [`RegFuture`]s and returned arrays as
//! [`ArrayFuture`]s; both resolve once the host commits the [`Output`] of a
//! run back into the builder.

mod alloc;
mod futures;
pub mod transpile;

pub use futures::{ArrayFuture, RegFuture};

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::{AppId, NetQasmError};
use crate::executor::Output;
use crate::flavour::{Flavour, FlavourKind};
use crate::isa::angle::Angle;
use crate::isa::instr::Opcode;
use crate::isa::operand::{Address, ArrayEntry, ArraySlice, Operand, Register, RegisterName};
use crate::subroutine::{Cmd, Item, PreSubroutine, Subroutine};

use futures::RegFutureState;

/// A register that has not been assigned a physical index yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct VirtReg {
    pub(crate) bank: RegisterName,
    pub(crate) id: u32,
}

/// An operand over virtual registers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VOperand {
    Virt(VirtReg),
    Imm(i32),
    Addr(Address),
    Entry { address: Address, index: VirtReg },
    Slice { address: Address, start: VirtReg, stop: VirtReg },
    Label(String),
}

impl VOperand {
    /// The virtual registers this operand mentions.
    pub(crate) fn virt_regs(&self) -> Vec<VirtReg> {
        match self {
            VOperand::Virt(virt) => vec![*virt],
            VOperand::Entry { index, .. } => vec![*index],
            VOperand::Slice { start, stop, .. } => vec![*start, *stop],
            VOperand::Imm(_) | VOperand::Addr(_) | VOperand::Label(_) => vec![],
        }
    }
}

/// One item of the builder's virtual command stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VItem {
    Cmd {
        opcode: Opcode,
        operands: Vec<VOperand>,
        lineno: Option<crate::core::HostLine>,
    },
    Label(String),
}

/// A handle to one allocated qubit.
#[derive(Debug, Clone, Copy)]
pub struct Qubit {
    reg: VirtReg,
    virt_id: i32,
}

impl Qubit {
    /// The virtual qubit id passed to the processor.
    pub fn virt_id(&self) -> i32 {
        self.virt_id
    }
}

/// A handle to one declared array.
#[derive(Debug, Clone, Copy)]
pub struct ArrayHandle {
    address: Address,
    len: i32,
}

impl ArrayHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn len(&self) -> i32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An open control-flow construct.
#[derive(Debug)]
enum Scope {
    If {
        /// Where the inverted condition branch jumps: the else block if one
        /// is opened, the end of the construct otherwise.
        skip_label: String,
        /// Set once `begin_else` ran; the label closing the whole if.
        end_label: Option<String>,
    },
    Loop {
        entry_label: String,
        exit_label: String,
        counter: VirtReg,
    },
}

/// Builds subroutines from structured host code.
pub struct Builder {
    app_id: AppId,
    flavour: Flavour,
    items: Vec<VItem>,
    scopes: Vec<Scope>,
    next_virt: u32,
    next_label: u32,
    next_qubit_id: i32,
    next_address: i32,
    reg_futures: Vec<(VirtReg, Rc<RefCell<RegFutureState>>, RegFuture)>,
    array_futures: Vec<ArrayFuture>,
}

impl Builder {
    pub fn new(app_id: AppId, flavour: Flavour) -> Builder {
        Builder {
            app_id,
            flavour,
            items: Vec::new(),
            scopes: Vec::new(),
            next_virt: 0,
            next_label: 0,
            next_qubit_id: 0,
            next_address: 0,
            reg_futures: Vec::new(),
            array_futures: Vec::new(),
        }
    }

    fn fresh_virt(&mut self, bank: RegisterName) -> VirtReg {
        let virt = VirtReg { bank, id: self.next_virt };
        self.next_virt += 1;
        virt
    }

    fn fresh_label(&mut self, stem: &str) -> String {
        let label = format!("{stem}{}", self.next_label);
        self.next_label += 1;
        label
    }

    fn push(&mut self, opcode: Opcode, operands: Vec<VOperand>) {
        self.items.push(VItem::Cmd { opcode, operands, lineno: None });
    }

    // --- Qubits and gates ---

    /// Allocates and initializes a fresh qubit.
    pub fn alloc_qubit(&mut self) -> Qubit {
        let virt_id = self.next_qubit_id;
        self.next_qubit_id += 1;
        let reg = self.fresh_virt(RegisterName::Q);
        self.push(Opcode::Set, vec![VOperand::Virt(reg), VOperand::Imm(virt_id)]);
        self.push(Opcode::QAlloc, vec![VOperand::Virt(reg)]);
        self.push(Opcode::Init, vec![VOperand::Virt(reg)]);
        Qubit { reg, virt_id }
    }

    /// Frees a qubit.
    pub fn free_qubit(&mut self, qubit: &Qubit) {
        self.push(Opcode::QFree, vec![VOperand::Virt(qubit.reg)]);
    }

    fn single_gate(&mut self, opcode: Opcode, qubit: &Qubit) {
        self.push(opcode, vec![VOperand::Virt(qubit.reg)]);
    }

    pub fn x(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::X, qubit);
    }

    pub fn y(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::Y, qubit);
    }

    pub fn z(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::Z, qubit);
    }

    pub fn h(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::H, qubit);
    }

    pub fn s(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::S, qubit);
    }

    pub fn k(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::K, qubit);
    }

    pub fn t(&mut self, qubit: &Qubit) {
        self.single_gate(Opcode::T, qubit);
    }

    fn rotation(&mut self, opcode: Opcode, qubit: &Qubit, angle: Angle) {
        // Emit the canonical lowest-terms form; the NV transpiler widens to
        // the hardware denominator afterwards.
        let angle = angle.reduce();
        self.push(
            opcode,
            vec![
                VOperand::Virt(qubit.reg),
                VOperand::Imm(angle.num() as i32),
                VOperand::Imm(angle.denom() as i32),
            ],
        );
    }

    pub fn rot_x(&mut self, qubit: &Qubit, angle: Angle) {
        self.rotation(Opcode::RotX, qubit, angle);
    }

    pub fn rot_y(&mut self, qubit: &Qubit, angle: Angle) {
        self.rotation(Opcode::RotY, qubit, angle);
    }

    pub fn rot_z(&mut self, qubit: &Qubit, angle: Angle) {
        self.rotation(Opcode::RotZ, qubit, angle);
    }

    pub fn cnot(&mut self, control: &Qubit, target: &Qubit) {
        self.push(
            Opcode::Cnot,
            vec![VOperand::Virt(control.reg), VOperand::Virt(target.reg)],
        );
    }

    pub fn cphase(&mut self, control: &Qubit, target: &Qubit) {
        self.push(
            Opcode::Cphase,
            vec![VOperand::Virt(control.reg), VOperand::Virt(target.reg)],
        );
    }

    /// Measures a qubit and returns its outcome to the host.
    pub fn measure(&mut self, qubit: &Qubit) -> RegFuture {
        let outcome = self.fresh_virt(RegisterName::M);
        self.push(
            Opcode::Meas,
            vec![VOperand::Virt(qubit.reg), VOperand::Virt(outcome)],
        );
        self.push(Opcode::RetReg, vec![VOperand::Virt(outcome)]);
        let (future, state) = RegFuture::new();
        self.reg_futures.push((outcome, state, future.clone()));
        future
    }

    // --- Arrays ---

    /// Declares a fresh array of `len` slots.
    pub fn alloc_array(&mut self, len: i32) -> ArrayHandle {
        let address = Address(self.next_address);
        self.next_address += 1;
        self.push(Opcode::Array, vec![VOperand::Imm(len), VOperand::Addr(address)]);
        ArrayHandle { address, len }
    }

    /// Returns an array to the host at the end of the run.
    pub fn return_array(&mut self, array: &ArrayHandle) -> ArrayFuture {
        self.push(Opcode::RetArr, vec![VOperand::Addr(array.address)]);
        let future = ArrayFuture::new(array.address);
        self.array_futures.push(future.clone());
        future
    }

    // --- Control flow ---

    /// Opens a conditional that runs while the measured outcome is zero.
    pub fn begin_if_zero(&mut self, outcome: &RegFuture) -> Result<(), NetQasmError> {
        let reg = self.future_reg(outcome)?;
        // Inverted branch: skip the body when the condition fails.
        self.begin_if(Opcode::Bnz, vec![VOperand::Virt(reg)]);
        Ok(())
    }

    /// Opens a conditional that runs while the measured outcome is nonzero.
    pub fn begin_if_nonzero(&mut self, outcome: &RegFuture) -> Result<(), NetQasmError> {
        let reg = self.future_reg(outcome)?;
        self.begin_if(Opcode::Bez, vec![VOperand::Virt(reg)]);
        Ok(())
    }

    /// Opens a conditional that runs when the outcome equals `value`.
    pub fn begin_if_eq(&mut self, outcome: &RegFuture, value: i32) -> Result<(), NetQasmError> {
        let reg = self.future_reg(outcome)?;
        self.begin_if(Opcode::Bne, vec![VOperand::Virt(reg), VOperand::Imm(value)]);
        Ok(())
    }

    fn begin_if(&mut self, inverted_branch: Opcode, mut operands: Vec<VOperand>) {
        let skip_label = self.fresh_label("IF_SKIP");
        operands.push(VOperand::Label(skip_label.clone()));
        self.push(inverted_branch, operands);
        self.scopes.push(Scope::If { skip_label, end_label: None });
    }

    /// Opens the else block of the innermost conditional.
    pub fn begin_else(&mut self) -> Result<(), NetQasmError> {
        let end_label = self.fresh_label("IF_END");
        match self.scopes.last_mut() {
            Some(Scope::If { skip_label, end_label: slot @ None }) => {
                let skip_label = skip_label.clone();
                *slot = Some(end_label.clone());
                self.push(Opcode::Jmp, vec![VOperand::Label(end_label)]);
                self.items.push(VItem::Label(skip_label));
                Ok(())
            }
            Some(Scope::If { .. }) => Err(NetQasmError::Compile {
                message: "conditional already has an else block".to_string(),
            }),
            _ => Err(NetQasmError::Compile {
                message: "no open conditional to attach an else block to".to_string(),
            }),
        }
    }

    /// Closes the innermost conditional.
    pub fn end_if(&mut self) -> Result<(), NetQasmError> {
        match self.scopes.pop() {
            Some(Scope::If { skip_label, end_label }) => {
                self.items.push(VItem::Label(end_label.unwrap_or(skip_label)));
                Ok(())
            }
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(NetQasmError::Compile {
                    message: "no open conditional to close".to_string(),
                })
            }
        }
    }

    /// Opens a loop running `times` iterations.
    pub fn begin_loop(&mut self, times: i32) -> Result<(), NetQasmError> {
        if times < 0 {
            return Err(NetQasmError::Compile {
                message: format!("loop cannot run {times} times"),
            });
        }
        let entry_label = self.fresh_label("LOOP");
        let exit_label = self.fresh_label("LOOP_EXIT");
        let counter = self.fresh_virt(RegisterName::R);
        self.push(Opcode::Set, vec![VOperand::Virt(counter), VOperand::Imm(0)]);
        self.items.push(VItem::Label(entry_label.clone()));
        self.push(
            Opcode::Beq,
            vec![
                VOperand::Virt(counter),
                VOperand::Imm(times),
                VOperand::Label(exit_label.clone()),
            ],
        );
        self.scopes.push(Scope::Loop { entry_label, exit_label, counter });
        Ok(())
    }

    /// Closes the innermost loop.
    pub fn end_loop(&mut self) -> Result<(), NetQasmError> {
        match self.scopes.pop() {
            Some(Scope::Loop { entry_label, exit_label, counter }) => {
                self.push(
                    Opcode::Add,
                    vec![
                        VOperand::Virt(counter),
                        VOperand::Virt(counter),
                        VOperand::Imm(1),
                    ],
                );
                self.push(Opcode::Jmp, vec![VOperand::Label(entry_label)]);
                self.items.push(VItem::Label(exit_label));
                Ok(())
            }
            other => {
                if let Some(scope) = other {
                    self.scopes.push(scope);
                }
                Err(NetQasmError::Compile { message: "no open loop to close".to_string() })
            }
        }
    }

    /// Runs `body` under an `if zero` conditional.
    pub fn with_if_zero(
        &mut self,
        outcome: &RegFuture,
        body: impl FnOnce(&mut Builder) -> Result<(), NetQasmError>,
    ) -> Result<(), NetQasmError> {
        self.begin_if_zero(outcome)?;
        body(self)?;
        self.end_if()
    }

    /// Runs `body` under an `if nonzero` conditional.
    pub fn with_if_nonzero(
        &mut self,
        outcome: &RegFuture,
        body: impl FnOnce(&mut Builder) -> Result<(), NetQasmError>,
    ) -> Result<(), NetQasmError> {
        self.begin_if_nonzero(outcome)?;
        body(self)?;
        self.end_if()
    }

    /// Runs `body` in a loop of `times` iterations.
    pub fn with_loop(
        &mut self,
        times: i32,
        body: impl FnOnce(&mut Builder) -> Result<(), NetQasmError>,
    ) -> Result<(), NetQasmError> {
        self.begin_loop(times)?;
        body(self)?;
        self.end_loop()
    }

    fn future_reg(&self, outcome: &RegFuture) -> Result<VirtReg, NetQasmError> {
        self.reg_futures
            .iter()
            .find(|(_, _, future)| future.shares_state_with(outcome))
            .map(|(virt, _, _)| *virt)
            .ok_or_else(|| NetQasmError::Compile {
                message: "the outcome future belongs to a different builder".to_string(),
            })
    }

    // --- Flushing ---

    /// Flattens everything recorded so far into a runnable subroutine.
    ///
    /// Consumes the recorded stream; futures handed out earlier stay bound
    /// to the flushed subroutine and resolve on [`Builder::commit`].
    pub fn flush(&mut self) -> Result<Subroutine, NetQasmError> {
        if !self.scopes.is_empty() {
            return Err(NetQasmError::Compile {
                message: format!("{} control-flow scopes left open", self.scopes.len()),
            });
        }
        let items = std::mem::take(&mut self.items);
        let assignment = alloc::assign_registers(&items)?;
        let physical = |virt: &VirtReg| -> Result<Register, NetQasmError> {
            assignment.get(virt).copied().ok_or_else(|| NetQasmError::Layout {
                message: "virtual register missing from the assignment".to_string(),
            })
        };

        let mut pre = PreSubroutine::new(self.app_id);
        for item in &items {
            match item {
                VItem::Label(name) => pre.push_label(name.clone()),
                VItem::Cmd { opcode, operands, lineno } => {
                    let mut lowered = Vec::with_capacity(operands.len());
                    for operand in operands {
                        lowered.push(match operand {
                            VOperand::Virt(virt) => Operand::Register(physical(virt)?),
                            VOperand::Imm(value) => Operand::Immediate(*value),
                            VOperand::Addr(address) => Operand::Address(*address),
                            VOperand::Entry { address, index } => {
                                Operand::ArrayEntry(ArrayEntry {
                                    address: *address,
                                    index: physical(index)?,
                                })
                            }
                            VOperand::Slice { address, start, stop } => {
                                Operand::ArraySlice(ArraySlice {
                                    address: *address,
                                    start: physical(start)?,
                                    stop: physical(stop)?,
                                })
                            }
                            VOperand::Label(name) => Operand::Label(name.clone()),
                        });
                    }
                    pre.items.push(Item::Cmd(Cmd {
                        opcode: *opcode,
                        operands: lowered,
                        lineno: *lineno,
                    }));
                }
            }
        }

        let subroutine = pre.finalize(&Flavour::vanilla())?;
        let subroutine = match self.flavour.kind() {
            FlavourKind::Vanilla => subroutine,
            FlavourKind::Nv => transpile::to_nv(&subroutine)?,
        };

        // Bind register futures to their physical registers.
        for (virt, state, _) in &self.reg_futures {
            state.borrow_mut().register = Some(physical(virt)?);
        }
        Ok(subroutine)
    }

    /// Resolves all outstanding futures from the output of a run.
    pub fn commit(&mut self, output: &Output) {
        for (_, _, future) in &self.reg_futures {
            future.resolve_from(output);
        }
        for future in &self.array_futures {
            future.resolve_from(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::instr::Instr;

    #[test]
    fn if_lowering_inverts_the_branch() -> Result<(), NetQasmError> {
        let mut builder = Builder::new(AppId(0), Flavour::vanilla());
        let qubit = builder.alloc_qubit();
        let outcome = builder.measure(&qubit);
        builder.with_if_zero(&outcome, |b| {
            b.x(&qubit);
            Ok(())
        })?;
        builder.free_qubit(&qubit);
        let subroutine = builder.flush()?;
        // set, qalloc, init, meas, ret_reg, bnz, x, qfree
        assert!(matches!(subroutine.instrs[5], Instr::Bnz { line: 7, .. }));
        assert!(matches!(subroutine.instrs[6], Instr::X { .. }));
        Ok(())
    }

    #[test]
    fn else_block_gets_exactly_one_path() -> Result<(), NetQasmError> {
        let mut builder = Builder::new(AppId(0), Flavour::vanilla());
        let qubit = builder.alloc_qubit();
        let outcome = builder.measure(&qubit);
        builder.begin_if_nonzero(&outcome)?;
        builder.x(&qubit);
        builder.begin_else()?;
        builder.z(&qubit);
        builder.end_if()?;
        let subroutine = builder.flush()?;
        // set, qalloc, init, meas, ret_reg, bez->7, x, jmp->8, z
        assert!(matches!(subroutine.instrs[5], Instr::Bez { line: 8, .. }));
        assert!(matches!(subroutine.instrs[6], Instr::X { .. }));
        assert!(matches!(subroutine.instrs[7], Instr::Jmp { line: 9 }));
        assert!(matches!(subroutine.instrs[8], Instr::Z { .. }));
        Ok(())
    }

    #[test]
    fn unbalanced_scopes_are_rejected() {
        let mut builder = Builder::new(AppId(0), Flavour::vanilla());
        builder.begin_loop(3).unwrap();
        assert!(matches!(builder.flush(), Err(NetQasmError::Compile { .. })));
        assert!(builder.end_if().is_err());
    }

    #[test]
    fn loop_lowering_counts_iterations() -> Result<(), NetQasmError> {
        let mut builder = Builder::new(AppId(0), Flavour::vanilla());
        let qubit = builder.alloc_qubit();
        builder.with_loop(3, |b| {
            b.x(&qubit);
            Ok(())
        })?;
        let subroutine = builder.flush()?;
        let body_count = subroutine
            .instrs
            .iter()
            .filter(|instr| matches!(instr, Instr::X { .. }))
            .count();
        assert_eq!(body_count, 1);
        let has_beq = subroutine.instrs.iter().any(|i| matches!(i, Instr::Beq { .. }));
        let has_add = subroutine.instrs.iter().any(|i| matches!(i, Instr::Add { .. }));
        assert!(has_beq && has_add);
        Ok(())
    }

    #[test]
    fn futures_resolve_only_after_commit() -> Result<(), NetQasmError> {
        let mut builder = Builder::new(AppId(0), Flavour::vanilla());
        let qubit = builder.alloc_qubit();
        let outcome = builder.measure(&qubit);
        let subroutine = builder.flush()?;
        assert!(outcome.value().is_err());
        let register = outcome.register().expect("bound at flush");

        let mut output = Output::default();
        output.registers.insert(register, 1);
        builder.commit(&output);
        assert_eq!(outcome.value()?, 1);
        drop(subroutine);
        Ok(())
    }

    #[test]
    fn nv_builder_emits_only_nv_instructions() -> Result<(), NetQasmError> {
        let nv = Flavour::nv();
        let mut builder = Builder::new(AppId(0), Flavour::nv());
        let qubit = builder.alloc_qubit();
        builder.h(&qubit);
        builder.t(&qubit);
        let _ = builder.measure(&qubit);
        let subroutine = builder.flush()?;
        for instr in &subroutine.instrs {
            assert!(nv.supports(instr.opcode()), "`{instr}` is not an NV instruction");
        }
        Ok(())
    }
}
