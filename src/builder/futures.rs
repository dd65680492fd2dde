// src/builder/futures.rs

//! Host-side handles for values a subroutine will produce.
//!
//! A future is created while building, bound to its physical location when
//! the subroutine is flushed, and resolved when the host commits the
//! execution output. Reading it earlier fails with
//! [`NetQasmError::NotYetAvailable`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::NetQasmError;
use crate::executor::Output;
use crate::isa::operand::{Address, Register};

#[derive(Debug, Default)]
pub(super) struct RegFutureState {
    pub(super) register: Option<Register>,
    pub(super) value: Option<i32>,
}

/// A future register value, typically a measurement outcome.
#[derive(Debug, Clone)]
pub struct RegFuture {
    state: Rc<RefCell<RegFutureState>>,
}

impl RegFuture {
    pub(super) fn new() -> (RegFuture, Rc<RefCell<RegFutureState>>) {
        let state = Rc::new(RefCell::new(RegFutureState::default()));
        (RegFuture { state: Rc::clone(&state) }, state)
    }

    pub(super) fn shares_state_with(&self, other: &RegFuture) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// The physical register holding the value, known after flush.
    pub fn register(&self) -> Option<Register> {
        self.state.borrow().register
    }

    /// The value, once the output of the run has been committed.
    pub fn value(&self) -> Result<i32, NetQasmError> {
        self.state.borrow().value.ok_or_else(|| NetQasmError::NotYetAvailable {
            message: "register future has not been resolved yet".to_string(),
        })
    }

    pub(super) fn resolve_from(&self, output: &Output) {
        let mut state = self.state.borrow_mut();
        if let Some(register) = state.register {
            if let Some(value) = output.registers.get(&register) {
                state.value = Some(*value);
            }
        }
    }
}

/// A future array, resolved from a `ret_arr` in the execution output.
#[derive(Debug, Clone)]
pub struct ArrayFuture {
    address: Address,
    values: Rc<RefCell<Option<Vec<Option<i32>>>>>,
}

impl ArrayFuture {
    pub(super) fn new(address: Address) -> ArrayFuture {
        ArrayFuture { address, values: Rc::new(RefCell::new(None)) }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// The array contents, once the output of the run has been committed.
    pub fn values(&self) -> Result<Vec<Option<i32>>, NetQasmError> {
        self.values.borrow().clone().ok_or_else(|| NetQasmError::NotYetAvailable {
            message: format!("array future at {} has not been resolved yet", self.address),
        })
    }

    pub(super) fn resolve_from(&self, output: &Output) {
        if let Some(values) = output.arrays.get(&self.address) {
            *self.values.borrow_mut() = Some(values.clone());
        }
    }
}
