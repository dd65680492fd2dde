// src/core/error.rs

//! Error taxonomy for compilation, encoding and execution.

use thiserror::Error;

use crate::core::HostLine;

/// All failures this crate can report.
///
/// Compile-time variants ([`Encoding`](NetQasmError::Encoding),
/// [`Layout`](NetQasmError::Layout), [`Compile`](NetQasmError::Compile),
/// [`UnsupportedOperation`](NetQasmError::UnsupportedOperation)) indicate an
/// invalid program and are never retried. Execution-time variants carry the
/// failing program counter and, when known, the host source line from the
/// subroutine's debug map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetQasmError {
    /// Malformed bytes or text encountered while decoding a subroutine.
    #[error("invalid encoding: {message}")]
    Encoding {
        /// What was malformed and where.
        message: String,
    },

    /// Register, array, or label budget/uniqueness violation at compile time.
    #[error("layout error: {message}")]
    Layout {
        /// Which limit or uniqueness rule was violated.
        message: String,
    },

    /// Invalid operation sequence from the host, e.g. use of a freed qubit.
    #[error("compile error: {message}")]
    Compile {
        /// Why the operation stream is invalid.
        message: String,
    },

    /// The active flavour cannot express a requested gate or instruction and
    /// has no decomposition for it.
    #[error("unsupported operation: {message}")]
    UnsupportedOperation {
        /// The gate/instruction and flavour involved.
        message: String,
    },

    /// Runtime fault while interpreting a subroutine.
    #[error("execution error at pc {pc}{}: {message}", fmt_host_line(.host_line))]
    Execution {
        /// Index of the faulting instruction.
        pc: usize,
        /// Originating host line from the debug map, if recorded.
        host_line: Option<HostLine>,
        /// Description of the fault.
        message: String,
    },

    /// Out-of-range register, array, or qubit address access.
    #[error("address error at pc {pc}: {message}")]
    Address {
        /// Index of the faulting instruction.
        pc: usize,
        /// The offending address or index.
        message: String,
    },

    /// An in-flight processor operation was cancelled externally while the
    /// executor was suspended on it. No side effects of the aborted
    /// instruction are committed.
    #[error("aborted while suspended at pc {pc}: {message}")]
    Aborted {
        /// Index of the instruction that was waiting.
        pc: usize,
        /// Reason reported by the external runtime.
        message: String,
    },

    /// A future was read before the subroutine producing it completed.
    #[error("value not yet available: {message}")]
    NotYetAvailable {
        /// Which slot the future refers to.
        message: String,
    },
}

fn fmt_host_line(line: &Option<HostLine>) -> String {
    match line {
        Some(l) => format!(" ({l})"),
        None => String::new(),
    }
}
