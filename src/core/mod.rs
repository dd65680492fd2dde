// src/core/mod.rs

//! Core data structures and types shared across the crate.

// Declare modules within core
pub mod error;

// Re-export public types for convenient access via `netqasm::core::TypeName`
pub use error::NetQasmError;

use std::fmt;

/// Protocol version implemented by this crate, as `(major, minor)`.
///
/// Written into the metadata header of every binary subroutine and into the
/// `# NETQASM` preamble line of the text form.
pub const NETQASM_VERSION: (u8, u8) = (0, 0);

/// Identifier of the application owning a subroutine.
///
/// Assigned by the runtime when an application registers; every subroutine the
/// application issues carries it so the executing node can route results back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(pub u16);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app({})", self.0)
    }
}

/// A source position in the host program that produced an instruction.
///
/// Carried in the debug map of a [`Subroutine`](crate::subroutine::Subroutine)
/// and surfaced in execution errors. Purely diagnostic; never affects
/// execution semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostLine(pub u32);

impl fmt::Display for HostLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.0)
    }
}
