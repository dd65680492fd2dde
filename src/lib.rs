// src/lib.rs

//! `netqasm` - assembling, encoding and executing quantum network programs
//!
//! This library implements the NetQASM instruction set for quantum internet
//! applications: a typed instruction set with a fixed-layout binary encoding
//! and a human-readable text form, a host-side [`Builder`] that flattens
//! structured programs into subroutines, and an [`Executor`] that interprets
//! subroutines against any backend implementing the [`Processor`] trait. A
//! state-vector [`SimProcessor`] is included for local runs.
//!
//! # Building and running a subroutine
//!
//! ```
//! use netqasm::{AppId, Builder, Executor, Flavour, SimProcessor};
//!
//! # fn main() -> Result<(), netqasm::NetQasmError> {
//! let mut builder = Builder::new(AppId(0), Flavour::vanilla());
//!
//! // Prepare a Bell pair and measure both halves.
//! let q0 = builder.alloc_qubit();
//! let q1 = builder.alloc_qubit();
//! builder.h(&q0);
//! builder.cnot(&q0, &q1);
//! let m0 = builder.measure(&q0);
//! let m1 = builder.measure(&q1);
//! builder.free_qubit(&q0);
//! builder.free_qubit(&q1);
//!
//! let subroutine = builder.flush()?;
//! let mut executor = Executor::new(SimProcessor::new(42));
//! let output = executor.run(&subroutine)?;
//! builder.commit(&output);
//!
//! // The halves of a Bell pair always agree.
//! assert_eq!(m0.value()?, m1.value()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Parsing the text form
//!
//! ```
//! use netqasm::{lang, Executor, Flavour, SimProcessor};
//!
//! # fn main() -> Result<(), netqasm::NetQasmError> {
//! let source = r#"
//! ## NETQASM 0.0
//! ## APPID 0
//! set Q0 0
//! qalloc Q0
//! init Q0
//! x Q0
//! meas Q0 M0
//! ret_reg M0
//! qfree Q0
//! "#;
//!
//! let subroutine = lang::parse(source)?.finalize(&Flavour::vanilla())?;
//! let output = Executor::new(SimProcessor::new(1)).run(&subroutine)?;
//! assert_eq!(output.register("M0"), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! Subroutines round-trip through the binary wire format with
//! [`Subroutine::to_bytes`] and [`Subroutine::from_bytes`]; decoding takes
//! the target [`Flavour`] because the NV flavour reuses opcode ids the
//! vanilla flavour assigns to other gates.

pub mod builder;
pub mod core;
pub mod executor;
pub mod flavour;
pub mod isa;
pub mod lang;
pub mod subroutine;
pub mod validation;

// Re-export the most common types for easier top-level use
pub use crate::core::{AppId, HostLine, NetQasmError, NETQASM_VERSION};
pub use builder::{ArrayFuture, Builder, Qubit, RegFuture};
pub use executor::{Executor, Output, Processor, ProcessorError, SimProcessor};
pub use flavour::{Flavour, FlavourKind};
pub use isa::{Address, Angle, Instr, Opcode, Operand, Register, RegisterName};
pub use subroutine::{PreSubroutine, Subroutine};
