// src/lang/mod.rs

//! The human-readable assembly form.

pub mod text;

pub use text::parse;
