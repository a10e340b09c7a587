//! VSL code generation library.
//!
//! This crate turns a type-resolved VSL syntax tree plus its symbol and
//! string tables into a textual x86-64 assembly listing for the System V
//! AMD64 ABI. The listing links against the C standard library, which
//! provides `printf`, `puts`, `strtol` and `exit` for the generated code.
//!
//! The main entry point is [`Context`], which validates the target and
//! drives emission of the whole program: read-only data, BSS storage for
//! globals, every VSL function, and the process entry point that converts
//! command-line arguments and dispatches to the program's entry function.

#![deny(missing_docs, trivial_numeric_casts, unused_extern_crates)]
#![warn(unused_import_braces)]

pub use crate::context::Context;
pub use crate::result::{CodegenError, CodegenResult};

pub mod ast;
pub mod isa;
pub mod symbols;

mod asm;
mod context;
mod emit;
mod frame;
mod result;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
