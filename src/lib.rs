//! The lib crate for a Lox bytecode compiler and interpreter.
//!
//! ```rust
//! let mut vm = blox::Vm::with_output(Vec::new());
//! vm.interpret("var greeting = \"hello\"; print greeting + \" world\";").unwrap();
//! assert_eq!(vm.output().as_slice(), b"hello world\n");
//! ```
#![warn(missing_debug_implementations, missing_docs, rust_2018_idioms)]

/// vm is the bits about running code.
pub mod vm;

/// scanner scans!
pub mod scanner;

/// Takes tokens from the scanner and emits bytecode
pub mod compiler;

pub use vm::{LoxError, Vm};
