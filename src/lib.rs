//! `runevm` — an embeddable tree-walking interpreter for the Rune scripting
//! language.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the spanned AST (`ast`)
//! - runtime: `interpreter` evaluates the AST against a chained environment
//!   pre-seeded with the `builtins` catalog
//! - embedding: [`RuneVm`] runs sources, defines host bindings, and extracts
//!   typed values and callable functions
//!
//! ```no_run
//! use runevm::RuneVm;
//!
//! let mut vm = RuneVm::new();
//! vm.define("who", "world");
//! vm.run(r#"println("hello ", who)"#, "hello.rune").unwrap();
//! ```

pub mod ast;
pub(crate) mod builtins;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod token;

pub use error::VmError;
pub use interpreter::{Env, OutputSink, RuneVm, RuntimeError, Value};
