//! JavaScript parser
//!
//! Single-pass parser that builds a syntax tree for the tree-walking
//! interpreter.

pub mod ast;
pub mod compiler;
pub mod lexer;

// Re-exports
pub use compiler::{CompileError, Compiler, parse};
pub use lexer::{Lexer, SourcePos, Token};
