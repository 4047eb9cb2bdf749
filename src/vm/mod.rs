//! Virtual machine module
//!
//! The VM walks the syntax tree directly. [`Interpreter`] evaluates
//! statements and expressions; the object model operations it relies on
//! (property access, conversions, operators) live in `ops`.

mod interpreter;
mod ops;
mod stack;

pub use interpreter::{Completion, Interpreter};
pub use ops::Hint;
pub use stack::{CallFrame, CallStack};
