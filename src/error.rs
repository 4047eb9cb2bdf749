//! Error types
//!
//! Script failures surface as `None` plus an [`Exception`](crate::Exception)
//! delivered to a TryCatch or the message listeners. The types here cover
//! misuse that the `try_*` entry points report instead of panicking.

use thiserror::Error;

pub use crate::parser::CompileError;

/// Misuse of the embedding API
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("context scope is already entered")]
    ScopeAlreadyEntered,

    #[error("template has been disposed")]
    TemplateDisposed,

    #[error("no context is entered on this thread")]
    NoCurrentContext,

    #[error("array length is too large")]
    ArrayTooLong,
}
