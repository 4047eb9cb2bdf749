//! JavaScript function types
//!
//! This module implements the different function types:
//! - Closures (script functions with a captured environment)
//! - Native functions (Rust builtins)
//! - Bound functions (`Function.prototype.bind`)
//! - Host functions (created from a function template)

use std::fmt;
use std::sync::Arc;

use crate::gc::{EnvId, ObjectId, Trace, Tracer};
use crate::parser::ast::FunctionNode;
use crate::runtime::{JSString, JSValue, JsResult};
use crate::vm::Interpreter;

/// Native function signature
///
/// Natives receive the interpreter and a view of the call.
pub type NativeFn = fn(&mut Interpreter<'_>, &NativeCall<'_>) -> JsResult<JSValue>;

/// Arguments of a native call
pub struct NativeCall<'a> {
    pub this: JSValue,
    pub args: &'a [JSValue],
    pub callee: ObjectId,
    /// Invoked with `new`
    pub construct: bool,
}

impl NativeCall<'_> {
    /// Argument `i`, or undefined when missing
    #[inline]
    pub fn arg(&self, i: usize) -> JSValue {
        self.args.get(i).cloned().unwrap_or_default()
    }
}

/// Source text a closure was compiled from
#[derive(Debug)]
pub struct ScriptSource {
    /// Resource name reported in stack traces
    pub name: JSString,
    pub line_offset: i32,
    pub column_offset: i32,
    pub text: Arc<str>,
}

impl ScriptSource {
    /// Name used for scripts compiled without an origin
    pub const ANONYMOUS: &'static str = "<anonymous>";

    pub fn anonymous(text: Arc<str>) -> Self {
        ScriptSource {
            name: JSString::from(Self::ANONYMOUS),
            line_offset: 0,
            column_offset: 0,
            text,
        }
    }

    /// One-based source line, without the terminator
    pub fn line_text(&self, line: u32) -> Option<&str> {
        let index = (line as usize).checked_sub(1)?;
        self.text.lines().nth(index)
    }

    /// Line as reported to the embedder
    #[inline]
    pub fn report_line(&self, line: u32) -> i64 {
        line as i64 + self.line_offset as i64
    }

    /// Column as reported to the embedder; the offset only shifts line 1
    #[inline]
    pub fn report_column(&self, line: u32, column: u32) -> i64 {
        if line == 1 {
            column as i64 + self.column_offset as i64
        } else {
            column as i64
        }
    }
}

/// A script function with its captured scope
#[derive(Debug, Clone)]
pub struct Closure {
    pub node: Arc<FunctionNode>,
    pub env: EnvId,
    pub source: Arc<ScriptSource>,
}

/// A function produced by `bind`
#[derive(Debug, Clone)]
pub struct BoundFunction {
    pub target: ObjectId,
    pub this: JSValue,
    pub args: Vec<JSValue>,
}

/// Function payload of a callable object
#[derive(Clone)]
pub enum FunctionKind {
    Closure(Closure),
    Native {
        func: NativeFn,
        /// Whether `new` is allowed
        constructor: bool,
    },
    Bound(Box<BoundFunction>),
    /// Backed by a host function template
    Host { template: u64 },
}

impl FunctionKind {
    /// Whether the function may be used with `new`
    pub fn is_constructor(&self) -> bool {
        match self {
            FunctionKind::Closure(c) => !c.node.is_arrow,
            FunctionKind::Native { constructor, .. } => *constructor,
            FunctionKind::Bound(_) | FunctionKind::Host { .. } => true,
        }
    }
}

impl fmt::Debug for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Closure(c) => write!(f, "Closure({:?})", c.node.name),
            FunctionKind::Native { constructor, .. } => {
                write!(f, "Native {{ constructor: {} }}", constructor)
            }
            FunctionKind::Bound(b) => write!(f, "Bound({:?})", b.target),
            FunctionKind::Host { template } => write!(f, "Host({})", template),
        }
    }
}

impl Trace for FunctionKind {
    fn trace(&self, tracer: &mut Tracer) {
        match self {
            FunctionKind::Closure(c) => tracer.env(c.env),
            FunctionKind::Bound(b) => {
                tracer.object(b.target);
                tracer.value(&b.this);
                for arg in &b.args {
                    tracer.value(arg);
                }
            }
            FunctionKind::Native { .. } | FunctionKind::Host { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_source_positions() {
        let source = ScriptSource {
            name: JSString::from("test.js"),
            line_offset: 10,
            column_offset: 4,
            text: Arc::from("var a = 1;\nthrow a;\n"),
        };
        assert_eq!(source.line_text(2), Some("throw a;"));
        assert_eq!(source.line_text(0), None);
        assert_eq!(source.line_text(5), None);
        assert_eq!(source.report_line(2), 12);
        assert_eq!(source.report_column(1, 1), 5);
        assert_eq!(source.report_column(2, 1), 1);
    }
}
