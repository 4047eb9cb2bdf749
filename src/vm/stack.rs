//! Call stack for the interpreter
//!
//! The tree-walking interpreter recurses on the Rust stack, so this stack
//! only records what is needed to bound recursion and to render stack
//! traces: which function is running and where.

use std::fmt::Write;
use std::sync::Arc;

use crate::runtime::JSString;
use crate::runtime::function::ScriptSource;

/// Call frame information
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Function name, `None` for script top level
    pub function: Option<JSString>,
    /// Script the frame is executing
    pub source: Arc<ScriptSource>,
    /// Position of the statement being executed (1-based)
    pub line: u32,
    pub column: u32,
}

impl CallFrame {
    pub fn new(function: Option<JSString>, source: Arc<ScriptSource>, line: u32, column: u32) -> Self {
        CallFrame {
            function,
            source,
            line,
            column,
        }
    }

    fn render(&self, out: &mut String) {
        let line = self.source.report_line(self.line);
        let column = self.source.report_column(self.line, self.column);
        match self.function.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => {
                let _ = write!(out, "    at {} ({}:{}:{})", name, self.source.name, line, column);
            }
            None => {
                let _ = write!(out, "    at {}:{}:{}", self.source.name, line, column);
            }
        }
    }
}

/// Stack of active script frames
#[derive(Debug, Default)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack { frames: Vec::new() }
    }

    /// Push a new frame
    #[inline]
    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    /// Pop a frame
    #[inline]
    pub fn pop(&mut self) -> Option<CallFrame> {
        self.frames.pop()
    }

    /// Get the current stack depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Drop frames above `depth`
    #[inline]
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Record the position of the statement about to run
    #[inline]
    pub fn set_position(&mut self, line: u32, column: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
            frame.column = column;
        }
    }

    /// Render up to `limit` frames, innermost first, one per line
    pub fn capture(&self, limit: usize) -> String {
        let mut out = String::new();
        for frame in self.frames.iter().rev().take(limit) {
            if !out.is_empty() {
                out.push('\n');
            }
            frame.render(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str) -> Arc<ScriptSource> {
        let mut source = ScriptSource::anonymous(Arc::from("f();\n"));
        source.name = JSString::from(name);
        Arc::new(source)
    }

    #[test]
    fn test_push_pop() {
        let mut stack = CallStack::new();
        stack.push(CallFrame::new(None, source("a.js"), 1, 1));
        stack.push(CallFrame::new(Some("f".into()), source("a.js"), 3, 5));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap().function.as_deref(), Some("f"));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_capture() {
        let mut stack = CallStack::new();
        stack.push(CallFrame::new(None, source("a.js"), 1, 1));
        stack.push(CallFrame::new(Some("f".into()), source("a.js"), 1, 1));
        stack.set_position(2, 3);

        assert_eq!(stack.capture(10), "    at f (a.js:2:3)\n    at a.js:1:1");
        assert_eq!(stack.capture(1), "    at f (a.js:2:3)");
        assert_eq!(stack.capture(0), "");
    }
}
