//! Caught script exceptions
//!
//! An [`Exception`] is a snapshot of a thrown value taken when it escapes a
//! binding operation: the string form of the value plus where it was thrown.
//! It holds no engine references and can be sent across threads.

use std::fmt;
use std::fmt::Write;

/// A script exception that escaped to the embedder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// String form of the thrown value, e.g. `Error: boom`
    pub message: String,
    /// Name of the script the exception was thrown from
    pub resource_name: Option<String>,
    /// One-based line, including the script origin's line offset
    pub line: Option<i64>,
    /// Zero-based column of the statement that threw
    pub start_column: Option<i64>,
    /// Column just past the statement's first token
    pub end_column: Option<i64>,
    pub source_line: Option<String>,
    /// Value of the error's `stack` property
    pub stack_trace: Option<String>,
}

impl Exception {
    /// An exception with a message and no location
    pub fn new(message: impl Into<String>) -> Self {
        Exception {
            message: message.into(),
            resource_name: None,
            line: None,
            start_column: None,
            end_column: None,
            source_line: None,
            stack_trace: None,
        }
    }

    /// Multi-line report with location, source line and stack
    ///
    /// ```text
    /// test.js:2: Error: boom
    /// throw new Error('boom');
    /// ^^^^^
    /// Error: boom
    ///     at test.js:2:1
    /// ```
    pub fn detailed(&self) -> String {
        let mut out = String::new();
        match (&self.resource_name, self.line) {
            (Some(name), Some(line)) => {
                let _ = writeln!(out, "{}:{}: {}", name, line, self.message);
            }
            _ => {
                let _ = writeln!(out, "{}", self.message);
            }
        }
        if let Some(source_line) = &self.source_line {
            let _ = writeln!(out, "{}", source_line);
            if let (Some(start), Some(end)) = (self.start_column, self.end_column) {
                let start = start.max(0) as usize;
                let end = (end.max(0) as usize).max(start + 1);
                out.extend(std::iter::repeat_n(' ', start));
                out.extend(std::iter::repeat_n('^', end - start));
                out.push('\n');
            }
        }
        if let Some(stack) = self.stack_trace.as_deref().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "{}", stack);
        }
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Exception {}

/// Width of the token starting at byte `start` of `line`, in characters
pub(crate) fn token_width(line: &str, start: usize) -> usize {
    let Some(rest) = line.get(start..) else {
        return 1;
    };
    let mut chars = rest.chars();
    let Some(first) = chars.next() else {
        return 1;
    };
    let is_ident = |c: char| c == '$' || c == '_' || c.is_alphanumeric();
    if is_ident(first) {
        1 + chars.take_while(|c| is_ident(*c)).count()
    } else if first == '"' || first == '\'' {
        let mut width = 1;
        let mut escaped = false;
        for c in chars {
            width += 1;
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == first {
                break;
            }
        }
        width
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_form() {
        let exception = Exception::new("Error: boom");
        assert_eq!(exception.to_string(), "Error: boom");
        assert_eq!(exception.detailed(), "Error: boom\n");
    }

    #[test]
    fn test_detailed_form() {
        let exception = Exception {
            message: "Error: boom".to_string(),
            resource_name: Some("test.js".to_string()),
            line: Some(2),
            start_column: Some(2),
            end_column: Some(7),
            source_line: Some("  throw new Error('boom');".to_string()),
            stack_trace: Some("Error: boom\n    at test.js:2:3".to_string()),
        };
        assert_eq!(
            exception.detailed(),
            "test.js:2: Error: boom\n  throw new Error('boom');\n  ^^^^^\nError: boom\n    at test.js:2:3\n"
        );
    }

    #[test]
    fn test_token_width() {
        assert_eq!(token_width("throw x;", 0), 5);
        assert_eq!(token_width("  foo.bar()", 2), 3);
        assert_eq!(token_width("'a\\'b' + 1", 0), 6);
        assert_eq!(token_width("{}", 0), 1);
        assert_eq!(token_width("", 4), 1);
    }
}
