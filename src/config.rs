//! Engine configuration
//!
//! Engines copy the process-wide default configuration when they are
//! created. The default can be changed with V8-style flag strings through
//! [`set_flags_from_string`] or replaced from environment variables.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

// ========== Configuration ==========

/// Configuration for an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Nested script calls allowed before a `RangeError`
    pub max_call_depth: usize,
    /// Heap allocations between garbage collections
    pub gc_threshold: usize,
    /// Log every handle disposal
    pub trace_dispose: bool,
    /// Frames recorded in `Error.prototype.stack`
    pub stack_trace_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 128,
            gc_threshold: 4096,
            trace_dispose: false,
            stack_trace_limit: 10,
        }
    }
}

impl EngineConfig {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_gc_threshold(mut self, threshold: usize) -> Self {
        self.gc_threshold = threshold.max(1);
        self
    }

    pub fn with_trace_dispose(mut self, enabled: bool) -> Self {
        self.trace_dispose = enabled;
        self
    }

    pub fn with_stack_trace_limit(mut self, limit: usize) -> Self {
        self.stack_trace_limit = limit;
        self
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_call_depth: std::env::var("MQJS_MAX_CALL_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_call_depth),
            gc_threshold: std::env::var("MQJS_GC_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.gc_threshold)
                .max(1),
            trace_dispose: std::env::var("MQJS_TRACE_DISPOSE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.trace_dispose),
            stack_trace_limit: std::env::var("MQJS_STACK_TRACE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stack_trace_limit),
        }
    }

    /// Apply one `--name[=value]` flag; returns false if it was not understood
    fn apply_flag(&mut self, flag: &str) -> bool {
        let Some(flag) = flag.strip_prefix("--") else {
            return false;
        };
        let (name, value) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (flag, None),
        };
        let name = name.replace('_', "-");
        let number = || value.and_then(|v| v.parse::<usize>().ok());

        match name.as_str() {
            "max-call-depth" => number().map(|n| self.max_call_depth = n).is_some(),
            "gc-threshold" => number().map(|n| self.gc_threshold = n.max(1)).is_some(),
            "stack-trace-limit" => number().map(|n| self.stack_trace_limit = n).is_some(),
            "trace-dispose" => match value {
                None | Some("true") | Some("1") => {
                    self.trace_dispose = true;
                    true
                }
                Some("false") | Some("0") => {
                    self.trace_dispose = false;
                    true
                }
                Some(_) => false,
            },
            "no-trace-dispose" => {
                self.trace_dispose = false;
                true
            }
            _ => false,
        }
    }
}

static DEFAULT_CONFIG: Lazy<RwLock<EngineConfig>> = Lazy::new(|| RwLock::new(EngineConfig::default()));

/// Configuration used by engines created without an explicit one
pub fn default_config() -> EngineConfig {
    DEFAULT_CONFIG.read().clone()
}

/// Replace the process-wide default configuration
pub fn set_default_config(config: EngineConfig) {
    *DEFAULT_CONFIG.write() = config;
}

/// Update the default configuration from a flag string
///
/// Example: `"--max-call-depth=64 --trace-dispose"`. Unknown flags are
/// ignored.
pub fn set_flags_from_string(flags: &str) {
    let mut config = DEFAULT_CONFIG.write();
    for flag in flags.split_whitespace() {
        if !config.apply_flag(flag) {
            debug!(flag, "ignoring unknown engine flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_call_depth, 128);
        assert_eq!(config.gc_threshold, 4096);
        assert!(!config.trace_dispose);
        assert_eq!(config.stack_trace_limit, 10);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_max_call_depth(32)
            .with_gc_threshold(0)
            .with_trace_dispose(true);
        assert_eq!(config.max_call_depth, 32);
        assert_eq!(config.gc_threshold, 1);
        assert!(config.trace_dispose);
    }

    #[test]
    fn test_apply_flags() {
        let mut config = EngineConfig::default();
        assert!(config.apply_flag("--max-call-depth=64"));
        assert!(config.apply_flag("--trace_dispose"));
        assert!(config.apply_flag("--stack-trace-limit=3"));
        assert!(!config.apply_flag("--max-call-depth=lots"));
        assert!(!config.apply_flag("--harmony"));
        assert!(!config.apply_flag("max-call-depth=1"));
        assert_eq!(config.max_call_depth, 64);
        assert!(config.trace_dispose);
        assert_eq!(config.stack_trace_limit, 3);

        assert!(config.apply_flag("--no-trace-dispose"));
        assert!(!config.trace_dispose);
    }
}
