//! Compiled scripts and precompiled data
//!
//! A [`Script`] is a parsed program plus its origin. It is not tied to a
//! context: the same script can run in any context of any engine, from any
//! thread.
//!
//! [`ScriptData`] is the serialized form of a parsed program. Feeding it
//! back to [`Engine::compile`](crate::Engine::compile) together with the
//! same source skips parsing. The blob layout is
//!
//! ```text
//! "MQSD" | format version: u32 | source hash: u64 | payload length: u64 | payload
//! ```
//!
//! with little-endian integers and the program as JSON. Data that does not
//! match the source, or does not decode, is ignored and the source is parsed
//! again.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::BridgeError;
use crate::parser::ast::Program;
use crate::parser::{CompileError, parse};
use crate::runtime::{JSString, ScriptSource};
use crate::util::fnv1a64;
use crate::value::Value;

const MAGIC: &[u8; 4] = b"MQSD";
const FORMAT_VERSION: u32 = 2;
const HEADER_LEN: usize = 4 + 4 + 8 + 8;

/// Where a script came from
///
/// Offsets shift the positions reported for exceptions, for scripts that
/// are embedded in a larger document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOrigin {
    pub name: String,
    pub line_offset: i32,
    pub column_offset: i32,
}

impl ScriptOrigin {
    pub fn new(name: impl Into<String>, line_offset: i32, column_offset: i32) -> Self {
        ScriptOrigin {
            name: name.into(),
            line_offset,
            column_offset,
        }
    }
}

/// A compiled script
#[derive(Clone)]
pub struct Script {
    program: Arc<Program>,
    source: Arc<ScriptSource>,
}

impl Script {
    /// Parse `code`, reusing `data` when it belongs to it
    pub(crate) fn compile(
        code: &str,
        origin: Option<&ScriptOrigin>,
        data: Option<&ScriptData>,
    ) -> Result<Script, (CompileError, ScriptSource)> {
        let source = match origin {
            Some(origin) => ScriptSource {
                name: JSString::from(origin.name.as_str()),
                line_offset: origin.line_offset,
                column_offset: origin.column_offset,
                text: Arc::from(code),
            },
            None => ScriptSource::anonymous(Arc::from(code)),
        };
        let program = match data.and_then(|data| data.program_for(code)) {
            Some(program) => program,
            None => match parse(code) {
                Ok(program) => program,
                Err(error) => return Err((error, source)),
            },
        };
        Ok(Script {
            program: Arc::new(program),
            source: Arc::new(source),
        })
    }

    /// Run in `context`; `None` when the script throws
    ///
    /// Does not enter the context, so several threads may run scripts in
    /// one context; they take turns on the engine lock.
    pub fn run(&self, context: &Context) -> Option<Value> {
        let program = &self.program;
        let source = &self.source;
        context
            .engine()
            .execute_value(Some(context.realm()), |interp| interp.run_program(program, source.clone()))
    }

    /// Run in the context entered on this thread
    pub fn run_current(&self) -> Result<Option<Value>, BridgeError> {
        let context = Context::current().ok_or(BridgeError::NoCurrentContext)?;
        Ok(self.run(&context))
    }

    /// Name from the script's origin
    pub fn resource_name(&self) -> &str {
        self.source.name.as_str()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script").field("name", &self.resource_name()).finish()
    }
}

/// Precompiled form of a script
#[derive(Clone, PartialEq, Eq)]
pub struct ScriptData {
    bytes: Arc<[u8]>,
}

impl ScriptData {
    /// Wrap bytes previously obtained from [`data`](Self::data)
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        ScriptData { bytes: bytes.into() }
    }

    /// Parse `code`; `None` when it does not parse
    pub(crate) fn pre_compile(code: &str) -> Option<ScriptData> {
        let program = parse(code).ok()?;
        let payload = serde_json::to_vec(&program).ok()?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&fnv1a64(code.as_bytes()).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&payload);
        Some(ScriptData { bytes: bytes.into() })
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the blob is malformed
    pub fn has_error(&self) -> bool {
        self.payload().is_none()
    }

    /// Source hash and payload, if the header is valid
    fn payload(&self) -> Option<(u64, &[u8])> {
        let bytes = &self.bytes[..];
        if bytes.get(0..4)? != MAGIC {
            return None;
        }
        let version = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?);
        let hash = u64::from_le_bytes(bytes.get(8..16)?.try_into().ok()?);
        let length = u64::from_le_bytes(bytes.get(16..HEADER_LEN)?.try_into().ok()?);
        let payload = bytes.get(HEADER_LEN..)?;
        (version == FORMAT_VERSION && payload.len() as u64 == length).then_some((hash, payload))
    }

    /// The stored program, if this data was made from `code`
    pub(crate) fn program_for(&self, code: &str) -> Option<Program> {
        let (hash, payload) = self.payload()?;
        if hash != fnv1a64(code.as_bytes()) {
            return None;
        }
        serde_json::from_slice(payload).ok()
    }
}

impl fmt::Debug for ScriptData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptData").field("len", &self.bytes.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;

    const CODE: &str = "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); } fib(15)";

    #[test]
    fn test_pre_compile_round_trip() {
        let engine = Engine::new();
        let data = engine.pre_compile(CODE).unwrap();
        assert!(!data.has_error());
        assert_eq!(&data.data()[..4], b"MQSD");

        let restored = ScriptData::new(data.data().to_vec());
        assert_eq!(restored, data);
        assert!(restored.program_for(CODE).is_some());

        let context = engine.new_context(None);
        let script = engine.compile(CODE, None, Some(&restored)).unwrap();
        assert_eq!(script.run(&context).unwrap().to_int32(), 610);
    }

    #[test]
    fn test_pre_compiled_numbers_are_exact() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        for code in [
            "4.055474706295447e-187",
            "0.1 + 0.2",
            "1.7976931348623157e308",
            "5e-324",
            "1e400",
            "-1e400",
            "[0.30000000000000004, 123456789.12345679, 2.2250738585072014e-308].join()",
        ] {
            let plain = engine.compile(code, None, None).unwrap().run(&context).unwrap();
            let data = engine.pre_compile(code).unwrap();
            let precompiled = engine.compile(code, None, Some(&data)).unwrap().run(&context).unwrap();
            assert_eq!(plain.to_string(), precompiled.to_string(), "{}", code);
            assert_eq!(plain.to_number().to_bits(), precompiled.to_number().to_bits(), "{}", code);
        }
    }

    #[test]
    fn test_pre_compile_rejects_bad_source() {
        let engine = Engine::new();
        assert!(engine.pre_compile("function (").is_none());
    }

    #[test]
    fn test_mismatched_data_is_ignored() {
        let engine = Engine::new();
        let data = engine.pre_compile("1 + 1").unwrap();
        assert!(data.program_for("2 + 2").is_none());

        let context = engine.new_context(None);
        let script = engine.compile("2 + 2", None, Some(&data)).unwrap();
        assert_eq!(script.run(&context).unwrap().to_int32(), 4);
    }

    #[test]
    fn test_malformed_data() {
        assert!(ScriptData::new(vec![1u8, 2, 3]).has_error());
        assert!(ScriptData::new(Vec::new()).has_error());

        let engine = Engine::new();
        let data = engine.pre_compile("1").unwrap();
        let mut bytes = data.data().to_vec();
        bytes.truncate(bytes.len() - 1);
        assert!(ScriptData::new(bytes).has_error());
    }

    #[test]
    fn test_origin() {
        let engine = Engine::new();
        let origin = ScriptOrigin::new("lib.js", 5, 0);
        let script = engine.compile("1", Some(&origin), None).unwrap();
        assert_eq!(script.resource_name(), "lib.js");
        assert_eq!(engine.compile("1", None, None).unwrap().resource_name(), "<anonymous>");
    }

    #[test]
    fn test_run_current() {
        let engine = Engine::new();
        let script = engine.compile("6 * 7", None, None).unwrap();
        assert_eq!(script.run_current().unwrap_err(), BridgeError::NoCurrentContext);

        let context = engine.new_context(None);
        context.scope(|_| {
            assert_eq!(script.run_current().unwrap().unwrap().to_int32(), 42);
        });
    }

    #[test]
    fn test_script_runs_in_many_contexts() {
        let engine = Engine::new();
        let script = engine.compile("typeof marker === 'undefined' ? (marker = 1) : ++marker", None, None).unwrap();
        let a = engine.new_context(None);
        let b = engine.new_context(None);
        assert_eq!(script.run(&a).unwrap().to_int32(), 1);
        assert_eq!(script.run(&a).unwrap().to_int32(), 2);
        assert_eq!(script.run(&b).unwrap().to_int32(), 1);
    }
}
