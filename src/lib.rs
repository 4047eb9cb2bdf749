//! mqjs-bridge - an embeddable JavaScript engine with a V8-style host API
//!
//! The crate pairs a small ES5 interpreter with the object model embedders
//! expect from larger engines: isolated engines, contexts with their own
//! globals, value handles that are safe to move between threads, and
//! templates for host-backed functions and objects.
//!
//! # Features
//! - Engines are fully isolated; contexts of one engine share a heap
//! - Handles are `Send + Sync` and keep their target alive until dropped
//! - Function and object templates with accessors, interceptors and
//!   internal fields
//! - TryCatch capture of exceptions with source positions
//! - Precompiled script data
//!
//! # Example
//! ```
//! use mqjs_bridge::Engine;
//!
//! let engine = Engine::new();
//! let context = engine.new_context(None);
//! let greeting = context.scope(|scope| scope.eval("'Hello ' + 'World!'"));
//! assert_eq!(greeting.unwrap().to_string(), "Hello World!");
//! ```

// Embedding API
pub mod context;
pub mod engine;
pub mod error;
pub mod exception;
pub mod json;
pub mod script;
pub mod template;
pub mod value;

mod bridge;

// Configuration and process-wide hooks
pub mod allocator;
pub mod config;
pub mod handle;

// Garbage collector
pub mod gc;

// Interpreter
pub mod vm;

// Parser
pub mod parser;

// Built-in objects
pub mod builtins;

// Runtime support
pub mod runtime;

// Utilities
pub mod util;

// Re-export main types
pub use allocator::{ArrayBufferAllocator, DefaultAllocator, set_array_buffer_allocator};
pub use config::{EngineConfig, set_default_config, set_flags_from_string};
pub use context::{Context, ContextScope};
pub use engine::{Engine, ListenerId, MessageListener, version};
pub use error::{BridgeError, CompileError};
pub use exception::Exception;
pub use gc::HeapStats;
pub use handle::set_trace_dispose;
pub use json::to_json;
pub use runtime::HostData;
pub use script::{Script, ScriptData, ScriptOrigin};
pub use template::{
    Accessor, AccessorCallbackInfo, FunctionCallbackInfo, FunctionTemplate, IndexedPropertyHandler,
    NamedPropertyHandler, ObjectTemplate, PropertyCallbackInfo, ReturnValue,
};
pub use value::{Array, Function, Object, PropertyAttribute, RegExp, RegExpFlags, Value};

#[cfg(test)]
mod tests {
    //! Threading scenarios over the public API

    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const THREADS: usize = 100;
    const CODE: &str = "'Hello ' + 'World!'";

    fn join_all(handles: Vec<thread::JoinHandle<()>>) {
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_shared_engine() {
        let engine = Engine::new();
        let handles = (0..THREADS)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let context = engine.new_context(None);
                    let result = context.scope(|scope| scope.eval(CODE)).unwrap();
                    assert_eq!(result.to_string(), "Hello World!");
                })
            })
            .collect();
        join_all(handles);
    }

    #[test]
    fn test_shared_context() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let handles = (0..THREADS)
            .map(|_| {
                let context = context.clone();
                thread::spawn(move || {
                    let script = context.compile(CODE, None, None).unwrap();
                    assert_eq!(script.run(&context).unwrap().to_string(), "Hello World!");
                })
            })
            .collect();
        join_all(handles);
    }

    #[test]
    fn test_shared_context_and_script() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let script = Arc::new(engine.compile(CODE, None, None).unwrap());
        let handles = (0..THREADS)
            .map(|_| {
                let (context, script) = (context.clone(), script.clone());
                thread::spawn(move || {
                    assert_eq!(script.run(&context).unwrap().to_string(), "Hello World!");
                })
            })
            .collect();
        join_all(handles);
    }

    #[test]
    fn test_shared_value() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let script = engine.compile(CODE, None, None).unwrap();
        let value = script.run(&context).unwrap();
        let handles = (0..THREADS)
            .map(|_| {
                let value = value.clone();
                thread::spawn(move || assert_eq!(value.to_string(), "Hello World!"))
            })
            .collect();
        join_all(handles);
    }

    #[test]
    fn test_pipelined_threads() {
        let engine = Engine::new();
        let (context_tx, context_rx) = mpsc::channel::<Context>();
        let (script_tx, script_rx) = mpsc::channel::<(Context, Script)>();
        let (value_tx, value_rx) = mpsc::channel::<Value>();

        let producer = {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..THREADS {
                    context_tx.send(engine.new_context(None)).unwrap();
                }
            })
        };
        let compiler = thread::spawn(move || {
            for context in context_rx {
                let script = context.compile(CODE, None, None).unwrap();
                script_tx.send((context, script)).unwrap();
            }
        });
        let runner = thread::spawn(move || {
            let workers: Vec<_> = script_rx
                .into_iter()
                .map(|(context, script)| {
                    let value_tx = value_tx.clone();
                    thread::spawn(move || value_tx.send(script.run(&context).unwrap()).unwrap())
                })
                .collect();
            join_all(workers);
        });

        let results: Vec<String> = value_rx.into_iter().map(|value| value.to_string()).collect();
        join_all(vec![producer, compiler, runner]);
        assert_eq!(results.len(), THREADS);
        assert!(results.iter().all(|result| result == "Hello World!"));
    }
}
