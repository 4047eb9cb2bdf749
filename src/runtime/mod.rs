//! Runtime support
//!
//! This module contains the core runtime types for JavaScript execution:
//! - Values, strings and property keys
//! - Object representation (JSObject, property tables, arrays)
//! - Function types and environments
//! - Realms and the host dispatch seam
//!
//! [`Runtime`] ties them together. It owns the heap of one engine plus the
//! execution state shared by every context of that engine. It is not
//! thread-safe by itself; the embedding layer serializes access with a
//! reentrant lock and the runtime uses `RefCell` borrows that are never held
//! across a call back into script or host code.

pub mod array;
pub mod env;
pub mod function;
pub mod host;
pub mod object;
pub mod property;
pub mod realm;
pub mod regexp;
pub mod string;
pub mod value;

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::sync::Arc;
use std::thread::ThreadId;

use tracing::{debug, warn};

use crate::builtins;
use crate::config::EngineConfig;
use crate::exception::Exception;
use crate::gc::{Heap, HeapStats, RealmId};
use crate::handle::HandleTable;
use crate::vm::{CallStack, Interpreter};

pub use array::{JSArray, MAX_ARRAY_LENGTH};
pub use function::{Closure, FunctionKind, NativeCall, NativeFn, ScriptSource};
pub use host::{AccessorCall, HostCall, HostDispatch, InterceptCall, InterceptOp, NoHost};
pub use object::{ClassId, HostData, JSObject, ObjectData};
pub use property::{PropertyFlags, PropertyKey, PropertyTable};
pub use realm::ErrorKind;
pub use string::JSString;
pub use value::JSValue;

/// Result of an operation that may throw a script value
pub type JsResult<T> = Result<T, JSValue>;

/// Where the most recent uncaught throw happened
#[derive(Debug, Clone)]
pub struct ThrowSite {
    pub source: Arc<ScriptSource>,
    pub line: u32,
    pub column: u32,
}

/// A TryCatch opened by the embedder
#[derive(Debug)]
pub struct TryCatchFrame {
    pub thread: ThreadId,
    /// Host callback depth the TryCatch was opened at
    pub depth: usize,
    pub caught: Option<Exception>,
}

/// Execution state shared by all contexts of an engine
#[derive(Debug, Default)]
pub struct ExecState {
    /// Host callbacks in progress
    pub callback_depth: usize,
    pub call_stack: CallStack,
    pub throw_site: Option<ThrowSite>,
    /// Exception raised inside a host callback, rethrown when it returns
    pub pending: Option<JSValue>,
    pub try_catches: Vec<TryCatchFrame>,
}

/// A thrown value that escaped [`Runtime::execute`]
#[derive(Debug)]
pub struct Thrown {
    pub value: JSValue,
    pub exception: Exception,
}

/// One engine's heap and execution state
pub struct Runtime {
    heap: RefCell<Heap>,
    handles: RefCell<HandleTable>,
    state: RefCell<ExecState>,
    config: EngineConfig,
    host: Arc<dyn HostDispatch>,
    utility_realm: Cell<Option<RealmId>>,
    /// Nested `Runtime::execute` calls in progress
    active: Cell<usize>,
}

impl Runtime {
    pub fn new(config: EngineConfig, host: Arc<dyn HostDispatch>) -> Self {
        Runtime {
            heap: RefCell::new(Heap::new()),
            handles: RefCell::new(HandleTable::new()),
            state: RefCell::new(ExecState::default()),
            config,
            host,
            utility_realm: Cell::new(None),
            active: Cell::new(0),
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn host(&self) -> Arc<dyn HostDispatch> {
        self.host.clone()
    }

    #[inline]
    pub fn heap(&self) -> Ref<'_, Heap> {
        self.heap.borrow()
    }

    #[inline]
    pub fn heap_mut(&self) -> RefMut<'_, Heap> {
        self.heap.borrow_mut()
    }

    #[inline]
    /// Nested `execute` calls in progress; collection waits for zero
    #[inline]
    pub fn active(&self) -> usize {
        self.active.get()
    }

    pub fn state(&self) -> Ref<'_, ExecState> {
        self.state.borrow()
    }

    #[inline]
    pub fn state_mut(&self) -> RefMut<'_, ExecState> {
        self.state.borrow_mut()
    }

    #[inline]
    pub fn handles_mut(&self) -> RefMut<'_, HandleTable> {
        self.handles.borrow_mut()
    }

    /// Handle table, unless it is already borrowed
    pub(crate) fn try_handles_mut(&self) -> Option<RefMut<'_, HandleTable>> {
        self.handles.try_borrow_mut().ok()
    }

    /// Create a realm with a fresh global object and builtins
    pub fn create_realm(&self) -> RealmId {
        let realm = builtins::create_realm(&mut self.heap_mut());
        debug!(realm = realm.0, "created realm");
        realm
    }

    /// Stop treating a realm as a root
    pub fn detach_realm(&self, realm: RealmId) {
        let mut heap = self.heap_mut();
        if heap.try_realm(realm).is_some() {
            heap.realm_mut(realm).attached = false;
        }
    }

    /// [`detach_realm`](Self::detach_realm), unless the heap is borrowed
    pub(crate) fn try_detach_realm(&self, realm: RealmId) -> bool {
        let Ok(mut heap) = self.heap.try_borrow_mut() else {
            return false;
        };
        if heap.try_realm(realm).is_some() {
            heap.realm_mut(realm).attached = false;
        }
        true
    }

    /// Realm used for operations that do not belong to any context
    pub fn utility_realm(&self) -> RealmId {
        if let Some(realm) = self.utility_realm.get() {
            return realm;
        }
        let realm = self.create_realm();
        self.utility_realm.set(Some(realm));
        realm
    }

    /// Run `f` with an interpreter for `realm`
    ///
    /// The outermost call may collect garbage first. A value thrown out of
    /// `f` comes back as [`Thrown`], with an [`Exception`] describing it.
    pub fn execute<R>(
        &self,
        realm: RealmId,
        f: impl FnOnce(&mut Interpreter<'_>) -> JsResult<R>,
    ) -> Result<R, Thrown> {
        if self.active.get() == 0 {
            self.maybe_collect();
        }
        let guard = ActiveGuard::enter(self);
        let mut interp = Interpreter::new(self, realm);
        let result = f(&mut interp).map_err(|value| {
            let exception = interp.describe_exception(&value);
            Thrown { value, exception }
        });
        drop(guard);
        result
    }

    /// Collect if enough has been allocated since the last cycle
    pub fn maybe_collect(&self) {
        let due = self.heap.borrow().allocated_since_gc() >= self.config.gc_threshold;
        if due {
            self.collect_garbage();
        }
    }

    /// Run a full collection; returns the number of objects freed
    ///
    /// Does nothing while script is running.
    pub fn collect_garbage(&self) -> usize {
        if self.active.get() > 0 {
            return 0;
        }
        let mut roots = {
            let state = self.state.borrow();
            let mut roots = self.handles.borrow().roots();
            if let Some(pending) = state.pending.as_ref().and_then(JSValue::as_object) {
                roots.objects.push(pending);
            }
            roots
        };
        if let Some(realm) = self.utility_realm.get() {
            roots.realms.push(realm);
        }
        let freed = self.heap.borrow_mut().collect(&roots);
        if cfg!(feature = "debug-gc") {
            debug!(freed, "collected garbage");
        }
        freed
    }

    pub fn heap_stats(&self) -> HeapStats {
        let heap = self.heap.borrow();
        HeapStats {
            objects: heap.object_count(),
            environments: heap.env_count(),
            handles: self.handles.borrow().len(),
            contexts: heap.realm_count(),
        }
    }
}

/// Tracks one level of [`Runtime::execute`] nesting
///
/// Restores the call stack and the outer throw site on the way out, also
/// when unwinding.
struct ActiveGuard<'rt> {
    rt: &'rt Runtime,
    saved_site: Option<ThrowSite>,
    stack_depth: usize,
}

impl<'rt> ActiveGuard<'rt> {
    fn enter(rt: &'rt Runtime) -> Self {
        let mut state = rt.state.borrow_mut();
        rt.active.set(rt.active.get() + 1);
        ActiveGuard {
            rt,
            saved_site: state.throw_site.take(),
            stack_depth: state.call_stack.depth(),
        }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.rt.active.set(self.rt.active.get().saturating_sub(1));
        match self.rt.state.try_borrow_mut() {
            Ok(mut state) => {
                state.call_stack.truncate(self.stack_depth);
                state.throw_site = self.saved_site.take();
            }
            Err(_) => warn!(depth = self.stack_depth, "execution state busy, call stack not restored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn runtime() -> Runtime {
        Runtime::new(EngineConfig::default(), Arc::new(NoHost))
    }

    fn eval(rt: &Runtime, realm: RealmId, code: &str) -> Result<JSValue, Thrown> {
        let program = parse(code).expect("parse");
        let source = Arc::new(ScriptSource::anonymous(Arc::from(code)));
        rt.execute(realm, |interp| interp.run_program(&program, source))
    }

    #[test]
    fn test_execute_returns_completion_value() {
        let rt = runtime();
        let realm = rt.create_realm();
        let value = eval(&rt, realm, "'Hello ' + 'World!'").unwrap();
        assert_eq!(value.as_string().map(|s| s.as_str()), Some("Hello World!"));
    }

    #[test]
    fn test_thrown_exception_has_location() {
        let rt = runtime();
        let realm = rt.create_realm();
        let thrown = eval(&rt, realm, "var a = 1;\n  throw new Error('boom');").unwrap_err();
        let exception = thrown.exception;
        assert_eq!(exception.message, "Error: boom");
        assert_eq!(exception.resource_name.as_deref(), Some("<anonymous>"));
        assert_eq!(exception.line, Some(2));
        assert_eq!(exception.start_column, Some(2));
        assert_eq!(exception.end_column, Some(7));
        assert_eq!(exception.source_line.as_deref(), Some("  throw new Error('boom');"));
        assert_eq!(
            exception.stack_trace.as_deref(),
            Some("Error: boom\n    at <anonymous>:2:3")
        );
        assert_eq!(rt.active(), 0);
        assert!(rt.state().call_stack.is_empty());
    }

    #[test]
    fn test_realms_are_isolated() {
        let rt = runtime();
        let a = rt.create_realm();
        let b = rt.create_realm();
        eval(&rt, a, "var shared = 1").unwrap();
        let value = eval(&rt, b, "typeof shared").unwrap();
        assert_eq!(value.as_string().map(|s| s.as_str()), Some("undefined"));
    }

    #[test]
    fn test_collect_frees_detached_realm() {
        let rt = runtime();
        let realm = rt.create_realm();
        eval(&rt, realm, "var big = []; for (var i = 0; i < 100; i++) big.push({ i: i });").unwrap();
        let before = rt.heap_stats();
        rt.detach_realm(realm);
        let freed = rt.collect_garbage();
        assert!(freed > 100);
        let after = rt.heap_stats();
        assert!(after.objects < before.objects);
        assert_eq!(after.contexts, before.contexts - 1);
    }

    #[test]
    fn test_active_count_survives_busy_state() {
        let rt = runtime();
        let realm = rt.create_realm();
        let guard = ActiveGuard::enter(&rt);
        assert_eq!(rt.active(), 1);
        assert_eq!(rt.collect_garbage(), 0);
        {
            let _busy = rt.state();
            drop(guard);
        }
        assert_eq!(rt.active(), 0);

        eval(&rt, realm, "var big = []; for (var i = 0; i < 10; i++) big.push({ i: i });").unwrap();
        rt.detach_realm(realm);
        assert!(rt.collect_garbage() > 10);
    }

    #[test]
    fn test_handles_are_roots() {
        let rt = runtime();
        let realm = rt.create_realm();
        let obj = eval(&rt, realm, "({ a: 1 })").unwrap().as_object().unwrap();
        rt.handles_mut().retain(obj);
        rt.detach_realm(realm);
        rt.collect_garbage();
        assert!(rt.heap().try_object(obj).is_some());

        rt.handles_mut().release(obj);
        rt.collect_garbage();
        assert!(rt.heap().try_object(obj).is_none());
    }
}
