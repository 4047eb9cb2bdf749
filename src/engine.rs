//! Engines
//!
//! An [`Engine`] is one isolated instance of the interpreter: a heap shared
//! by all of its contexts, the templates registered with it and the cached
//! special values. Handles from one engine must not be used with another.
//!
//! The runtime sits behind a reentrant lock. A host callback runs on the
//! thread that already holds the lock, so it can call back into the engine,
//! while other threads block until the outermost operation returns.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::debug;

use crate::bridge::Bridge;
use crate::builtins::json;
use crate::config::{self, EngineConfig};
use crate::context::{Context, ContextInner};
use crate::exception::Exception;
use crate::gc::{HeapStats, RealmId};
use crate::handle::{PendingRelease, trace_dispose};
use crate::parser::CompileError;
use crate::runtime::{ErrorKind, JSValue, JsResult, Runtime, ScriptSource, Thrown, TryCatchFrame};
use crate::script::{Script, ScriptData, ScriptOrigin};
use crate::template::function::FunctionTemplateInner;
use crate::template::object::ObjectTemplateInner;
use crate::template::{FunctionCallbackInfo, FunctionTemplate, ObjectTemplate};
use crate::value::{Value, ValueCore};
use crate::vm::Interpreter;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

static DEFAULT_ENGINE: Lazy<Engine> = Lazy::new(Engine::new);

/// Version of the embedded engine
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Receives exceptions that nobody caught
pub type MessageListener = Arc<dyn Fn(&Exception) + Send + Sync>;

/// Registration returned by [`Engine::add_message_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Singletons {
    undefined: Arc<ValueCore>,
    null: Arc<ValueCore>,
    true_value: Arc<ValueCore>,
    false_value: Arc<ValueCore>,
}

pub(crate) struct EngineInner {
    id: u64,
    runtime: ReentrantMutex<Runtime>,
    /// Handle releases that could not take the runtime
    releases: Mutex<Vec<PendingRelease>>,
    singletons: OnceCell<Singletons>,
    pub(crate) object_templates: Mutex<HashMap<u64, Arc<ObjectTemplateInner>>>,
    pub(crate) function_templates: Mutex<HashMap<u64, Arc<FunctionTemplateInner>>>,
    next_template_id: AtomicU64,
    contexts: Mutex<HashMap<RealmId, Weak<ContextInner>>>,
    listeners: Mutex<Vec<(ListenerId, MessageListener)>>,
    next_listener_id: AtomicU64,
    trace_dispose: bool,
}

impl EngineInner {
    #[inline]
    pub(crate) fn tracing_dispose(&self) -> bool {
        self.trace_dispose || trace_dispose()
    }

    /// Release a host reference now, or queue it when the runtime is busy
    pub(crate) fn release(&self, release: PendingRelease) {
        if let Some(rt) = self.runtime.try_lock() {
            if self.apply_release(&rt, release) {
                return;
            }
        }
        self.releases.lock().push(release);
    }

    fn apply_release(&self, rt: &Runtime, release: PendingRelease) -> bool {
        match release {
            PendingRelease::Handle { object, realm } => match rt.try_handles_mut() {
                Some(mut handles) => {
                    handles.apply(object, realm, self.trace_dispose);
                    true
                }
                None => false,
            },
            PendingRelease::Context(realm) => rt.try_detach_realm(realm),
        }
    }

    fn drain_releases(&self, rt: &Runtime) {
        let queued = std::mem::take(&mut *self.releases.lock());
        if queued.is_empty() {
            return;
        }
        let retry: Vec<PendingRelease> = queued
            .into_iter()
            .filter(|release| !self.apply_release(rt, *release))
            .collect();
        if !retry.is_empty() {
            self.releases.lock().extend(retry);
        }
    }

    pub(crate) fn object_template(&self, id: u64) -> Option<Arc<ObjectTemplateInner>> {
        self.object_templates.lock().get(&id).cloned()
    }

    pub(crate) fn function_template(&self, id: u64) -> Option<Arc<FunctionTemplateInner>> {
        self.function_templates.lock().get(&id).cloned()
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if self.tracing_dispose() {
            debug!(target: "mqjs_bridge::dispose", engine = self.id, "dispose engine");
        }
    }
}

/// An isolated JavaScript engine
///
/// Cloning an `Engine` yields another handle to the same engine. Every
/// handle created from it (contexts, values, templates) keeps it alive.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the process-wide default configuration
    pub fn new() -> Self {
        Self::with_config(config::default_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let trace_dispose = config.trace_dispose;
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner>| EngineInner {
            id,
            runtime: ReentrantMutex::new(Runtime::new(config, Arc::new(Bridge::new(weak.clone())))),
            releases: Mutex::new(Vec::new()),
            singletons: OnceCell::new(),
            object_templates: Mutex::new(HashMap::new()),
            function_templates: Mutex::new(HashMap::new()),
            next_template_id: AtomicU64::new(1),
            contexts: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            trace_dispose,
        });
        debug!(engine = id, "created engine");
        Engine { inner }
    }

    /// Process-wide engine, created on first use
    pub fn default_engine() -> Engine {
        DEFAULT_ENGINE.clone()
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> EngineConfig {
        self.lock().config().clone()
    }

    // =========================================================================
    // Special values
    // =========================================================================

    fn singletons(&self) -> &Singletons {
        self.inner.singletons.get_or_init(|| {
            let engine = Arc::downgrade(&self.inner);
            Singletons {
                undefined: ValueCore::primitive(engine.clone(), JSValue::Undefined),
                null: ValueCore::primitive(engine.clone(), JSValue::Null),
                true_value: ValueCore::primitive(engine.clone(), JSValue::Bool(true)),
                false_value: ValueCore::primitive(engine, JSValue::Bool(false)),
            }
        })
    }

    /// `undefined`; every call returns the same handle
    pub fn undefined(&self) -> Value {
        Value::from_core(self, self.singletons().undefined.clone())
    }

    pub fn null(&self) -> Value {
        Value::from_core(self, self.singletons().null.clone())
    }

    pub fn true_value(&self) -> Value {
        Value::from_core(self, self.singletons().true_value.clone())
    }

    pub fn false_value(&self) -> Value {
        Value::from_core(self, self.singletons().false_value.clone())
    }

    pub fn boolean(&self, value: bool) -> Value {
        if value { self.true_value() } else { self.false_value() }
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Create a context, optionally shaping its global object
    pub fn new_context(&self, global_template: Option<&ObjectTemplate>) -> Context {
        Context::new(self, global_template)
    }

    pub fn new_object_template(&self) -> ObjectTemplate {
        ObjectTemplate::new(self)
    }

    /// Function template calling `callback`
    pub fn new_function_template(
        &self,
        callback: impl Fn(&mut FunctionCallbackInfo<'_>) + Send + Sync + 'static,
    ) -> FunctionTemplate {
        FunctionTemplate::new(self, Some(Arc::new(callback)), None)
    }

    /// Function template calling `callback` with `data` attached
    pub fn new_function_template_with_data(
        &self,
        callback: impl Fn(&mut FunctionCallbackInfo<'_>) + Send + Sync + 'static,
        data: crate::HostData,
    ) -> FunctionTemplate {
        FunctionTemplate::new(self, Some(Arc::new(callback)), Some(data))
    }

    /// Function template whose calls return `undefined`
    pub fn new_empty_function_template(&self) -> FunctionTemplate {
        FunctionTemplate::new(self, None, None)
    }

    pub(crate) fn next_template_id(&self) -> u64 {
        self.inner.next_template_id.fetch_add(1, Ordering::Relaxed)
    }

    // =========================================================================
    // Scripts
    // =========================================================================

    /// Parse `code` ahead of time; `None` when it does not parse
    pub fn pre_compile(&self, code: &str) -> Option<ScriptData> {
        ScriptData::pre_compile(code)
    }

    /// Compile `code`
    ///
    /// A syntax error is reported like a thrown `SyntaxError` and yields
    /// `None`. Precompiled `data` that does not belong to `code` is ignored.
    pub fn compile(&self, code: &str, origin: Option<&ScriptOrigin>, data: Option<&ScriptData>) -> Option<Script> {
        self.compile_in(code, origin, data, None)
    }

    pub(crate) fn compile_in(
        &self,
        code: &str,
        origin: Option<&ScriptOrigin>,
        data: Option<&ScriptData>,
        realm: Option<RealmId>,
    ) -> Option<Script> {
        match Script::compile(code, origin, data) {
            Ok(script) => Some(script),
            Err((error, source)) => {
                self.report_compile_error(&error, &source, realm);
                None
            }
        }
    }

    fn report_compile_error(&self, error: &CompileError, source: &ScriptSource, realm: Option<RealmId>) {
        let line = error.line as u32;
        let start = source.report_column(line, error.column as u32) - 1;
        let mut exception = Exception::new(error.to_string());
        exception.resource_name = Some(source.name.to_string());
        exception.line = Some(source.report_line(line));
        exception.start_column = Some(start);
        exception.end_column = Some(start + 1);
        exception.source_line = source.line_text(line).map(str::to_string);

        let rt = self.lock();
        let realm = realm.unwrap_or_else(|| rt.utility_realm());
        let value = match rt.execute(realm, |interp| Ok(interp.new_error(ErrorKind::SyntaxError, &error.message))) {
            Ok(id) => JSValue::Object(id),
            Err(thrown) => thrown.value,
        };
        self.route(&rt, Thrown { value, exception });
    }

    /// Parse JSON text outside of any context
    pub fn parse_json(&self, text: &str) -> Option<Value> {
        self.execute_value(None, |interp| json::parse(interp, text))
    }

    // =========================================================================
    // Exceptions
    // =========================================================================

    /// Call `listener` with every exception that reaches the top level
    pub fn add_message_listener(&self, listener: impl Fn(&Exception) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        listeners.len() != before
    }

    /// Deliver an exception that escaped a binding operation
    ///
    /// The innermost TryCatch of this thread gets it when it was opened at
    /// the current callback depth. Inside a host callback it is otherwise
    /// left pending and rethrown into the calling script when the callback
    /// returns. At the top level the message listeners see it.
    pub(crate) fn route(&self, rt: &Runtime, thrown: Thrown) {
        let me = thread::current().id();
        {
            let mut state = rt.state_mut();
            let depth = state.callback_depth;
            let frame = state.try_catches.iter_mut().rev().find(|frame| frame.thread == me);
            if let Some(frame) = frame.filter(|frame| frame.depth == depth) {
                frame.caught = Some(thrown.exception);
                return;
            }
            if depth > 0 {
                state.pending = Some(thrown.value);
                return;
            }
        }

        let listeners: Vec<MessageListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            debug!(engine = self.inner.id, message = %thrown.exception, "uncaught exception");
        }
        for listener in listeners {
            listener(&thrown.exception);
        }
    }

    pub(crate) fn open_try_catch(&self) {
        let rt = self.lock();
        let depth = rt.state().callback_depth;
        rt.state_mut().try_catches.push(TryCatchFrame {
            thread: thread::current().id(),
            depth,
            caught: None,
        });
    }

    /// Close this thread's innermost TryCatch
    pub(crate) fn close_try_catch(&self) -> Option<Exception> {
        let rt = self.lock();
        let me = thread::current().id();
        let mut state = rt.state_mut();
        let index = state.try_catches.iter().rposition(|frame| frame.thread == me)?;
        state.try_catches.remove(index).caught
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Run a full collection; returns the number of objects freed
    ///
    /// Does nothing when called from inside a host callback.
    pub fn collect_garbage(&self) -> usize {
        let rt = self.lock();
        rt.collect_garbage()
    }

    pub fn heap_stats(&self) -> HeapStats {
        let rt = self.lock();
        rt.heap_stats()
    }

    // =========================================================================
    // Runtime access
    // =========================================================================

    /// Take the runtime lock, applying queued releases first
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, Runtime> {
        let rt = self.inner.runtime.lock();
        self.inner.drain_releases(&rt);
        rt
    }

    pub(crate) fn with_runtime<R>(&self, f: impl FnOnce(&Runtime) -> R) -> R {
        let rt = self.lock();
        f(&rt)
    }

    /// Run an operation that cannot throw; `None` uses the utility realm
    pub(crate) fn with_interpreter<R>(
        &self,
        realm: Option<RealmId>,
        f: impl FnOnce(&mut Interpreter<'_>) -> R,
    ) -> R {
        let rt = self.lock();
        let realm = realm.unwrap_or_else(|| rt.utility_realm());
        let mut interp = Interpreter::new(&rt, realm);
        f(&mut interp)
    }

    /// Run an operation that may throw, routing the exception
    pub(crate) fn execute<R>(
        &self,
        realm: Option<RealmId>,
        f: impl FnOnce(&mut Interpreter<'_>) -> JsResult<R>,
    ) -> Option<R> {
        let rt = self.lock();
        let realm = realm.unwrap_or_else(|| rt.utility_realm());
        match rt.execute(realm, f) {
            Ok(result) => Some(result),
            Err(thrown) => {
                self.route(&rt, thrown);
                None
            }
        }
    }

    /// [`execute`](Self::execute) returning a value handle
    pub(crate) fn execute_value(
        &self,
        realm: Option<RealmId>,
        f: impl FnOnce(&mut Interpreter<'_>) -> JsResult<JSValue>,
    ) -> Option<Value> {
        let rt = self.lock();
        let realm = realm.unwrap_or_else(|| rt.utility_realm());
        match rt.execute(realm, f) {
            Ok(value) => Some(Value::from_raw(self, &rt, realm, value)),
            Err(thrown) => {
                self.route(&rt, thrown);
                None
            }
        }
    }

    // =========================================================================
    // Context registry
    // =========================================================================

    pub(crate) fn register_context(&self, realm: RealmId, context: &Arc<ContextInner>) {
        self.inner.contexts.lock().insert(realm, Arc::downgrade(context));
    }

    /// Drop the registry entry of a context that went away
    pub(crate) fn forget_context(&self, realm: RealmId) {
        let mut contexts = self.inner.contexts.lock();
        if contexts.get(&realm).is_some_and(|context| context.strong_count() == 0) {
            contexts.remove(&realm);
        }
    }

    /// Context owning `realm`
    ///
    /// Once the owning context is gone, handles to the realm share one
    /// borrowed context for as long as any of them lives.
    pub(crate) fn context_for(&self, realm: RealmId) -> Context {
        let mut contexts = self.inner.contexts.lock();
        if let Some(inner) = contexts.get(&realm).and_then(Weak::upgrade) {
            return Context::from_inner(inner);
        }
        let context = Context::borrowed(self, realm);
        contexts.insert(realm, context.downgrade());
        context
    }

    #[inline]
    pub(crate) fn ptr_eq(&self, other: &Engine) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::value::PropertyAttribute;
    use std::sync::mpsc;

    #[test]
    fn test_special_values_are_shared() {
        let engine = Engine::new();
        assert!(Value::ptr_eq(&engine.undefined(), &engine.undefined()));
        assert!(Value::ptr_eq(&engine.null(), &engine.null()));
        assert!(Value::ptr_eq(&engine.true_value(), &engine.boolean(true)));
        assert!(Value::ptr_eq(&engine.false_value(), &engine.boolean(false)));

        let context = engine.new_context(None);
        context.scope(|scope| {
            let value = scope.eval("undefined").unwrap();
            assert!(Value::ptr_eq(&value, &engine.undefined()));
            let value = scope.eval("1 > 2").unwrap();
            assert!(Value::ptr_eq(&value, &engine.false_value()));
        });
    }

    #[test]
    fn test_engines_are_isolated() {
        let a = Engine::new();
        let b = Engine::new();
        assert_ne!(a.id(), b.id());
        assert!(!Value::ptr_eq(&a.undefined(), &b.undefined()));
        assert!(Engine::default_engine().ptr_eq(&Engine::default_engine()));
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_uncaught_exception_reaches_listeners() {
        let engine = Engine::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let id = engine.add_message_listener(move |exception| {
            let _ = tx.lock().send(exception.clone());
        });

        let context = engine.new_context(None);
        let origin = ScriptOrigin::new("boom.js", 0, 0);
        let script = engine.compile("var a = 1;\nthrow new Error('boom');", Some(&origin), None).unwrap();
        assert!(script.run(&context).is_none());

        let exception = rx.try_recv().unwrap();
        assert_eq!(exception.message, "Error: boom");
        assert_eq!(exception.resource_name.as_deref(), Some("boom.js"));
        assert_eq!(exception.line, Some(2));

        assert!(engine.remove_message_listener(id));
        assert!(!engine.remove_message_listener(id));
        assert!(script.run(&context).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_compile_error_is_reported() {
        let engine = Engine::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        engine.add_message_listener(move |exception| {
            let _ = tx.lock().send(exception.clone());
        });

        let origin = ScriptOrigin::new("bad.js", 10, 0);
        assert!(engine.compile("var x = ;", Some(&origin), None).is_none());
        let exception = rx.try_recv().unwrap();
        assert!(exception.message.starts_with("SyntaxError: "));
        assert_eq!(exception.resource_name.as_deref(), Some("bad.js"));
        assert_eq!(exception.line, Some(11));
        assert_eq!(exception.source_line.as_deref(), Some("var x = ;"));
    }

    #[test]
    fn test_parse_json_without_context() {
        let engine = Engine::new();
        let value = engine.parse_json(r#"{"a": [1, 2]}"#).unwrap();
        let a = value.as_object().unwrap().get_property("a").unwrap();
        assert_eq!(a.as_array().unwrap().length(), 2);
        assert!(engine.parse_json("{bad").is_none());
    }

    #[test]
    fn test_dropped_context_is_collected() {
        let engine = Engine::new();
        let baseline = engine.heap_stats().contexts;
        {
            let context = engine.new_context(None);
            context.scope(|scope| {
                scope.eval("var items = []; for (var i = 0; i < 50; i++) items.push({ i: i });");
            });
            assert_eq!(engine.heap_stats().contexts, baseline + 1);
        }
        assert!(engine.collect_garbage() > 50);
        assert_eq!(engine.heap_stats().contexts, baseline);
    }

    #[test]
    fn test_release_while_engine_busy_is_queued() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel::<()>();
        let (entered_tx, resume_rx) = (Mutex::new(entered_tx), Mutex::new(resume_rx));
        let block = engine.new_function_template(move |_| {
            let _ = entered_tx.lock().send(());
            let _ = resume_rx.lock().recv();
        });
        context.scope(|scope| {
            let block = block.new_function(scope).unwrap();
            scope.global().set_property("block", &block, PropertyAttribute::NONE);
        });
        let value = context.scope(|scope| scope.eval("({ payload: 1 })").unwrap());
        let held = engine.heap_stats().handles;

        let runner = {
            let context = context.clone();
            thread::spawn(move || context.scope(|scope| scope.eval("block(); 7").map(|v| v.to_int32())))
        };
        entered_rx.recv().unwrap();
        drop(value);
        assert_eq!(engine.inner.releases.lock().len(), 1);

        resume_tx.send(()).unwrap();
        assert_eq!(runner.join().unwrap(), Some(7));
        assert_eq!(engine.heap_stats().handles, held - 1);
        assert!(engine.inner.releases.lock().is_empty());
    }

    #[test]
    fn test_orphaned_realm_shares_one_context() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let items = context.scope(|scope| scope.eval("[1, 2, 3]").unwrap());
        let realm = context.realm();
        drop(context);

        let a = engine.context_for(realm);
        let b = engine.context_for(realm);
        a.scope(|_| {
            assert!(b.is_entered());
            assert_eq!(b.try_scope(|_| ()).unwrap_err(), BridgeError::ScopeAlreadyEntered);
        });
        assert!(!b.is_entered());
        assert_eq!(b.scope(|scope| scope.eval("1 + 1").unwrap().to_int32()), 2);
        drop(items);
    }

    #[test]
    fn test_value_keeps_context_alive() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let items = context.scope(|scope| scope.eval("[1, 2, 3]").unwrap());
        let realms = engine.heap_stats().contexts;
        drop(context);
        engine.collect_garbage();
        assert_eq!(engine.heap_stats().contexts, realms);
        assert_eq!(items.as_array().unwrap().length(), 3);
        drop(items);
        engine.collect_garbage();
        assert_eq!(engine.heap_stats().contexts, realms - 1);
    }
}
