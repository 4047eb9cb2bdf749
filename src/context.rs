//! Contexts and scopes
//!
//! A [`Context`] owns one realm: a global object with its own set of
//! builtins. Contexts of the same engine share the heap, so values can be
//! passed between them, but their globals are separate.
//!
//! Most work happens inside [`Context::scope`], which marks the context as
//! entered for the duration of a closure and hands it a [`ContextScope`]
//! with the value factories. A context can be entered by one scope at a
//! time.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::error::BridgeError;
use crate::gc::{ObjectId, RealmId};
use crate::handle::PendingRelease;
use crate::runtime::array::MAX_ARRAY_GROWTH;
use crate::runtime::{ClassId, ErrorKind, HostData, JSObject, JSValue, ObjectData};
use crate::script::{Script, ScriptData, ScriptOrigin};
use crate::value::{Array, Object, RegExp, RegExpFlags, Value};
use crate::vm::Interpreter;

thread_local! {
    /// Contexts entered on this thread, innermost last
    static CURRENT: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct ContextInner {
    engine: Engine,
    realm: RealmId,
    /// Whether dropping this handle releases the realm
    owned: bool,
    entered: Mutex<bool>,
    private_data: Mutex<Option<HostData>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if self.engine.inner.tracing_dispose() {
            debug!(target: "mqjs_bridge::dispose", realm = self.realm.0, "dispose context");
        }
        self.engine.forget_context(self.realm);
        self.engine.inner.release(PendingRelease::Context(self.realm));
    }
}

/// A script execution environment with its own global object
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn new(engine: &Engine, global_template: Option<&crate::ObjectTemplate>) -> Context {
        let snapshot = global_template.and_then(|template| template.snapshot());
        let realm = engine.with_runtime(|rt| rt.create_realm());
        if let Some(snapshot) = snapshot {
            engine.with_interpreter(Some(realm), |interp| {
                let global = interp.global();
                snapshot.apply(interp, global);
            });
        }
        let inner = Arc::new(ContextInner {
            engine: engine.clone(),
            realm,
            owned: true,
            entered: Mutex::new(false),
            private_data: Mutex::new(None),
        });
        engine.register_context(realm, &inner);
        debug!(engine = engine.id(), realm = realm.0, "created context");
        Context { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Context {
        Context { inner }
    }

    /// Handle to a realm whose owning context is gone; does not release it
    pub(crate) fn borrowed(engine: &Engine, realm: RealmId) -> Context {
        Context {
            inner: Arc::new(ContextInner {
                engine: engine.clone(),
                realm,
                owned: false,
                entered: Mutex::new(false),
                private_data: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    /// Innermost context entered on this thread
    pub fn current() -> Option<Context> {
        CURRENT.with(|current| current.borrow().last().cloned())
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    #[inline]
    pub(crate) fn realm(&self) -> RealmId {
        self.inner.realm
    }

    /// Run `f` with the context entered
    ///
    /// # Panics
    ///
    /// Panics if the context is already entered; see [`try_scope`](Self::try_scope).
    pub fn scope<R>(&self, f: impl FnOnce(&ContextScope) -> R) -> R {
        match self.try_scope(f) {
            Ok(result) => result,
            Err(error) => panic!("{}", error),
        }
    }

    /// Run `f` with the context entered, unless it already is
    pub fn try_scope<R>(&self, f: impl FnOnce(&ContextScope) -> R) -> Result<R, BridgeError> {
        {
            let mut entered = self.inner.entered.lock();
            if *entered {
                return Err(BridgeError::ScopeAlreadyEntered);
            }
            *entered = true;
        }
        let _exit = ExitGuard(&self.inner.entered);
        trace!(realm = self.inner.realm.0, "enter context");
        let scope = ContextScope::new(self.clone());
        let result = f(&scope);
        drop(scope);
        trace!(realm = self.inner.realm.0, "exit context");
        Ok(result)
    }

    /// Whether a scope is currently open on this context
    pub fn is_entered(&self) -> bool {
        *self.inner.entered.lock()
    }

    /// Attach host data to the context
    pub fn set_private_data(&self, data: Option<HostData>) {
        *self.inner.private_data.lock() = data;
    }

    pub fn private_data(&self) -> Option<HostData> {
        self.inner.private_data.lock().clone()
    }

    /// Compile `code`; syntax errors are reported as in [`Engine::compile`]
    pub fn compile(&self, code: &str, origin: Option<&ScriptOrigin>, data: Option<&ScriptData>) -> Option<Script> {
        self.engine().compile_in(code, origin, data, Some(self.realm()))
    }

    /// Whether both handles refer to the same context
    pub fn ptr_eq(&self, other: &Context) -> bool {
        self.inner.realm == other.inner.realm && self.inner.engine.ptr_eq(&other.inner.engine)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("engine", &self.inner.engine.id())
            .field("realm", &self.inner.realm)
            .finish()
    }
}

struct ExitGuard<'a>(&'a Mutex<bool>);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = false;
    }
}

// =============================================================================
// Scopes
// =============================================================================

/// An entered context
///
/// Values created through a scope belong to its context. The scope also
/// keeps host objects alive until it ends, see [`keep_alive`](Self::keep_alive).
pub struct ContextScope {
    context: Context,
    kept: RefCell<Vec<Option<Box<dyn Any>>>>,
}

impl ContextScope {
    fn new(context: Context) -> ContextScope {
        CURRENT.with(|current| current.borrow_mut().push(context.clone()));
        ContextScope {
            context,
            kept: RefCell::new(Vec::new()),
        }
    }

    /// Scope for a host callback running in `context`; does not mark the
    /// context as entered
    pub(crate) fn for_callback(context: Context) -> ContextScope {
        ContextScope::new(context)
    }

    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        self.context.engine()
    }

    #[inline]
    fn realm(&self) -> RealmId {
        self.context.realm()
    }

    // =========================================================================
    // Scripts
    // =========================================================================

    /// Compile and run `code`
    pub fn eval(&self, code: &str) -> Option<Value> {
        let script = self.context.compile(code, None, None)?;
        self.run(&script)
    }

    pub fn run(&self, script: &Script) -> Option<Value> {
        script.run(&self.context)
    }

    /// Compile `code` with an origin and optional precompiled data
    pub fn compile(&self, code: &str, origin: Option<&ScriptOrigin>, data: Option<&ScriptData>) -> Option<Script> {
        self.context.compile(code, origin, data)
    }

    // =========================================================================
    // Exceptions
    // =========================================================================

    /// Run `f`, catching exceptions from the operations it performs
    ///
    /// Returns an empty string when nothing was thrown, otherwise the
    /// exception message, or with `detailed` the full report with location
    /// and stack trace.
    pub fn try_catch(&self, detailed: bool, f: impl FnOnce(&ContextScope)) -> String {
        let engine = self.engine();
        engine.open_try_catch();
        let guard = TryCatchGuard { engine, closed: false };
        f(self);
        match guard.close() {
            None => String::new(),
            Some(exception) if detailed => exception.detailed(),
            Some(exception) => exception.to_string(),
        }
    }

    /// Throw an `Error` with `message`
    ///
    /// Inside a host callback the error propagates into the calling script
    /// once the callback returns.
    pub fn throw_exception(&self, message: &str) {
        let engine = self.engine();
        let rt = engine.lock();
        if let Err(thrown) = rt.execute(self.realm(), |interp| interp.throw::<()>(ErrorKind::Error, message)) {
            engine.route(&rt, thrown);
        }
    }

    // =========================================================================
    // Factories
    // =========================================================================

    pub fn new_number(&self, n: f64) -> Value {
        Value::primitive(self.engine(), JSValue::Number(n))
    }

    pub fn new_integer(&self, n: i32) -> Value {
        Value::primitive(self.engine(), JSValue::from(n))
    }

    pub fn new_string(&self, s: &str) -> Value {
        Value::primitive(self.engine(), JSValue::string(s))
    }

    pub fn new_boolean(&self, b: bool) -> Value {
        self.engine().boolean(b)
    }

    pub fn undefined(&self) -> Value {
        self.engine().undefined()
    }

    pub fn null(&self) -> Value {
        self.engine().null()
    }

    fn new_object_with(&self, f: impl FnOnce(&mut Interpreter<'_>) -> ObjectId) -> Object {
        let engine = self.engine();
        let realm = self.realm();
        engine.with_interpreter(Some(realm), |interp| {
            let id = f(interp);
            Object::from_id(engine, interp.runtime(), realm, id)
        })
    }

    pub fn new_object(&self) -> Object {
        self.new_object_with(|interp| interp.new_object())
    }

    /// Array of `length` undefined elements
    ///
    /// # Panics
    ///
    /// Panics if `length` exceeds [`MAX_ARRAY_GROWTH`]; see
    /// [`try_new_array`](Self::try_new_array).
    pub fn new_array(&self, length: usize) -> Array {
        match self.try_new_array(length) {
            Ok(array) => array,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_new_array(&self, length: usize) -> Result<Array, BridgeError> {
        if length > MAX_ARRAY_GROWTH as usize {
            return Err(BridgeError::ArrayTooLong);
        }
        Ok(Array::from_object(
            self.new_object_with(|interp| interp.new_array(vec![JSValue::Undefined; length])),
        ))
    }

    /// `None` when the pattern does not compile; the SyntaxError is reported
    pub fn new_regexp(&self, pattern: &str, flags: RegExpFlags) -> Option<RegExp> {
        let flags = flags.to_flag_string();
        self.engine()
            .execute_value(Some(self.realm()), |interp| {
                interp.new_regexp(pattern, &flags).map(JSValue::Object)
            })?
            .as_regexp()
    }

    /// Object wrapping opaque host data
    pub fn new_external(&self, data: HostData) -> Value {
        let object = self.new_object_with(|interp| {
            let proto = interp.intrinsics().object_prototype;
            interp.alloc(JSObject::with_data(ClassId::External, Some(proto), ObjectData::External(data)))
        });
        object.into_value()
    }

    /// The context's global object
    pub fn global(&self) -> Object {
        self.new_object_with(|interp| interp.global())
    }

    /// Parse JSON text into a value of this context
    pub fn parse_json(&self, text: &str) -> Option<Value> {
        self.engine()
            .execute_value(Some(self.realm()), |interp| crate::builtins::json::parse(interp, text))
    }

    // =========================================================================
    // Host object lifetime
    // =========================================================================

    /// Keep `value` alive until the scope ends; returns its slot
    pub fn keep_alive<T: Any>(&self, value: T) -> usize {
        let mut kept = self.kept.borrow_mut();
        kept.push(Some(Box::new(value)));
        kept.len() - 1
    }

    /// Drop a kept value before the scope ends
    pub fn release_kept(&self, slot: usize) -> bool {
        let taken = self.kept.borrow_mut().get_mut(slot).and_then(Option::take);
        taken.is_some()
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|current| current.borrow_mut().pop());
    }
}

struct TryCatchGuard<'a> {
    engine: &'a Engine,
    closed: bool,
}

impl TryCatchGuard<'_> {
    fn close(mut self) -> Option<crate::Exception> {
        self.closed = true;
        self.engine.close_try_catch()
    }
}

impl Drop for TryCatchGuard<'_> {
    fn drop(&mut self) {
        if !self.closed {
            self.engine.close_try_catch();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_eval() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let value = context.scope(|scope| scope.eval("'Hello ' + 'World!'")).unwrap();
        assert_eq!(value.to_string(), "Hello World!");
    }

    #[test]
    fn test_globals_are_per_context() {
        let engine = Engine::new();
        let a = engine.new_context(None);
        let b = engine.new_context(None);
        a.scope(|scope| scope.eval("var shared = 1"));
        let kind = b.scope(|scope| scope.eval("typeof shared")).unwrap();
        assert_eq!(kind.to_string(), "undefined");

        // Values move between contexts of one engine
        let object = a.scope(|scope| scope.eval("({ n: 2 })")).unwrap();
        b.scope(|scope| {
            scope.global().set_property("fromA", &object, crate::PropertyAttribute::NONE);
            assert_eq!(scope.eval("fromA.n * 2").unwrap().to_int32(), 4);
        });
    }

    #[test]
    fn test_scope_is_exclusive() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|_| {
            assert!(context.is_entered());
            assert_eq!(context.try_scope(|_| ()).unwrap_err(), BridgeError::ScopeAlreadyEntered);
        });
        assert!(!context.is_entered());
        assert!(context.try_scope(|_| ()).is_ok());
    }

    #[test]
    #[should_panic(expected = "context scope is already entered")]
    fn test_nested_scope_panics() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|_| context.scope(|_| ()));
    }

    #[test]
    fn test_scope_exit_on_panic() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            context.scope(|_| panic!("inside"));
        }));
        assert!(result.is_err());
        assert!(!context.is_entered());
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_current_context() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        assert!(Context::current().is_none());
        context.scope(|_| {
            assert!(Context::current().unwrap().ptr_eq(&context));
        });
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_try_catch() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let message = scope.try_catch(false, |scope| {
                assert!(scope.eval("null.x").is_none());
            });
            assert!(message.starts_with("TypeError: "), "{}", message);

            assert_eq!(scope.try_catch(false, |scope| {
                scope.eval("1 + 1");
            }), "");

            let origin = ScriptOrigin::new("test.js", 0, 0);
            let detailed = scope.try_catch(true, |scope| {
                let script = scope.compile("var a = 1;\nthrow new Error('boom');", Some(&origin), None).unwrap();
                scope.run(&script);
            });
            assert!(detailed.starts_with("test.js:2: Error: boom\n"), "{}", detailed);
            assert!(detailed.contains("throw new Error('boom');"));
            assert!(detailed.contains("at test.js:2:1"));
        });
    }

    #[test]
    fn test_nested_try_catch() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let mut inner = String::new();
            let outer = scope.try_catch(false, |scope| {
                inner = scope.try_catch(false, |scope| {
                    scope.eval("throw new RangeError('inner')");
                });
                scope.eval("throw 'outer'");
            });
            assert_eq!(inner, "RangeError: inner");
            assert_eq!(outer, "outer");
        });
    }

    #[test]
    fn test_throw_exception() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let message = scope.try_catch(false, |scope| scope.throw_exception("custom failure"));
            assert_eq!(message, "Error: custom failure");
        });
    }

    #[test]
    fn test_factories() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            assert_eq!(scope.new_number(1.5).to_number(), 1.5);
            assert_eq!(scope.new_integer(-3).to_int32(), -3);
            assert_eq!(scope.new_string("s").to_string(), "s");
            assert!(Value::ptr_eq(&scope.new_boolean(true), &engine.true_value()));
            assert!(scope.new_object().is_object());
            assert_eq!(scope.new_array(3).length(), 3);
            assert!(scope.global().get_property("Math").unwrap().is_object());
        });
    }

    #[test]
    fn test_array_length_limit() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            assert_eq!(scope.try_new_array(0).unwrap().length(), 0);
            assert_eq!(scope.try_new_array(usize::MAX).unwrap_err(), BridgeError::ArrayTooLong);
            // Would wrap to 3 as a u32
            assert_eq!(scope.try_new_array((1 << 32) + 3).unwrap_err(), BridgeError::ArrayTooLong);
        });
    }

    #[test]
    #[should_panic(expected = "array length is too large")]
    fn test_new_array_too_long_panics() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            scope.new_array(MAX_ARRAY_GROWTH as usize + 1);
        });
    }

    #[test]
    fn test_external() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let external = scope.new_external(Arc::new(42u64));
            assert!(external.is_external());
            let data = external.external_data().unwrap();
            assert_eq!(data.downcast_ref::<u64>(), Some(&42));
            scope.global().set_property("ext", &external, crate::PropertyAttribute::NONE);
            assert_eq!(scope.eval("typeof ext").unwrap().to_string(), "object");
            assert!(scope.new_object().external_data().is_none());
        });
    }

    #[test]
    fn test_private_data() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        assert!(context.private_data().is_none());
        context.set_private_data(Some(Arc::new(String::from("tag"))));
        let data = context.private_data().unwrap();
        assert_eq!(data.downcast_ref::<String>().map(String::as_str), Some("tag"));
    }

    #[test]
    fn test_keep_alive() {
        struct Flag(Arc<Mutex<bool>>);
        impl Drop for Flag {
            fn drop(&mut self) {
                *self.0.lock() = true;
            }
        }

        let engine = Engine::new();
        let context = engine.new_context(None);
        let early = Arc::new(Mutex::new(false));
        let late = Arc::new(Mutex::new(false));
        context.scope(|scope| {
            let slot = scope.keep_alive(Flag(early.clone()));
            scope.keep_alive(Flag(late.clone()));
            assert!(scope.release_kept(slot));
            assert!(!scope.release_kept(slot));
            assert!(*early.lock());
            assert!(!*late.lock());
        });
        assert!(*late.lock());
    }

    #[test]
    fn test_parse_json() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let value = scope.parse_json(r#"{"list": [1, 2, 3]}"#).unwrap();
            scope.global().set_property("parsed", &value, crate::PropertyAttribute::NONE);
            assert_eq!(scope.eval("parsed.list.length").unwrap().to_int32(), 3);
            let message = scope.try_catch(false, |scope| {
                assert!(scope.parse_json("[1,").is_none());
            });
            assert!(message.starts_with("SyntaxError: "));
        });
    }

    #[test]
    fn test_shared_context_across_threads() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| scope.eval("var counter = 0"));
        let script = engine.compile("counter += 1", None, None).unwrap();

        let (tx, rx) = mpsc::channel();
        for _ in 0..100 {
            let context = context.clone();
            let script = script.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                let _ = tx.send(script.run(&context).is_some());
            });
        }
        drop(tx);
        assert_eq!(rx.iter().filter(|ok| *ok).count(), 100);
        let counter = context.scope(|scope| scope.eval("counter")).unwrap();
        assert_eq!(counter.to_int32(), 100);
    }
}
