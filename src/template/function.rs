//! Function templates

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::context::ContextScope;
use crate::engine::Engine;
use crate::error::BridgeError;
use crate::gc::ObjectId;
use crate::runtime::{ClassId, FunctionKind, HostData, JSObject, JSValue, ObjectData, PropertyFlags};
use crate::template::object::{ObjectTemplateInner, TemplateSnapshot};
use crate::template::{FunctionCallback, ObjectTemplate};
use crate::value::{Function, Object};
use crate::vm::Interpreter;

struct FunctionTemplateState {
    disposed: bool,
    callback: Option<FunctionCallback>,
    data: Option<HostData>,
    class_name: Option<String>,
    instance_template: Arc<ObjectTemplateInner>,
    prototype_template: Arc<ObjectTemplateInner>,
}

/// Registry entry of a function template, looked up by the bridge
pub(crate) struct FunctionTemplateInner {
    pub(crate) id: u64,
    state: Mutex<FunctionTemplateState>,
}

impl FunctionTemplateInner {
    /// Callback and data; `None` when disposed or created without a callback
    pub(crate) fn callback(&self) -> Option<(FunctionCallback, Option<HostData>)> {
        let state = self.state.lock();
        if state.disposed {
            return None;
        }
        let callback = state.callback.clone()?;
        Some((callback, state.data.clone()))
    }

    /// Shape of instances created with `new`
    pub(crate) fn instance_snapshot(&self) -> Option<TemplateSnapshot> {
        let instance = {
            let state = self.state.lock();
            if state.disposed {
                return None;
            }
            state.instance_template.clone()
        };
        instance.snapshot()
    }
}

/// Blueprint for host functions
///
/// Each context gets one function object per template, created on first
/// use and returned again afterwards. Calling it with `new` creates an
/// object shaped by the [instance template](Self::instance_template) whose
/// prototype is shaped by the [prototype template](Self::prototype_template).
#[derive(Clone)]
pub struct FunctionTemplate {
    inner: Arc<FunctionTemplateInner>,
    engine: Engine,
}

impl FunctionTemplate {
    pub(crate) fn new(engine: &Engine, callback: Option<FunctionCallback>, data: Option<HostData>) -> Self {
        let instance_template = ObjectTemplate::new(engine).inner().clone();
        let prototype_template = ObjectTemplate::new(engine).inner().clone();
        let inner = Arc::new(FunctionTemplateInner {
            id: engine.next_template_id(),
            state: Mutex::new(FunctionTemplateState {
                disposed: false,
                callback,
                data,
                class_name: None,
                instance_template,
                prototype_template,
            }),
        });
        engine.inner.function_templates.lock().insert(inner.id, inner.clone());
        FunctionTemplate {
            inner,
            engine: engine.clone(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The function in the scope's context; `None` once disposed
    pub fn new_function(&self, scope: &ContextScope) -> Option<Function> {
        let engine = scope.engine();
        let realm = scope.context().realm();
        engine.with_interpreter(Some(realm), |interp| {
            let id = self.function_in(interp)?;
            let object = Object::from_id(engine, interp.runtime(), realm, id);
            Some(Function::from_object(object))
        })
    }

    fn function_in(&self, interp: &mut Interpreter<'_>) -> Option<ObjectId> {
        let (class_name, prototype_template) = {
            let state = self.inner.state.lock();
            if state.disposed {
                return None;
            }
            (state.class_name.clone(), state.prototype_template.clone())
        };

        let rt = interp.runtime();
        let realm = interp.realm();
        let cached = rt.heap().realm(realm).host_functions.get(&self.inner.id).copied();
        if let Some(function) = cached {
            return Some(function);
        }

        let function_prototype = interp.intrinsics().function_prototype;
        let mut object = JSObject::with_data(
            ClassId::Function,
            Some(function_prototype),
            ObjectData::Function(FunctionKind::Host { template: self.inner.id }),
        );
        object.realm = Some(realm);
        let hidden = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM;
        object.define_value("length".into(), JSValue::from(0), hidden);
        object.define_value(
            "name".into(),
            JSValue::string(class_name.as_deref().unwrap_or_default()),
            hidden,
        );
        let function = interp.alloc(object);
        rt.heap_mut().realm_mut(realm).host_functions.insert(self.inner.id, function);

        let prototype = interp.new_object();
        if let Some(snapshot) = prototype_template.snapshot() {
            snapshot.apply(interp, prototype);
        }
        interp.define_own(prototype, "constructor".into(), JSValue::Object(function), PropertyFlags::DONT_ENUM);
        interp.define_own(
            function,
            "prototype".into(),
            JSValue::Object(prototype),
            PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE,
        );
        debug!(template = self.inner.id, realm = realm.0, "created host function");
        Some(function)
    }

    /// Name of the function, also reported by `Object.prototype.toString`
    /// for its instances
    ///
    /// Applies to functions created after the call.
    pub fn set_class_name(&self, name: &str) {
        let mut state = self.inner.state.lock();
        if state.disposed {
            panic!("{}", BridgeError::TemplateDisposed);
        }
        state.class_name = Some(name.to_string());
        state.instance_template.set_class_name(Some(name.to_string()));
    }

    /// Template for objects created by calling the function with `new`
    pub fn instance_template(&self) -> ObjectTemplate {
        let inner = self.inner.state.lock().instance_template.clone();
        ObjectTemplate::from_inner(&self.engine, inner)
    }

    /// Template for the function's `prototype` object
    pub fn prototype_template(&self) -> ObjectTemplate {
        let inner = self.inner.state.lock().prototype_template.clone();
        ObjectTemplate::from_inner(&self.engine, inner)
    }

    /// Unregister the template together with its instance and prototype
    /// templates
    ///
    /// Functions already created stay callable and return `undefined`.
    pub fn dispose(&self) {
        let (callback, data, instance, prototype) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (
                state.callback.take(),
                state.data.take(),
                state.instance_template.clone(),
                state.prototype_template.clone(),
            )
        };
        drop((callback, data));
        self.engine.inner.function_templates.lock().remove(&self.inner.id);
        ObjectTemplate::from_inner(&self.engine, instance).dispose();
        ObjectTemplate::from_inner(&self.engine, prototype).dispose();
        if self.engine.inner.tracing_dispose() {
            debug!(target: "mqjs_bridge::dispose", template = self.inner.id, "dispose function template");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }
}

impl fmt::Debug for FunctionTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTemplate").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::template::Accessor;
    use crate::value::PropertyAttribute;

    #[test]
    fn test_call_from_script() {
        let engine = Engine::new();
        let sum = engine.new_function_template(|info| {
            let total: f64 = info.args().iter().map(|arg| arg.to_number()).sum();
            info.return_value().set_number(total);
        });
        let context = engine.new_context(None);
        context.scope(|scope| {
            let function = sum.new_function(scope).unwrap();
            scope.global().set_property("sum", &function, PropertyAttribute::NONE);
            assert_eq!(scope.eval("sum(1, 2, 3.5)").unwrap().to_number(), 6.5);
            assert_eq!(scope.eval("sum()").unwrap().to_number(), 0.0);
            assert!(scope.eval("typeof sum === 'function'").unwrap().is_true());
        });
    }

    #[test]
    fn test_call_from_host() {
        let engine = Engine::new();
        let describe = engine.new_function_template_with_data(
            |info| {
                let prefix = info.data_as::<&str>().copied().unwrap_or("?");
                let text = format!("{}:{}:{}", prefix, info.length(), info.get(5).is_undefined());
                info.return_value().set_string(&text);
            },
            Arc::new("tag"),
        );
        let context = engine.new_context(None);
        context.scope(|scope| {
            let function = describe.new_function(scope).unwrap();
            let result = function.call(&[scope.new_integer(1), scope.new_integer(2)]).unwrap();
            assert_eq!(result.to_string(), "tag:2:true");
        });
    }

    #[test]
    fn test_one_function_per_context() {
        let engine = Engine::new();
        let template = engine.new_empty_function_template();
        let a = engine.new_context(None);
        let b = engine.new_context(None);
        let (fa1, fa2) = a.scope(|scope| (template.new_function(scope).unwrap(), template.new_function(scope).unwrap()));
        let fb = b.scope(|scope| template.new_function(scope).unwrap());
        assert!(fa1.strict_equals(&fa2));
        assert!(!fa1.strict_equals(&fb));
        assert!(fa1.call(&[]).unwrap().is_undefined());
    }

    #[test]
    fn test_construct_with_templates() {
        let engine = Engine::new();
        let point = engine.new_function_template(|info| {
            if !info.is_construct_call() {
                info.current_scope().throw_exception("Point must be called with new");
                return;
            }
            let this = info.this().as_object().unwrap();
            this.set_property("x", &info.get(0), PropertyAttribute::NONE);
            this.set_property("y", &info.get(1), PropertyAttribute::NONE);
        });
        point.set_class_name("Point");
        point.instance_template().set_internal_field_count(1);
        point.instance_template().set_accessor(
            "kind",
            Accessor::new().getter(|_, info| info.return_value().set_string("point")),
        );
        let norm = engine.new_function_template(|info| {
            let this = info.this().as_object().unwrap();
            let x = this.get_property("x").map_or(0.0, |v| v.to_number());
            let y = this.get_property("y").map_or(0.0, |v| v.to_number());
            info.return_value().set_number(x.abs() + y.abs());
        });

        let context = engine.new_context(None);
        context.scope(|scope| {
            let norm = norm.new_function(scope).unwrap();
            point.prototype_template().set_property("norm", &norm, PropertyAttribute::DONT_ENUM);
            let constructor = point.new_function(scope).unwrap();
            scope.global().set_property("Point", &constructor, PropertyAttribute::NONE);

            assert_eq!(scope.eval("new Point(3, -4).norm()").unwrap().to_number(), 7.0);
            assert_eq!(scope.eval("new Point(1, 2).kind").unwrap().to_string(), "point");
            assert!(scope.eval("new Point(1, 2) instanceof Point").unwrap().is_true());
            assert!(scope.eval("Point.prototype.constructor === Point").unwrap().is_true());
            assert_eq!(scope.eval("Point.name").unwrap().to_string(), "Point");
            assert_eq!(
                scope.eval("Object.prototype.toString.call(new Point(0, 0))").unwrap().to_string(),
                "[object Point]"
            );

            let instance = constructor.new_instance(&[scope.new_integer(5), scope.new_integer(6)]).unwrap();
            assert_eq!(instance.internal_field_count(), 1);
            assert_eq!(instance.get_property("y").unwrap().to_int32(), 6);

            let message = scope.try_catch(false, |scope| {
                scope.eval("Point(1, 2)");
            });
            assert_eq!(message, "Error: Point must be called with new");
        });
    }

    #[test]
    fn test_construct_result_replaces_instance() {
        let engine = Engine::new();
        let factory = engine.new_function_template(|info| {
            let replacement = info.current_scope().new_object();
            replacement.set_property("made", &info.current_scope().new_boolean(true), PropertyAttribute::NONE);
            info.return_value().set(&replacement);
        });
        let context = engine.new_context(None);
        context.scope(|scope| {
            let factory = factory.new_function(scope).unwrap();
            scope.global().set_property("Factory", &factory, PropertyAttribute::NONE);
            assert!(scope.eval("new Factory().made").unwrap().is_true());
            assert!(scope.eval("new Factory() instanceof Factory").unwrap().is_false());
        });
    }

    #[test]
    fn test_exception_from_callback_reaches_script() {
        let engine = Engine::new();
        let fail = engine.new_function_template(|info| info.current_scope().throw_exception("nope"));
        let context = engine.new_context(None);
        context.scope(|scope| {
            let fail = fail.new_function(scope).unwrap();
            scope.global().set_property("fail", &fail, PropertyAttribute::NONE);
            let caught = scope.eval("try { fail(); 'no' } catch (e) { e.message }").unwrap();
            assert_eq!(caught.to_string(), "nope");
            let message = scope.try_catch(false, |scope| {
                scope.eval("fail()");
            });
            assert_eq!(message, "Error: nope");
        });
    }

    #[test]
    fn test_try_catch_inside_callback() {
        let engine = Engine::new();
        let probe = engine.new_function_template(|info| {
            let message = info.current_scope().try_catch(false, |scope| {
                scope.eval("null.field");
            });
            info.return_value().set_string(&message);
        });
        let context = engine.new_context(None);
        context.scope(|scope| {
            let probe = probe.new_function(scope).unwrap();
            scope.global().set_property("probe", &probe, PropertyAttribute::NONE);
            let result = scope.eval("probe()").unwrap().to_string();
            assert!(result.starts_with("TypeError"), "{}", result);
        });
    }

    #[test]
    fn test_reentrant_callback() {
        let engine = Engine::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let twice = engine.new_function_template(move |info| {
            counter.fetch_add(1, Ordering::SeqCst);
            let inner = info.current_scope().eval("base * 2").map_or(0, |v| v.to_int32());
            info.return_value().set_int32(inner);
        });
        let context = engine.new_context(None);
        context.scope(|scope| {
            let twice = twice.new_function(scope).unwrap();
            scope.global().set_property("twice", &twice, PropertyAttribute::NONE);
            assert_eq!(scope.eval("var base = 21; twice()").unwrap().to_int32(), 42);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_becomes_exception() {
        let engine = Engine::new();
        let boom = engine.new_function_template(|_| panic!("boom"));
        let context = engine.new_context(None);
        context.scope(|scope| {
            let boom = boom.new_function(scope).unwrap();
            scope.global().set_property("boom", &boom, PropertyAttribute::NONE);
            let message = scope.try_catch(false, |scope| {
                scope.eval("boom()");
            });
            assert!(message.contains("boom"), "{}", message);
            assert_eq!(scope.eval("1 + 1").unwrap().to_int32(), 2);
        });
    }

    #[test]
    fn test_dispose() {
        let engine = Engine::new();
        let template = engine.new_function_template(|info| info.return_value().set_int32(1));
        let instance = template.instance_template();
        let context = engine.new_context(None);
        let function = context.scope(|scope| template.new_function(scope)).unwrap();
        assert_eq!(function.call(&[]).unwrap().to_int32(), 1);

        template.dispose();
        template.dispose();
        assert!(template.is_disposed());
        assert!(instance.is_disposed());
        assert!(engine.inner.function_template(template.id()).is_none());
        assert!(function.call(&[]).unwrap().is_undefined());
        assert!(context.scope(|scope| template.new_function(scope)).is_none());
    }
}
