//! Host dispatch for template-backed functions and objects
//!
//! The interpreter only knows template ids. [`Bridge`] resolves them in the
//! engine's registries and runs the host closures with a [`ContextScope`]
//! for the calling context. An exception thrown by the host while the
//! callback runs is handed back to the interpreter when it returns, and a
//! panic becomes an `Error`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Weak;

use tracing::warn;

use crate::context::ContextScope;
use crate::engine::{Engine, EngineInner};
use crate::gc::ObjectId;
use crate::runtime::host::{AccessorCall, HostCall, HostDispatch, InterceptCall, InterceptOp};
use crate::runtime::{ErrorKind, HostData, JSValue, JsResult, PropertyKey};
use crate::template::object::{IndexedPropertyHandler, NamedPropertyHandler};
use crate::template::{FunctionCallbackInfo, PropertyCallbackInfo, ReturnValue};
use crate::value::{Function, Object, Value};
use crate::vm::Interpreter;

pub(crate) struct Bridge {
    engine: Weak<EngineInner>,
}

impl Bridge {
    pub(crate) fn new(engine: Weak<EngineInner>) -> Self {
        Bridge { engine }
    }

    fn engine(&self) -> Option<Engine> {
        self.engine.upgrade().map(|inner| Engine { inner })
    }
}

/// Run `f` as a host callback in the interpreter's current realm
fn invoke<R>(interp: &mut Interpreter<'_>, engine: &Engine, f: impl FnOnce(&ContextScope) -> R) -> JsResult<R> {
    let rt = interp.runtime();
    let scope = ContextScope::for_callback(engine.context_for(interp.realm()));
    let outer_pending = {
        let mut state = rt.state_mut();
        state.callback_depth += 1;
        state.pending.take()
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| f(&scope)));
    let pending = {
        let mut state = rt.state_mut();
        state.callback_depth -= 1;
        std::mem::replace(&mut state.pending, outer_pending)
    };
    drop(scope);

    match (result, pending) {
        (Ok(_), Some(thrown)) => Err(thrown),
        (Ok(result), None) => Ok(result),
        (Err(payload), _) => {
            let message = panic_message(payload.as_ref());
            warn!(engine = engine.id(), %message, "host callback panicked");
            interp.throw(ErrorKind::Error, format!("host callback panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}

/// Receiver and holder of a property callback
struct Site {
    this: Value,
    holder: Object,
}

impl Site {
    fn new(interp: &Interpreter<'_>, engine: &Engine, this: JSValue, holder: ObjectId) -> Self {
        let (rt, realm) = (interp.runtime(), interp.realm());
        Site {
            this: Value::from_raw(engine, rt, realm, this),
            holder: Object::from_id(engine, rt, realm, holder),
        }
    }
}

/// Run a property callback and return what it set
fn property_callback(
    interp: &mut Interpreter<'_>,
    engine: &Engine,
    site: Site,
    data: Option<&HostData>,
    f: impl FnOnce(&mut PropertyCallbackInfo<'_>),
) -> JsResult<Option<JSValue>> {
    invoke(interp, engine, |scope| {
        let mut info = PropertyCallbackInfo {
            scope,
            this: site.this,
            holder: site.holder,
            data,
            return_value: ReturnValue::default(),
        };
        f(&mut info);
        info.return_value.take()
    })
}

impl HostDispatch for Bridge {
    fn call(&self, interp: &mut Interpreter<'_>, call: HostCall<'_>) -> JsResult<Option<JSValue>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let callback = engine
            .inner
            .function_template(call.template)
            .and_then(|template| template.callback());
        let Some((callback, data)) = callback else {
            return Ok(None);
        };

        let (rt, realm) = (interp.runtime(), interp.realm());
        let args: Vec<Value> = call
            .args
            .iter()
            .map(|arg| Value::from_raw(&engine, rt, realm, arg.clone()))
            .collect();
        let this = Value::from_raw(&engine, rt, realm, call.this);
        let callee = Function::from_object(Object::from_id(&engine, rt, realm, call.callee));
        let construct = call.construct;

        invoke(interp, &engine, |scope| {
            let mut info = FunctionCallbackInfo {
                scope,
                args: &args,
                this,
                callee,
                data: data.as_ref(),
                construct,
                return_value: ReturnValue::default(),
            };
            callback(&mut info);
            info.return_value.take()
        })
    }

    fn accessor(&self, interp: &mut Interpreter<'_>, call: AccessorCall<'_>) -> JsResult<Option<JSValue>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let accessor = engine
            .inner
            .object_template(call.accessor.template)
            .and_then(|template| template.accessor(call.accessor.index));
        let Some(accessor) = accessor else {
            return Ok(None);
        };

        let name = call.key.to_js_string();
        let data = accessor.data.as_ref();
        match call.value {
            None => {
                let Some(getter) = &accessor.getter else {
                    return Ok(None);
                };
                let site = Site::new(interp, &engine, call.this, call.holder);
                property_callback(interp, &engine, site, data, |info| getter(name.as_str(), info))
            }
            Some(value) => {
                let Some(setter) = &accessor.setter else {
                    return Ok(None);
                };
                let value = Value::from_raw(&engine, interp.runtime(), interp.realm(), value);
                let site = Site::new(interp, &engine, call.this, call.holder);
                property_callback(interp, &engine, site, data, |info| setter(name.as_str(), &value, info))?;
                Ok(None)
            }
        }
    }

    fn intercept(&self, interp: &mut Interpreter<'_>, call: InterceptCall<'_>) -> JsResult<Option<JSValue>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let Some(template) = engine.inner.object_template(call.template) else {
            return Ok(None);
        };

        match (call.op, call.key) {
            (InterceptOp::Enumerate, _) => {
                let enumerators = [
                    template.indexed_handler().and_then(|h| h.enumerator.clone().map(|e| (e, h.data.clone()))),
                    template.named_handler().and_then(|h| h.enumerator.clone().map(|e| (e, h.data.clone()))),
                ];
                let mut lists = Vec::new();
                for (enumerator, data) in enumerators.into_iter().flatten() {
                    let site = Site::new(interp, &engine, call.this.clone(), call.holder);
                    if let Some(JSValue::Object(list)) =
                        property_callback(interp, &engine, site, data.as_ref(), |info| enumerator(info))?
                    {
                        lists.push(list);
                    }
                }
                if lists.len() < 2 {
                    return Ok(lists.pop().map(JSValue::Object));
                }
                let mut keys = Vec::new();
                for list in lists {
                    let length = interp.length_of(list)?;
                    for i in 0..length {
                        keys.push(interp.get(list, &PropertyKey::Index(i))?);
                    }
                }
                Ok(Some(JSValue::Object(interp.new_array(keys))))
            }
            (op, Some(key)) => {
                let site = Site::new(interp, &engine, call.this, call.holder);
                match key.as_index() {
                    Some(index) => match template.indexed_handler() {
                        Some(handler) => intercept_indexed(interp, &engine, &handler, index, op, site),
                        None => Ok(None),
                    },
                    None => match template.named_handler() {
                        Some(handler) => {
                            let name = key.to_js_string();
                            intercept_named(interp, &engine, &handler, name.as_str(), op, site)
                        }
                        None => Ok(None),
                    },
                }
            }
            (_, None) => Ok(None),
        }
    }

    fn init_instance(&self, interp: &mut Interpreter<'_>, template: u64, instance: ObjectId) -> JsResult<()> {
        let snapshot = self
            .engine()
            .and_then(|engine| engine.inner.function_template(template))
            .and_then(|template| template.instance_snapshot());
        if let Some(snapshot) = snapshot {
            snapshot.apply(interp, instance);
        }
        Ok(())
    }
}

fn intercept_named(
    interp: &mut Interpreter<'_>,
    engine: &Engine,
    handler: &NamedPropertyHandler,
    name: &str,
    op: InterceptOp,
    site: Site,
) -> JsResult<Option<JSValue>> {
    let data = handler.data.as_ref();
    let callback = match op {
        InterceptOp::Get => &handler.getter,
        InterceptOp::Query => &handler.query,
        InterceptOp::Delete => &handler.deleter,
        InterceptOp::Set(value) => {
            let Some(setter) = &handler.setter else {
                return Ok(None);
            };
            let value = Value::from_raw(engine, interp.runtime(), interp.realm(), value);
            return property_callback(interp, engine, site, data, |info| setter(name, &value, info));
        }
        InterceptOp::Enumerate => return Ok(None),
    };
    match callback {
        Some(callback) => property_callback(interp, engine, site, data, |info| callback(name, info)),
        None => Ok(None),
    }
}

fn intercept_indexed(
    interp: &mut Interpreter<'_>,
    engine: &Engine,
    handler: &IndexedPropertyHandler,
    index: u32,
    op: InterceptOp,
    site: Site,
) -> JsResult<Option<JSValue>> {
    let data = handler.data.as_ref();
    let callback = match op {
        InterceptOp::Get => &handler.getter,
        InterceptOp::Query => &handler.query,
        InterceptOp::Delete => &handler.deleter,
        InterceptOp::Set(value) => {
            let Some(setter) = &handler.setter else {
                return Ok(None);
            };
            let value = Value::from_raw(engine, interp.runtime(), interp.realm(), value);
            return property_callback(interp, engine, site, data, |info| setter(index, &value, info));
        }
        InterceptOp::Enumerate => return Ok(None),
    };
    match callback {
        Some(callback) => property_callback(interp, engine, site, data, |info| callback(index, info)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(3u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn test_dropped_engine_dispatches_nothing() {
        let bridge = Bridge::new(Weak::new());
        assert!(bridge.engine().is_none());
    }

    #[test]
    fn test_enumerators_are_merged() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_named_property_handler(NamedPropertyHandler::new().enumerator(|info| {
            let scope = info.current_scope();
            let names = scope.new_array(1);
            names.set_element(0, &scope.new_string("name"));
            info.return_value().set(&names);
        }));
        template.set_indexed_property_handler(IndexedPropertyHandler::new().enumerator(|info| {
            let scope = info.current_scope();
            let indices = scope.new_array(1);
            indices.set_element(0, &scope.new_integer(0));
            info.return_value().set(&indices);
        }));
        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            scope.global().set_property("o", &object, crate::PropertyAttribute::NONE);
            assert_eq!(scope.eval("Object.keys(o).join()").unwrap().to_string(), "0,name");
        });
    }
}
