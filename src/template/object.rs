//! Object templates

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::context::ContextScope;
use crate::engine::Engine;
use crate::error::BridgeError;
use crate::gc::ObjectId;
use crate::runtime::property::{HostAccessor, Property, PropertySlot};
use crate::runtime::{HostData, JSString, JSValue, PropertyKey};
use crate::template::{
    AccessorGetter, AccessorSetter, EnumeratorCallback, IndexedCallback, IndexedSetter, NamedCallback, NamedSetter,
    PropertyCallbackInfo,
};
use crate::value::{Object, PropertyAttribute, Value, ValueCore};
use crate::vm::Interpreter;

/// Host getter and setter for one property
#[derive(Clone)]
pub struct Accessor {
    pub(crate) getter: Option<AccessorGetter>,
    pub(crate) setter: Option<AccessorSetter>,
    pub(crate) data: Option<HostData>,
    pub(crate) attribs: PropertyAttribute,
}

impl Default for Accessor {
    fn default() -> Self {
        Accessor {
            getter: None,
            setter: None,
            data: None,
            attribs: PropertyAttribute::NONE,
        }
    }
}

impl Accessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn getter(mut self, getter: impl Fn(&str, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }

    /// Without a setter, assignments to the property are ignored
    pub fn setter(
        mut self,
        setter: impl Fn(&str, &Value, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    pub fn data(mut self, data: HostData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn attribs(mut self, attribs: PropertyAttribute) -> Self {
        self.attribs = attribs;
        self
    }
}

/// Interceptors for named properties
///
/// Each callback may leave the return value unset to let the access reach
/// the object's own storage. A query callback reports the property's
/// attributes as an integer, a deleter reports success as a boolean and an
/// enumerator returns an array of extra keys.
#[derive(Clone, Default)]
pub struct NamedPropertyHandler {
    pub(crate) getter: Option<NamedCallback>,
    pub(crate) setter: Option<NamedSetter>,
    pub(crate) query: Option<NamedCallback>,
    pub(crate) deleter: Option<NamedCallback>,
    pub(crate) enumerator: Option<EnumeratorCallback>,
    pub(crate) data: Option<HostData>,
}

impl NamedPropertyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn getter(mut self, f: impl Fn(&str, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.getter = Some(Arc::new(f));
        self
    }

    pub fn setter(mut self, f: impl Fn(&str, &Value, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.setter = Some(Arc::new(f));
        self
    }

    pub fn query(mut self, f: impl Fn(&str, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.query = Some(Arc::new(f));
        self
    }

    pub fn deleter(mut self, f: impl Fn(&str, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.deleter = Some(Arc::new(f));
        self
    }

    pub fn enumerator(mut self, f: impl Fn(&mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.enumerator = Some(Arc::new(f));
        self
    }

    pub fn data(mut self, data: HostData) -> Self {
        self.data = Some(data);
        self
    }
}

/// Interceptors for indexed properties, see [`NamedPropertyHandler`]
#[derive(Clone, Default)]
pub struct IndexedPropertyHandler {
    pub(crate) getter: Option<IndexedCallback>,
    pub(crate) setter: Option<IndexedSetter>,
    pub(crate) query: Option<IndexedCallback>,
    pub(crate) deleter: Option<IndexedCallback>,
    pub(crate) enumerator: Option<EnumeratorCallback>,
    pub(crate) data: Option<HostData>,
}

impl IndexedPropertyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn getter(mut self, f: impl Fn(u32, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.getter = Some(Arc::new(f));
        self
    }

    pub fn setter(mut self, f: impl Fn(u32, &Value, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.setter = Some(Arc::new(f));
        self
    }

    pub fn query(mut self, f: impl Fn(u32, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.query = Some(Arc::new(f));
        self
    }

    pub fn deleter(mut self, f: impl Fn(u32, &mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.deleter = Some(Arc::new(f));
        self
    }

    pub fn enumerator(mut self, f: impl Fn(&mut PropertyCallbackInfo<'_>) + Send + Sync + 'static) -> Self {
        self.enumerator = Some(Arc::new(f));
        self
    }

    pub fn data(mut self, data: HostData) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Default)]
struct ObjectTemplateState {
    disposed: bool,
    properties: Vec<(String, Arc<ValueCore>, PropertyAttribute)>,
    /// Indices are stable: objects refer to accessors by position
    accessors: Vec<(String, Arc<Accessor>)>,
    named: Option<Arc<NamedPropertyHandler>>,
    indexed: Option<Arc<IndexedPropertyHandler>>,
    internal_field_count: usize,
    class_name: Option<String>,
}

/// Registry entry of an object template, looked up by the bridge
pub(crate) struct ObjectTemplateInner {
    pub(crate) id: u64,
    state: Mutex<ObjectTemplateState>,
}

impl ObjectTemplateInner {
    fn new(id: u64) -> Self {
        ObjectTemplateInner {
            id,
            state: Mutex::new(ObjectTemplateState::default()),
        }
    }

    pub(crate) fn accessor(&self, index: u32) -> Option<Arc<Accessor>> {
        let state = self.state.lock();
        if state.disposed {
            return None;
        }
        state.accessors.get(index as usize).map(|(_, accessor)| accessor.clone())
    }

    pub(crate) fn named_handler(&self) -> Option<Arc<NamedPropertyHandler>> {
        let state = self.state.lock();
        if state.disposed { None } else { state.named.clone() }
    }

    pub(crate) fn indexed_handler(&self) -> Option<Arc<IndexedPropertyHandler>> {
        let state = self.state.lock();
        if state.disposed { None } else { state.indexed.clone() }
    }

    pub(crate) fn set_class_name(&self, name: Option<String>) {
        self.state.lock().class_name = name;
    }

    /// Everything needed to shape an object; `None` once disposed
    pub(crate) fn snapshot(&self) -> Option<TemplateSnapshot> {
        let state = self.state.lock();
        if state.disposed {
            return None;
        }
        Some(TemplateSnapshot {
            template: self.id,
            accessors: state
                .accessors
                .iter()
                .enumerate()
                .map(|(index, (name, accessor))| (name.clone(), index as u32, accessor.attribs))
                .collect(),
            properties: state
                .properties
                .iter()
                .map(|(name, value, attribs)| (name.clone(), value.value.clone(), *attribs))
                .collect(),
            intercepts: state.named.is_some() || state.indexed.is_some(),
            internal_field_count: state.internal_field_count,
            class_name: state.class_name.clone(),
        })
    }

    /// Mark disposed and drop the registrations; `false` if already disposed
    pub(crate) fn dispose(&self) -> bool {
        let mut state = self.state.lock();
        if state.disposed {
            return false;
        }
        let properties = std::mem::take(&mut state.properties);
        *state = ObjectTemplateState {
            disposed: true,
            ..ObjectTemplateState::default()
        };
        drop(state);
        // Property values release their handles outside the lock
        drop(properties);
        true
    }
}

/// Shape applied to objects made from or wrapped by a template
pub(crate) struct TemplateSnapshot {
    template: u64,
    accessors: Vec<(String, u32, PropertyAttribute)>,
    properties: Vec<(String, JSValue, PropertyAttribute)>,
    intercepts: bool,
    internal_field_count: usize,
    class_name: Option<String>,
}

impl TemplateSnapshot {
    pub(crate) fn apply(&self, interp: &mut Interpreter<'_>, obj: ObjectId) {
        {
            let mut heap = interp.runtime().heap_mut();
            let object = heap.object_mut(obj);
            for (name, index, attribs) in &self.accessors {
                let accessor = HostAccessor {
                    template: self.template,
                    index: *index,
                };
                object.properties.insert(
                    PropertyKey::from(name.as_str()),
                    Property {
                        slot: PropertySlot::Host(accessor),
                        flags: *attribs,
                    },
                );
            }
            if self.intercepts || self.internal_field_count > 0 || self.class_name.is_some() {
                let slots = object.host_slots_mut();
                if self.intercepts {
                    slots.interceptor = Some(self.template);
                }
                if slots.internal_fields.len() < self.internal_field_count {
                    slots.internal_fields.resize(self.internal_field_count, None);
                }
                if let Some(name) = &self.class_name {
                    slots.class_name = Some(JSString::from(name.as_str()));
                }
            }
        }
        for (name, value, attribs) in &self.properties {
            interp.define_own(obj, PropertyKey::from(name.as_str()), value.clone(), *attribs);
        }
    }
}

/// Blueprint for objects with host accessors, interceptors and internal
/// fields
///
/// A template stays registered with its engine until
/// [`dispose`](Self::dispose) is called, even when every handle to it is
/// gone. Objects made from a disposed template keep their shape, but their
/// accessors read as `undefined` and their interceptors stop intercepting.
#[derive(Clone)]
pub struct ObjectTemplate {
    inner: Arc<ObjectTemplateInner>,
    engine: Engine,
}

impl ObjectTemplate {
    pub(crate) fn new(engine: &Engine) -> Self {
        let inner = Arc::new(ObjectTemplateInner::new(engine.next_template_id()));
        engine.inner.object_templates.lock().insert(inner.id, inner.clone());
        ObjectTemplate {
            inner,
            engine: engine.clone(),
        }
    }

    pub(crate) fn from_inner(engine: &Engine, inner: Arc<ObjectTemplateInner>) -> Self {
        ObjectTemplate {
            inner,
            engine: engine.clone(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn inner(&self) -> &Arc<ObjectTemplateInner> {
        &self.inner
    }

    /// # Panics
    ///
    /// Panics if the template has been disposed.
    fn state(&self) -> MutexGuard<'_, ObjectTemplateState> {
        let state = self.inner.state.lock();
        if state.disposed {
            panic!("{}", BridgeError::TemplateDisposed);
        }
        state
    }

    /// Data property defined on every object made from the template
    pub fn set_property(&self, key: &str, value: &Value, attribs: PropertyAttribute) {
        let mut state = self.state();
        let entry = (key.to_string(), value.core.clone(), attribs);
        match state.properties.iter_mut().find(|(name, _, _)| name == key) {
            Some(existing) => *existing = entry,
            None => state.properties.push(entry),
        }
    }

    pub fn set_accessor(&self, key: &str, accessor: Accessor) {
        let mut state = self.state();
        let accessor = Arc::new(accessor);
        match state.accessors.iter_mut().find(|(name, _)| name == key) {
            Some((_, existing)) => *existing = accessor,
            None => state.accessors.push((key.to_string(), accessor)),
        }
    }

    pub fn set_named_property_handler(&self, handler: NamedPropertyHandler) {
        self.state().named = Some(Arc::new(handler));
    }

    pub fn set_indexed_property_handler(&self, handler: IndexedPropertyHandler) {
        self.state().indexed = Some(Arc::new(handler));
    }

    pub fn set_internal_field_count(&self, count: usize) {
        self.state().internal_field_count = count;
    }

    pub fn internal_field_count(&self) -> usize {
        self.inner.state.lock().internal_field_count
    }

    pub(crate) fn snapshot(&self) -> Option<TemplateSnapshot> {
        self.inner.snapshot()
    }

    /// New object in the scope's context; `None` once disposed
    pub fn new_object(&self, scope: &ContextScope) -> Option<Object> {
        let engine = scope.engine();
        let realm = scope.context().realm();
        engine.with_interpreter(Some(realm), |interp| {
            let snapshot = self.snapshot()?;
            let id = interp.new_object();
            snapshot.apply(interp, id);
            Some(Object::from_id(engine, interp.runtime(), realm, id))
        })
    }

    /// Give an existing object the template's accessors, properties,
    /// interceptors and internal fields
    ///
    /// Returns `false` when `value` is not an object or the template has
    /// been disposed.
    pub fn wrap_object(&self, value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        self.engine.with_interpreter(value.realm(), |interp| match self.snapshot() {
            Some(snapshot) => {
                snapshot.apply(interp, object.id());
                true
            }
            None => false,
        })
    }

    /// Unregister the template; calling it again does nothing
    pub fn dispose(&self) {
        if !self.inner.dispose() {
            return;
        }
        self.engine.inner.object_templates.lock().remove(&self.inner.id);
        if self.engine.inner.tracing_dispose() {
            debug!(target: "mqjs_bridge::dispose", template = self.inner.id, "dispose object template");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }
}

impl fmt::Debug for ObjectTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectTemplate").field("id", &self.inner.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_template(engine: &Engine, reads: Arc<AtomicUsize>) -> ObjectTemplate {
        let template = engine.new_object_template();
        let attribs = PropertyAttribute::READ_ONLY | PropertyAttribute::DONT_DELETE;
        template.set_accessor(
            "counted",
            Accessor::new()
                .getter(move |name, info| {
                    reads.fetch_add(1, Ordering::SeqCst);
                    info.return_value().set_string(name);
                })
                .attribs(PropertyAttribute::DONT_ENUM),
        );
        template.set_property("fixed", &engine.true_value(), attribs);
        template
    }

    #[test]
    fn test_new_object_and_wrap_object_agree() {
        let engine = Engine::new();
        let new_reads = Arc::new(AtomicUsize::new(0));
        let wrap_reads = Arc::new(AtomicUsize::new(0));
        let made = counted_template(&engine, new_reads.clone());
        let wrapper = counted_template(&engine, wrap_reads.clone());
        let context = engine.new_context(None);

        context.scope(|scope| {
            let a = made.new_object(scope).unwrap();
            let b = scope.new_object();
            assert!(wrapper.wrap_object(&b));

            for object in [&a, &b] {
                assert_eq!(object.get_property_attributes("counted"), PropertyAttribute::DONT_ENUM);
                assert_eq!(
                    object.get_property_attributes("fixed"),
                    PropertyAttribute::READ_ONLY | PropertyAttribute::DONT_DELETE
                );
                assert_eq!(object.get_property("counted").unwrap().to_string(), "counted");
                assert!(object.get_property("fixed").unwrap().is_true());
                assert!(!object.delete_property("fixed"));
            }
            assert_eq!(new_reads.load(Ordering::SeqCst), 1);
            assert_eq!(wrap_reads.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_accessor_from_script() {
        let engine = Engine::new();
        let stored = Arc::new(Mutex::new(0.0));
        let template = engine.new_object_template();
        let (read, write) = (stored.clone(), stored.clone());
        template.set_accessor(
            "level",
            Accessor::new()
                .getter(move |_, info| {
                    let level = *read.lock();
                    info.return_value().set_number(level);
                })
                .setter(move |_, value, _| {
                    *write.lock() = value.to_number();
                }),
        );
        template.set_accessor("constant", Accessor::new().getter(|_, info| info.return_value().set_int32(7)));

        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            scope.global().set_property("device", &object, PropertyAttribute::NONE);
            assert_eq!(scope.eval("device.level = 3; device.level * 2").unwrap().to_int32(), 6);
            assert_eq!(*stored.lock(), 3.0);
            assert_eq!(scope.eval("device.constant = 1; device.constant").unwrap().to_int32(), 7);
        });
    }

    #[test]
    fn test_accessor_data_and_holder() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_accessor(
            "tag",
            Accessor::new()
                .getter(|_, info| {
                    let tag = info.data_as::<String>().cloned().unwrap_or_default();
                    let same = info.this().strict_equals(info.holder());
                    info.return_value().set_string(&format!("{}:{}", tag, same));
                })
                .data(Arc::new(String::from("t"))),
        );
        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            scope.global().set_property("o", &object, PropertyAttribute::NONE);
            assert_eq!(scope.eval("o.tag").unwrap().to_string(), "t:true");
            assert_eq!(scope.eval("Object.create(o).tag").unwrap().to_string(), "t:false");
        });
    }

    #[test]
    fn test_interceptors_pass_through() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_named_property_handler(
            NamedPropertyHandler::new()
                .getter(|name, info| {
                    if name == "virtual" {
                        info.return_value().set_string("intercepted");
                    }
                })
                .setter(|name, value, info| {
                    if name == "virtual" {
                        info.return_value().set(value);
                    }
                })
                .query(|name, info| {
                    if name == "virtual" {
                        info.return_value().set_int32(PropertyAttribute::DONT_ENUM.bits() as i32);
                    }
                })
                .deleter(|name, info| {
                    if name == "virtual" {
                        info.return_value().set_boolean(false);
                    }
                })
                .enumerator(|info| {
                    let names = info.current_scope().new_array(1);
                    names.set_element(0, &info.current_scope().new_string("virtual"));
                    info.return_value().set(&names);
                }),
        );

        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            scope.global().set_property("o", &object, PropertyAttribute::NONE);

            assert_eq!(scope.eval("o.virtual").unwrap().to_string(), "intercepted");
            assert_eq!(scope.eval("o.real = 5; o.real").unwrap().to_int32(), 5);
            assert!(scope.eval("'virtual' in o && 'real' in o").unwrap().is_true());
            assert_eq!(object.get_property_attributes("virtual"), PropertyAttribute::DONT_ENUM);
            assert_eq!(object.get_property_attributes("real"), PropertyAttribute::NONE);

            assert!(scope.eval("delete o.real").unwrap().is_true());
            assert!(scope.eval("o.real").unwrap().is_undefined());
            assert!(scope.eval("delete o.virtual").unwrap().is_false());

            assert_eq!(scope.eval("o.kept = 1; Object.keys(o).join()").unwrap().to_string(), "kept,virtual");
        });
    }

    #[test]
    fn test_indexed_interceptors() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_indexed_property_handler(IndexedPropertyHandler::new().getter(|index, info| {
            if index < 3 {
                info.return_value().set_uint32(index * 10);
            }
        }));
        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            assert_eq!(object.get_element(2).unwrap().to_int32(), 20);
            assert!(object.get_element(5).unwrap().is_undefined());
            assert!(object.set_element(5, &scope.new_integer(1)));
            assert_eq!(object.get_element(5).unwrap().to_int32(), 1);
            // Named access is not intercepted by the indexed handler
            assert!(object.get_property("x").unwrap().is_undefined());
        });
    }

    #[test]
    fn test_internal_fields() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_internal_field_count(2);
        assert_eq!(template.internal_field_count(), 2);
        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            assert_eq!(object.internal_field_count(), 2);
            assert!(object.get_internal_field(1).is_none());
            object.set_internal_field(1, Arc::new(99i32));
            let field = object.get_internal_field(1).unwrap();
            assert_eq!(field.downcast_ref::<i32>(), Some(&99));
            assert_eq!(scope.new_object().internal_field_count(), 0);
        });
    }

    #[test]
    #[should_panic(expected = "internal field index 3 out of bounds")]
    fn test_internal_field_out_of_range() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_internal_field_count(1);
        let context = engine.new_context(None);
        context.scope(|scope| {
            let object = template.new_object(scope).unwrap();
            object.set_internal_field(3, Arc::new(()));
        });
    }

    #[test]
    fn test_global_template() {
        let engine = Engine::new();
        let global = engine.new_object_template();
        global.set_property("version", &engine.true_value(), PropertyAttribute::READ_ONLY);
        global.set_accessor("answer", Accessor::new().getter(|_, info| info.return_value().set_int32(42)));
        let context = engine.new_context(Some(&global));
        context.scope(|scope| {
            assert_eq!(scope.eval("answer + (version ? 1 : 0)").unwrap().to_int32(), 43);
            assert!(scope.eval("version = false; version").unwrap().is_true());
        });
    }

    #[test]
    fn test_dispose() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.set_accessor("x", Accessor::new().getter(|_, info| info.return_value().set_int32(1)));
        let context = engine.new_context(None);
        let object = context.scope(|scope| template.new_object(scope)).unwrap();
        assert_eq!(object.get_property("x").unwrap().to_int32(), 1);

        template.dispose();
        template.dispose();
        assert!(template.is_disposed());
        assert!(engine.inner.object_template(template.id()).is_none());
        assert!(object.get_property("x").unwrap().is_undefined());
        assert!(context.scope(|scope| template.new_object(scope)).is_none());
        assert!(!template.wrap_object(&object));
    }

    #[test]
    #[should_panic(expected = "template has been disposed")]
    fn test_mutating_disposed_template_panics() {
        let engine = Engine::new();
        let template = engine.new_object_template();
        template.dispose();
        template.set_internal_field_count(1);
    }
}
