//! Value handles
//!
//! A [`Value`] is a host handle to a script value. A handle to an object
//! registers the object, and the realm it came from, in the engine's handle
//! table so that both survive collection. The registration goes away with
//! the last clone of the handle. That can happen on any thread; when the
//! engine is busy elsewhere the release is queued and applied on the next
//! entry.
//!
//! Type checks are cached per handle in two bit masks, one for kinds the
//! value is known to be and one for kinds it is known not to be.

use std::fmt;
use std::ops::{BitOr, Deref};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::builtins;
use crate::engine::{Engine, EngineInner};
use crate::gc::{ObjectId, RealmId};
use crate::handle::PendingRelease;
use crate::runtime::{
    ClassId, HostData, JSObject, JSValue, JsResult, ObjectData, PropertyFlags, PropertyKey, Runtime,
};
use crate::vm::Interpreter;

pub use crate::runtime::PropertyFlags as PropertyAttribute;

/// Shared state behind all clones of a [`Value`]
pub(crate) struct ValueCore {
    pub(crate) value: JSValue,
    /// Realm operations on the value run in; `None` uses the utility realm
    pub(crate) realm: Option<RealmId>,
    /// Whether the handle table holds a reference for this handle
    rooted: bool,
    known: AtomicU32,
    known_not: AtomicU32,
    engine: Weak<EngineInner>,
}

impl ValueCore {
    fn new(engine: &Engine, value: JSValue, realm: Option<RealmId>, rooted: bool) -> Self {
        ValueCore {
            value,
            realm,
            rooted,
            known: AtomicU32::new(0),
            known_not: AtomicU32::new(0),
            engine: Arc::downgrade(&engine.inner),
        }
    }

    pub(crate) fn primitive(engine: Weak<EngineInner>, value: JSValue) -> Arc<ValueCore> {
        Arc::new(ValueCore {
            value,
            realm: None,
            rooted: false,
            known: AtomicU32::new(0),
            known_not: AtomicU32::new(0),
            engine,
        })
    }
}

impl Drop for ValueCore {
    fn drop(&mut self) {
        if !self.rooted {
            return;
        }
        if let Some(engine) = self.engine.upgrade() {
            engine.release(PendingRelease::Handle {
                object: self.value.as_object(),
                realm: self.realm,
            });
        }
    }
}

/// Kinds cached by the type checks
#[derive(Debug, Clone, Copy)]
#[repr(u32)]
enum Kind {
    Undefined = 1 << 0,
    Null = 1 << 1,
    True = 1 << 2,
    False = 1 << 3,
    String = 1 << 4,
    Function = 1 << 5,
    Array = 1 << 6,
    Object = 1 << 7,
    Boolean = 1 << 8,
    Number = 1 << 9,
    External = 1 << 10,
    Int32 = 1 << 11,
    Uint32 = 1 << 12,
    Date = 1 << 13,
    BooleanObject = 1 << 14,
    NumberObject = 1 << 15,
    StringObject = 1 << 16,
    NativeError = 1 << 17,
    RegExp = 1 << 18,
}

/// Handle to a script value
#[derive(Clone)]
pub struct Value {
    // Field order matters: the core releases through the engine
    pub(crate) core: Arc<ValueCore>,
    pub(crate) engine: Engine,
}

impl Value {
    pub(crate) fn from_core(engine: &Engine, core: Arc<ValueCore>) -> Value {
        Value {
            core,
            engine: engine.clone(),
        }
    }

    /// Wrap a value produced while `rt` is locked
    pub(crate) fn from_raw(engine: &Engine, rt: &Runtime, realm: RealmId, value: JSValue) -> Value {
        let core = match value {
            JSValue::Undefined => return engine.undefined(),
            JSValue::Null => return engine.null(),
            JSValue::Bool(b) => return engine.boolean(b),
            JSValue::Object(id) => {
                let mut handles = rt.handles_mut();
                handles.retain(id);
                handles.retain_realm(realm);
                ValueCore::new(engine, value, Some(realm), true)
            }
            other => ValueCore::new(engine, other, None, false),
        };
        Value::from_core(engine, Arc::new(core))
    }

    /// Wrap a primitive without taking the engine lock
    pub(crate) fn primitive(engine: &Engine, value: JSValue) -> Value {
        match value {
            JSValue::Undefined => engine.undefined(),
            JSValue::Null => engine.null(),
            JSValue::Bool(b) => engine.boolean(b),
            other => Value::from_core(engine, Arc::new(ValueCore::new(engine, other, None, false))),
        }
    }

    #[inline]
    pub(crate) fn raw(&self) -> &JSValue {
        &self.core.value
    }

    #[inline]
    pub(crate) fn realm(&self) -> Option<RealmId> {
        self.core.realm
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Whether both handles share the same underlying handle
    #[inline]
    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        self.core.value.strict_equals(&other.core.value)
    }

    pub(crate) fn execute<R>(&self, f: impl FnOnce(&mut Interpreter<'_>) -> JsResult<R>) -> Option<R> {
        self.engine.execute(self.core.realm, f)
    }

    pub(crate) fn execute_value(&self, f: impl FnOnce(&mut Interpreter<'_>) -> JsResult<JSValue>) -> Option<Value> {
        self.engine.execute_value(self.core.realm, f)
    }

    fn with_object<R: Default>(&self, f: impl FnOnce(&JSObject) -> R) -> R {
        let Some(id) = self.core.value.as_object() else {
            return R::default();
        };
        self.engine.with_runtime(|rt| f(rt.heap().object(id)))
    }

    // =========================================================================
    // Type checks
    // =========================================================================

    fn check(&self, kind: Kind) -> bool {
        let bit = kind as u32;
        let core = &self.core;
        if core.known.load(Ordering::Relaxed) & bit != 0 {
            return true;
        }
        if core.known_not.load(Ordering::Relaxed) & bit != 0 {
            return false;
        }
        let result = self.compute(kind);
        let mask = if result { &core.known } else { &core.known_not };
        mask.fetch_or(bit, Ordering::Relaxed);
        result
    }

    fn compute(&self, kind: Kind) -> bool {
        let value = &self.core.value;
        match kind {
            Kind::Undefined => value.is_undefined(),
            Kind::Null => value.is_null(),
            Kind::True => matches!(value, JSValue::Bool(true)),
            Kind::False => matches!(value, JSValue::Bool(false)),
            Kind::Boolean => matches!(value, JSValue::Bool(_)),
            Kind::String => matches!(value, JSValue::String(_)),
            Kind::Number => matches!(value, JSValue::Number(_)),
            Kind::Object => value.is_object(),
            Kind::Int32 => value.as_number().is_some_and(|n| is_integral(n) && n == (n as i32) as f64),
            Kind::Uint32 => value.as_number().is_some_and(|n| is_integral(n) && n == (n as u32) as f64),
            Kind::Function => self.with_object(JSObject::is_callable),
            Kind::Array => self.with_object(|obj| obj.class == ClassId::Array),
            Kind::Date => self.with_object(|obj| obj.class == ClassId::Date),
            Kind::RegExp => self.with_object(|obj| obj.class == ClassId::RegExp),
            Kind::NativeError => self.with_object(|obj| obj.class == ClassId::Error),
            Kind::External => self.with_object(|obj| obj.class == ClassId::External),
            Kind::BooleanObject => self.with_object(|obj| obj.class == ClassId::Boolean),
            Kind::NumberObject => self.with_object(|obj| obj.class == ClassId::Number),
            Kind::StringObject => self.with_object(|obj| obj.class == ClassId::String),
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.check(Kind::Undefined)
    }

    pub fn is_null(&self) -> bool {
        self.check(Kind::Null)
    }

    pub fn is_true(&self) -> bool {
        self.check(Kind::True)
    }

    pub fn is_false(&self) -> bool {
        self.check(Kind::False)
    }

    pub fn is_string(&self) -> bool {
        self.check(Kind::String)
    }

    pub fn is_function(&self) -> bool {
        self.check(Kind::Function)
    }

    pub fn is_array(&self) -> bool {
        self.check(Kind::Array)
    }

    pub fn is_object(&self) -> bool {
        self.check(Kind::Object)
    }

    /// Boolean primitive
    pub fn is_boolean(&self) -> bool {
        self.check(Kind::Boolean)
    }

    /// Number primitive
    pub fn is_number(&self) -> bool {
        self.check(Kind::Number)
    }

    pub fn is_external(&self) -> bool {
        self.check(Kind::External)
    }

    /// Number that fits an `i32` exactly (`-0` does not)
    pub fn is_int32(&self) -> bool {
        self.check(Kind::Int32)
    }

    pub fn is_uint32(&self) -> bool {
        self.check(Kind::Uint32)
    }

    pub fn is_date(&self) -> bool {
        self.check(Kind::Date)
    }

    pub fn is_boolean_object(&self) -> bool {
        self.check(Kind::BooleanObject)
    }

    pub fn is_number_object(&self) -> bool {
        self.check(Kind::NumberObject)
    }

    pub fn is_string_object(&self) -> bool {
        self.check(Kind::StringObject)
    }

    /// Instance of `Error` or one of its subclasses
    pub fn is_native_error(&self) -> bool {
        self.check(Kind::NativeError)
    }

    pub fn is_regexp(&self) -> bool {
        self.check(Kind::RegExp)
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn to_boolean(&self) -> bool {
        self.core.value.to_boolean()
    }

    /// ToNumber; `NaN` when the conversion throws
    pub fn to_number(&self) -> f64 {
        match &self.core.value {
            JSValue::Number(n) => *n,
            value => self.execute(|interp| interp.to_number(value)).unwrap_or(f64::NAN),
        }
    }

    /// ToInteger, saturated to `i64`
    pub fn to_integer(&self) -> i64 {
        self.execute(|interp| interp.to_integer(&self.core.value))
            .map_or(0, |n| n as i64)
    }

    pub fn to_int32(&self) -> i32 {
        self.execute(|interp| interp.to_int32(&self.core.value)).unwrap_or(0)
    }

    pub fn to_uint32(&self) -> u32 {
        self.execute(|interp| interp.to_uint32(&self.core.value)).unwrap_or(0)
    }

    pub fn as_object(&self) -> Option<Object> {
        let id = self.core.value.as_object()?;
        Some(Object {
            value: self.clone(),
            id,
        })
    }

    pub fn as_array(&self) -> Option<Array> {
        if !self.is_array() {
            return None;
        }
        self.as_object().map(Array)
    }

    pub fn as_function(&self) -> Option<Function> {
        if !self.is_function() {
            return None;
        }
        self.as_object().map(Function)
    }

    pub fn as_regexp(&self) -> Option<RegExp> {
        if !self.is_regexp() {
            return None;
        }
        self.as_object().map(RegExp::new)
    }

    /// Payload of a value made by [`ContextScope::new_external`](crate::ContextScope::new_external)
    pub fn external_data(&self) -> Option<HostData> {
        self.with_object(|obj| match &obj.data {
            ObjectData::External(data) => Some(data.clone()),
            _ => None,
        })
    }
}

#[inline]
fn is_integral(n: f64) -> bool {
    n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative())
}

/// String conversion; empty when it throws
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.core.value {
            JSValue::String(s) => f.write_str(s.as_str()),
            value => {
                let s = self.execute(|interp| interp.to_string(value));
                f.write_str(s.as_ref().map_or("", |s| s.as_str()))
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&self.core.value).finish()
    }
}

// =============================================================================
// Objects
// =============================================================================

/// Handle to an object
#[derive(Clone)]
pub struct Object {
    value: Value,
    id: ObjectId,
}

impl Deref for Object {
    type Target = Value;

    fn deref(&self) -> &Value {
        &self.value
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Object").field(&self.id).finish()
    }
}

impl Object {
    pub(crate) fn from_id(engine: &Engine, rt: &Runtime, realm: RealmId, id: ObjectId) -> Object {
        Object {
            value: Value::from_raw(engine, rt, realm, JSValue::Object(id)),
            id,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Set a property the way an assignment would
    ///
    /// `attribs` only apply when the property does not exist yet. Returns
    /// `false` for read-only properties and when a setter throws.
    pub fn set_property(&self, key: &str, value: &Value, attribs: PropertyAttribute) -> bool {
        let key = PropertyKey::from(key);
        let value = value.raw().clone();
        let id = self.id;
        self.execute(|interp| match interp.own_property(id, &key) {
            Some(property) if property.flags.contains(PropertyFlags::READ_ONLY) => Ok(false),
            None if attribs != PropertyFlags::NONE => Ok(interp.define_own(id, key, value, attribs)),
            _ => interp.put(id, &key, value).map(|_| true),
        })
        .unwrap_or(false)
    }

    /// Define an own data property, replacing whatever was there
    pub fn force_set_property(&self, key: &str, value: &Value, attribs: PropertyAttribute) -> bool {
        let value = value.raw().clone();
        let id = self.id;
        self.engine
            .with_interpreter(self.realm(), |interp| interp.define_own(id, PropertyKey::from(key), value, attribs))
    }

    pub fn get_property(&self, key: &str) -> Option<Value> {
        let key = PropertyKey::from(key);
        self.execute_value(|interp| interp.get(self.id, &key))
    }

    pub fn set_element(&self, index: u32, value: &Value) -> bool {
        let value = value.raw().clone();
        self.execute(|interp| interp.put(self.id, &PropertyKey::Index(index), value))
            .is_some()
    }

    pub fn get_element(&self, index: u32) -> Option<Value> {
        self.execute_value(|interp| interp.get(self.id, &PropertyKey::Index(index)))
    }

    /// Attributes of an own property; [`PropertyAttribute::NONE`] when absent
    pub fn get_property_attributes(&self, key: &str) -> PropertyAttribute {
        let key = PropertyKey::from(key);
        self.execute(|interp| interp.property_attributes(self.id, &key))
            .flatten()
            .unwrap_or(PropertyFlags::NONE)
    }

    /// `key in object`
    pub fn has_property(&self, key: &str) -> bool {
        let key = PropertyKey::from(key);
        self.execute(|interp| interp.has_property(self.id, &key)).unwrap_or(false)
    }

    pub fn delete_property(&self, key: &str) -> bool {
        let key = PropertyKey::from(key);
        self.execute(|interp| interp.delete_property(self.id, &key, false))
            .unwrap_or(false)
    }

    /// Delete even a non-configurable property
    pub fn force_delete_property(&self, key: &str) -> bool {
        let key = PropertyKey::from(key);
        self.execute(|interp| interp.delete_property(self.id, &key, true))
            .unwrap_or(false)
    }

    pub fn has_element(&self, index: u32) -> bool {
        self.execute(|interp| interp.has_property(self.id, &PropertyKey::Index(index)))
            .unwrap_or(false)
    }

    pub fn delete_element(&self, index: u32) -> bool {
        self.execute(|interp| interp.delete_property(self.id, &PropertyKey::Index(index), false))
            .unwrap_or(false)
    }

    /// Enumerable property names, own and inherited, as `for-in` sees them
    pub fn get_property_names(&self) -> Option<Array> {
        self.key_array(|interp, id| interp.enumerable_keys(id))
    }

    /// Own enumerable property names
    pub fn get_own_property_names(&self) -> Option<Array> {
        self.key_array(|interp, id| interp.own_keys(id, true))
    }

    fn key_array(
        &self,
        keys: impl FnOnce(&mut Interpreter<'_>, ObjectId) -> JsResult<Vec<PropertyKey>>,
    ) -> Option<Array> {
        let names = self.execute_value(|interp| {
            let names = keys(interp, self.id)?
                .iter()
                .map(|key| JSValue::String(key.to_js_string()))
                .collect();
            Ok(JSValue::Object(interp.new_array(names)))
        })?;
        names.as_object().map(Array)
    }

    pub fn get_prototype(&self) -> Option<Object> {
        let engine = &self.engine;
        engine.with_interpreter(self.realm(), |interp| {
            let proto = interp.runtime().heap().object(self.id).proto?;
            Some(Object::from_id(engine, interp.runtime(), interp.realm(), proto))
        })
    }

    /// Returns `false` when the change would create a cycle
    pub fn set_prototype(&self, proto: &Object) -> bool {
        self.engine.with_interpreter(self.realm(), |interp| {
            builtins::object::set_prototype(interp, self.id, Some(proto.id))
        })
    }

    pub fn is_callable(&self) -> bool {
        self.is_function()
    }

    // =========================================================================
    // Internal fields
    // =========================================================================

    /// Internal fields reserved by the object's template
    pub fn internal_field_count(&self) -> usize {
        self.engine
            .with_runtime(|rt| rt.heap().object(self.id).internal_field_count())
    }

    /// # Panics
    ///
    /// Panics if `index` is not below [`internal_field_count`](Self::internal_field_count).
    pub fn get_internal_field(&self, index: usize) -> Option<HostData> {
        self.engine.with_runtime(|rt| {
            let heap = rt.heap();
            let fields = heap.object(self.id).host.as_ref().map(|host| &host.internal_fields);
            let count = fields.map_or(0, Vec::len);
            match fields.and_then(|fields| fields.get(index)) {
                Some(field) => field.clone(),
                None => panic!("internal field index {} out of bounds ({} fields)", index, count),
            }
        })
    }

    /// # Panics
    ///
    /// Panics if `index` is not below [`internal_field_count`](Self::internal_field_count).
    pub fn set_internal_field(&self, index: usize, data: HostData) {
        self.engine.with_runtime(|rt| {
            let mut heap = rt.heap_mut();
            let object = heap.object_mut(self.id);
            let count = object.internal_field_count();
            match object.host.as_mut().and_then(|host| host.internal_fields.get_mut(index)) {
                Some(field) => *field = Some(data),
                None => panic!("internal field index {} out of bounds ({} fields)", index, count),
            }
        })
    }
}

// =============================================================================
// Arrays, functions and regular expressions
// =============================================================================

#[derive(Clone, Debug)]
pub struct Array(Object);

impl Deref for Array {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

impl Array {
    pub(crate) fn from_object(object: Object) -> Array {
        Array(object)
    }

    pub fn length(&self) -> u32 {
        self.execute(|interp| interp.length_of(self.id())).unwrap_or(0)
    }

    pub fn into_object(self) -> Object {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct Function(Object);

impl Deref for Function {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.0
    }
}

impl Function {
    pub(crate) fn from_object(object: Object) -> Function {
        Function(object)
    }

    /// Call with `undefined` as the receiver
    pub fn call(&self, args: &[Value]) -> Option<Value> {
        self.call_with_this(&self.engine.undefined(), args)
    }

    pub fn call_with_this(&self, this: &Value, args: &[Value]) -> Option<Value> {
        let args: Vec<JSValue> = args.iter().map(|arg| arg.raw().clone()).collect();
        let this = this.raw().clone();
        let callee = JSValue::Object(self.id());
        self.execute_value(|interp| interp.call(&callee, this, &args))
    }

    /// `new f(...args)`
    pub fn new_instance(&self, args: &[Value]) -> Option<Object> {
        let args: Vec<JSValue> = args.iter().map(|arg| arg.raw().clone()).collect();
        let callee = JSValue::Object(self.id());
        self.execute_value(|interp| interp.construct(&callee, &args))?
            .as_object()
    }

    pub fn into_object(self) -> Object {
        self.0
    }
}

/// Flags of a regular expression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegExpFlags(u8);

impl RegExpFlags {
    pub const NONE: RegExpFlags = RegExpFlags(0);
    pub const GLOBAL: RegExpFlags = RegExpFlags(1);
    pub const IGNORE_CASE: RegExpFlags = RegExpFlags(2);
    pub const MULTILINE: RegExpFlags = RegExpFlags(4);

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: RegExpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Source form, e.g. `gi`
    pub(crate) fn to_flag_string(self) -> String {
        let mut flags = String::new();
        if self.contains(RegExpFlags::GLOBAL) {
            flags.push('g');
        }
        if self.contains(RegExpFlags::IGNORE_CASE) {
            flags.push('i');
        }
        if self.contains(RegExpFlags::MULTILINE) {
            flags.push('m');
        }
        flags
    }
}

impl BitOr for RegExpFlags {
    type Output = RegExpFlags;

    fn bitor(self, rhs: RegExpFlags) -> RegExpFlags {
        RegExpFlags(self.0 | rhs.0)
    }
}

/// Handle to a regular expression
///
/// The pattern and flags are read once and cached.
#[derive(Clone, Debug)]
pub struct RegExp {
    object: Object,
    pattern: OnceCell<String>,
    flags: OnceCell<RegExpFlags>,
}

impl Deref for RegExp {
    type Target = Object;

    fn deref(&self) -> &Object {
        &self.object
    }
}

impl RegExp {
    pub(crate) fn new(object: Object) -> RegExp {
        RegExp {
            object,
            pattern: OnceCell::new(),
            flags: OnceCell::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.get_or_init(|| {
            self.with_object(|obj| match &obj.data {
                ObjectData::RegExp(data) => data.source.to_string(),
                _ => String::new(),
            })
        })
    }

    pub fn flags(&self) -> RegExpFlags {
        *self.flags.get_or_init(|| {
            self.with_object(|obj| match &obj.data {
                ObjectData::RegExp(data) => {
                    let mut flags = RegExpFlags::NONE;
                    if data.global {
                        flags = flags | RegExpFlags::GLOBAL;
                    }
                    if data.ignore_case {
                        flags = flags | RegExpFlags::IGNORE_CASE;
                    }
                    if data.multiline {
                        flags = flags | RegExpFlags::MULTILINE;
                    }
                    flags
                }
                _ => RegExpFlags::NONE,
            })
        })
    }

    pub fn into_object(self) -> Object {
        self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;

    fn with_scope<R>(f: impl FnOnce(&crate::ContextScope) -> R) -> R {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(f)
    }

    #[test]
    fn test_type_checks() {
        with_scope(|scope| {
            let checks = |code: &str| scope.eval(code).unwrap();
            assert!(checks("undefined").is_undefined());
            assert!(checks("null").is_null());
            assert!(checks("true").is_true() && checks("true").is_boolean());
            assert!(checks("'s'").is_string());
            assert!(checks("(function () {})").is_function());
            assert!(checks("[]").is_array() && checks("[]").is_object());
            assert!(checks("new Date(0)").is_date());
            assert!(checks("/a/g").is_regexp());
            assert!(checks("new TypeError('x')").is_native_error());
            assert!(checks("new Number(1)").is_number_object());
            assert!(checks("new String('s')").is_string_object());
            assert!(checks("new Boolean(false)").is_boolean_object());
            assert!(!checks("({})").is_function());
            assert!(!checks("1").is_object());
        });
    }

    #[test]
    fn test_number_checks() {
        with_scope(|scope| {
            let n = scope.new_number(-1.0);
            assert!(n.is_number() && n.is_int32() && !n.is_uint32());
            assert!(scope.new_number(4294967295.0).is_uint32());
            assert!(!scope.new_number(4294967295.0).is_int32());
            assert!(!scope.new_number(-0.0).is_int32());
            assert!(!scope.new_number(1.5).is_int32());
            assert!(!scope.new_number(f64::NAN).is_int32());
        });
    }

    #[test]
    fn test_checks_are_cached() {
        with_scope(|scope| {
            let value = scope.eval("[1]").unwrap();
            assert!(value.is_array());
            assert!(!value.is_function());
            assert_ne!(value.core.known.load(Ordering::Relaxed) & Kind::Array as u32, 0);
            assert_ne!(value.core.known_not.load(Ordering::Relaxed) & Kind::Function as u32, 0);
            assert!(value.clone().is_array());
        });
    }

    #[test]
    fn test_conversions() {
        with_scope(|scope| {
            let value = scope.eval("'42.7'").unwrap();
            assert_eq!(value.to_number(), 42.7);
            assert_eq!(value.to_integer(), 42);
            assert_eq!(value.to_int32(), 42);
            assert_eq!(scope.new_number(-1.0).to_uint32(), u32::MAX);
            assert!(scope.eval("({})").unwrap().to_boolean());
            assert!(!scope.new_string("").to_boolean());
            assert_eq!(scope.eval("[1, [2, 3]]").unwrap().to_string(), "1,2,3");
            assert_eq!(scope.new_number(0.1 + 0.2).to_string(), "0.30000000000000004");
        });
    }

    #[test]
    fn test_conversion_that_throws() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let value = scope.eval("({ valueOf: function () { throw new Error('no'); } })").unwrap();
            let message = scope.try_catch(false, |_| {
                assert!(value.to_number().is_nan());
            });
            assert_eq!(message, "Error: no");
        });
    }

    #[test]
    fn test_properties() {
        with_scope(|scope| {
            let object = scope.new_object();
            let value = scope.new_string("中文");
            assert!(object.set_property("中文字段", &value, PropertyAttribute::NONE));
            assert_eq!(object.get_property("中文字段").unwrap().to_string(), "中文");
            assert!(object.has_property("中文字段"));
            assert!(object.has_property("toString"));

            let hidden = PropertyAttribute::DONT_ENUM | PropertyAttribute::READ_ONLY;
            assert!(object.set_property("fixed", &scope.new_integer(1), hidden));
            assert_eq!(object.get_property_attributes("fixed"), hidden);
            assert!(!object.set_property("fixed", &scope.new_integer(2), PropertyAttribute::NONE));
            assert_eq!(object.get_property("fixed").unwrap().to_int32(), 1);
            assert!(object.force_set_property("fixed", &scope.new_integer(3), PropertyAttribute::NONE));
            assert_eq!(object.get_property("fixed").unwrap().to_int32(), 3);
            assert_eq!(object.get_property_attributes("fixed"), PropertyAttribute::NONE);
            assert_eq!(object.get_property_attributes("missing"), PropertyAttribute::NONE);

            // Forcing with no attributes leaves the property enumerable
            let names = object.get_own_property_names().unwrap();
            assert_eq!(names.length(), 2);
            assert_eq!(names.get_element(0).unwrap().to_string(), "中文字段");
            assert_eq!(names.get_element(1).unwrap().to_string(), "fixed");
        });
    }

    #[test]
    fn test_delete() {
        with_scope(|scope| {
            let object = scope.eval("var o = { a: 1 }; o").unwrap().as_object().unwrap();
            let locked = scope.new_integer(2);
            assert!(object.set_property("b", &locked, PropertyAttribute::DONT_DELETE));
            assert!(object.delete_property("a"));
            assert!(!object.has_property("a"));
            assert!(!object.delete_property("b"));
            assert!(object.force_delete_property("b"));
            assert!(!object.has_property("b"));
        });
    }

    #[test]
    fn test_elements() {
        with_scope(|scope| {
            let array = scope.new_array(2);
            assert_eq!(array.length(), 2);
            assert!(array.get_element(0).unwrap().is_undefined());
            assert!(array.set_element(3, &scope.new_string("x")));
            assert_eq!(array.length(), 4);
            assert!(array.has_element(3));
            assert!(array.delete_element(3));
            assert!(array.get_element(3).unwrap().is_undefined());

            let object = scope.new_object();
            assert!(object.set_element(7, &scope.new_integer(1)));
            assert!(object.has_element(7));
            assert!(object.delete_element(7));
            assert!(!object.has_element(7));
        });
    }

    #[test]
    fn test_property_names_include_inherited() {
        with_scope(|scope| {
            let object = scope
                .eval("function P() { this.own = 1; } P.prototype.inherited = 2; new P()")
                .unwrap()
                .as_object()
                .unwrap();
            assert_eq!(object.get_property_names().unwrap().length(), 2);
            assert_eq!(object.get_own_property_names().unwrap().length(), 1);
        });
    }

    #[test]
    fn test_prototype() {
        with_scope(|scope| {
            let base = scope.eval("({ greet: function () { return 'hi ' + this.name; } })").unwrap();
            let base = base.as_object().unwrap();
            let object = scope.new_object();
            object.set_property("name", &scope.new_string("bob"), PropertyAttribute::NONE);
            assert!(object.set_prototype(&base));
            assert!(!base.set_prototype(&object));
            let greet = object.get_property("greet").unwrap().as_function().unwrap();
            assert_eq!(greet.call_with_this(&object, &[]).unwrap().to_string(), "hi bob");
            let proto = object.get_prototype().unwrap();
            assert!(proto.strict_equals(&base));
        });
    }

    #[test]
    fn test_call_and_construct() {
        with_scope(|scope| {
            let add = scope.eval("(function (a, b) { return a + b; })").unwrap().as_function().unwrap();
            let sum = add.call(&[scope.new_integer(2), scope.new_integer(3)]).unwrap();
            assert_eq!(sum.to_int32(), 5);

            let point = scope.eval("(function Point(x) { this.x = x; })").unwrap().as_function().unwrap();
            let instance = point.new_instance(&[scope.new_integer(7)]).unwrap();
            assert_eq!(instance.get_property("x").unwrap().to_int32(), 7);

            assert!(scope.eval("({})").unwrap().as_function().is_none());
        });
    }

    #[test]
    fn test_regexp() {
        with_scope(|scope| {
            let re = scope.new_regexp("a+b", RegExpFlags::GLOBAL | RegExpFlags::IGNORE_CASE).unwrap();
            assert_eq!(re.pattern(), "a+b");
            assert_eq!(re.flags(), RegExpFlags::GLOBAL | RegExpFlags::IGNORE_CASE);
            let from_script = scope.eval("/x/m").unwrap().as_regexp().unwrap();
            assert_eq!(from_script.flags(), RegExpFlags::MULTILINE);
            assert!(scope.new_regexp("(", RegExpFlags::NONE).is_none());
        });
    }

    #[test]
    fn test_values_cross_threads() {
        let engine = Engine::new();
        let context: Context = engine.new_context(None);
        let value = context.scope(|scope| scope.eval("({ n: 5 })").unwrap());
        let handle = std::thread::spawn(move || {
            let n = value.as_object().unwrap().get_property("n").unwrap();
            n.to_int32()
        });
        assert_eq!(handle.join().unwrap(), 5);
    }
}
