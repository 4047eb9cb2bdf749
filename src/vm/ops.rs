//! Object model operations
//!
//! Property lookup and update along the prototype chain, type conversions
//! and the binary operators. Arrays, boxed strings and `Uint8Array` expose
//! their elements as virtual own properties; objects created from host
//! templates route accesses through the runtime's [`HostDispatch`].
//!
//! [`HostDispatch`]: crate::runtime::HostDispatch

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::gc::ObjectId;
use crate::parser::ast::BinaryOp;
use crate::runtime::host::{AccessorCall, InterceptCall, InterceptOp};
use crate::runtime::property::{HostAccessor, Property, PropertySlot};
use crate::runtime::realm::{ErrorKind, Intrinsics};
use crate::runtime::regexp::RegExpData;
use crate::runtime::{
    ClassId, FunctionKind, JSArray, JSObject, JSString, JSValue, JsResult, ObjectData,
    PropertyFlags, PropertyKey,
};
use crate::util::dtoa::{number_to_string, string_to_number, to_int32, to_uint32};
use crate::vm::Interpreter;

/// Preferred type for [`Interpreter::to_primitive`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Default,
    Number,
    String,
}

impl Interpreter<'_> {
    // =========================================================================
    // Allocation
    // =========================================================================

    #[inline]
    pub fn alloc(&mut self, obj: JSObject) -> ObjectId {
        self.rt.heap_mut().alloc_object(obj)
    }

    pub fn intrinsics(&self) -> Intrinsics {
        self.rt.heap().realm(self.realm).intrinsics.clone()
    }

    pub fn global(&self) -> ObjectId {
        self.rt.heap().realm(self.realm).global
    }

    /// Plain object inheriting from `Object.prototype`
    pub fn new_object(&mut self) -> ObjectId {
        let proto = self.intrinsics().object_prototype;
        self.new_object_with_proto(Some(proto))
    }

    pub fn new_object_with_proto(&mut self, proto: Option<ObjectId>) -> ObjectId {
        self.alloc(JSObject::new(ClassId::Object, proto))
    }

    pub fn new_array(&mut self, values: Vec<JSValue>) -> ObjectId {
        let proto = self.intrinsics().array_prototype;
        self.alloc(JSObject::with_data(
            ClassId::Array,
            Some(proto),
            ObjectData::Array(JSArray::from_values(values)),
        ))
    }

    pub fn new_regexp(&mut self, pattern: &str, flags: &str) -> JsResult<ObjectId> {
        let data = match RegExpData::new(pattern, flags) {
            Ok(data) => data,
            Err(message) => return self.throw(ErrorKind::SyntaxError, message),
        };
        let proto = self.intrinsics().regexp_prototype;
        let mut obj = JSObject::with_data(ClassId::RegExp, Some(proto), ObjectData::RegExp(Box::new(data)));
        obj.define_value(
            "lastIndex".into(),
            JSValue::Number(0.0),
            PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE,
        );
        Ok(self.alloc(obj))
    }

    /// Error object of `kind` with the current stack attached
    pub fn new_error(&mut self, kind: ErrorKind, message: &str) -> ObjectId {
        let proto = self.intrinsics().error_prototype(kind);
        self.error_with_proto(proto, kind.name(), Some(message))
    }

    /// Error object with an explicit prototype; used by the constructors
    pub(crate) fn error_with_proto(&mut self, proto: ObjectId, name: &str, message: Option<&str>) -> ObjectId {
        let header = match message {
            Some(message) if !message.is_empty() => format!("{}: {}", name, message),
            _ => name.to_string(),
        };
        let frames = self
            .rt
            .state()
            .call_stack
            .capture(self.rt.config().stack_trace_limit);
        let stack = if frames.is_empty() {
            header
        } else {
            format!("{}\n{}", header, frames)
        };

        let mut obj = JSObject::with_data(ClassId::Error, Some(proto), ObjectData::Error);
        if let Some(message) = message {
            obj.define_value("message".into(), JSValue::string(message), PropertyFlags::DONT_ENUM);
        }
        obj.define_value("stack".into(), JSValue::string(stack), PropertyFlags::DONT_ENUM);
        self.alloc(obj)
    }

    /// Throw a new error of `kind`
    pub fn throw<T>(&mut self, kind: ErrorKind, message: impl AsRef<str>) -> JsResult<T> {
        Err(JSValue::Object(self.new_error(kind, message.as_ref())))
    }

    // =========================================================================
    // Host hooks
    // =========================================================================

    fn intercept(
        &mut self,
        holder: ObjectId,
        this: &JSValue,
        key: Option<&PropertyKey>,
        op: InterceptOp,
    ) -> JsResult<Option<JSValue>> {
        let template = self.rt.heap().object(holder).interceptor();
        let Some(template) = template else {
            return Ok(None);
        };
        let host = self.rt.host();
        host.intercept(
            self,
            InterceptCall {
                template,
                holder,
                this: this.clone(),
                key,
                op,
            },
        )
    }

    fn host_accessor(
        &mut self,
        accessor: HostAccessor,
        key: &PropertyKey,
        holder: ObjectId,
        this: &JSValue,
        value: Option<JSValue>,
    ) -> JsResult<Option<JSValue>> {
        let host = self.rt.host();
        host.accessor(
            self,
            AccessorCall {
                accessor,
                key,
                holder,
                this: this.clone(),
                value,
            },
        )
    }

    // =========================================================================
    // Own properties
    // =========================================================================

    /// Own property of `obj`, including virtual element properties
    pub(crate) fn own_property(&self, obj: ObjectId, key: &PropertyKey) -> Option<Property> {
        let heap = self.rt.heap();
        let object = heap.object(obj);
        let fixed = PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE;
        match (&object.data, key) {
            (ObjectData::Array(arr), PropertyKey::Index(i)) => {
                return arr.get(*i).map(|v| Property::data(v.clone(), PropertyFlags::NONE));
            }
            (ObjectData::Array(arr), key) if key.is("length") => {
                return Some(Property::data(JSValue::from(arr.len()), fixed));
            }
            (ObjectData::Primitive(JSValue::String(s)), PropertyKey::Index(i)) => {
                let unit = s.char_code_at(*i as usize)?;
                let c = crate::util::from_utf16_lossy(&[unit]);
                return Some(Property::data(
                    JSValue::string(c),
                    PropertyFlags::READ_ONLY | PropertyFlags::DONT_DELETE,
                ));
            }
            (ObjectData::Primitive(JSValue::String(s)), key) if key.is("length") => {
                return Some(Property::data(
                    JSValue::from(s.len_utf16()),
                    fixed | PropertyFlags::READ_ONLY,
                ));
            }
            (ObjectData::Uint8Array(view), PropertyKey::Index(i)) => {
                if (*i as usize) >= view.length {
                    return None;
                }
                let byte = match &heap.object(view.buffer).data {
                    ObjectData::ArrayBuffer(buf) => buf.bytes().get(view.offset + *i as usize).copied(),
                    _ => None,
                }?;
                return Some(Property::data(JSValue::from(byte as u32), PropertyFlags::DONT_DELETE));
            }
            (ObjectData::Uint8Array(view), key) if key.is("length") || key.is("byteLength") => {
                return Some(Property::data(
                    JSValue::from(view.length),
                    fixed | PropertyFlags::READ_ONLY,
                ));
            }
            (ObjectData::Uint8Array(view), key) if key.is("byteOffset") => {
                return Some(Property::data(
                    JSValue::from(view.offset),
                    fixed | PropertyFlags::READ_ONLY,
                ));
            }
            (ObjectData::Uint8Array(view), key) if key.is("buffer") => {
                return Some(Property::data(
                    JSValue::Object(view.buffer),
                    fixed | PropertyFlags::READ_ONLY,
                ));
            }
            (ObjectData::ArrayBuffer(buf), key) if key.is("byteLength") => {
                return Some(Property::data(
                    JSValue::from(buf.len()),
                    fixed | PropertyFlags::READ_ONLY,
                ));
            }
            _ => {}
        }
        object.properties.get(key).cloned()
    }

    /// Define or replace an own data property
    pub fn define_own(&mut self, obj: ObjectId, key: PropertyKey, value: JSValue, flags: PropertyFlags) -> bool {
        let mut heap = self.rt.heap_mut();
        let object = heap.object_mut(obj);
        if let Some(arr) = object.array_mut() {
            if let PropertyKey::Index(i) = key {
                return arr.set(i, value);
            }
        }
        object.define_value(key, value, flags);
        true
    }

    /// Install a getter and/or setter, merging with an existing accessor
    pub fn define_accessor(
        &mut self,
        obj: ObjectId,
        key: PropertyKey,
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
        flags: PropertyFlags,
    ) {
        let mut heap = self.rt.heap_mut();
        let object = heap.object_mut(obj);
        let (getter, setter) = match object.properties.get(&key).map(|p| &p.slot) {
            Some(PropertySlot::Accessor {
                getter: old_getter,
                setter: old_setter,
            }) => (getter.or(*old_getter), setter.or(*old_setter)),
            _ => (getter, setter),
        };
        object.properties.insert(
            key,
            Property {
                slot: PropertySlot::Accessor { getter, setter },
                flags,
            },
        );
    }

    // =========================================================================
    // Property access
    // =========================================================================

    /// `[[Get]]` along the prototype chain; `None` if no object has the key
    pub fn get_property(
        &mut self,
        obj: ObjectId,
        key: &PropertyKey,
        receiver: &JSValue,
    ) -> JsResult<Option<JSValue>> {
        let mut current = Some(obj);
        while let Some(id) = current {
            if let Some(value) = self.intercept(id, receiver, Some(key), InterceptOp::Get)? {
                return Ok(Some(value));
            }
            let property = self.own_property(id, key);
            if let Some(property) = property {
                return match property.slot {
                    PropertySlot::Data(value) => Ok(Some(value)),
                    PropertySlot::Accessor { getter: Some(getter), .. } => self
                        .call(&JSValue::Object(getter), receiver.clone(), &[])
                        .map(Some),
                    PropertySlot::Accessor { getter: None, .. } => Ok(Some(JSValue::Undefined)),
                    PropertySlot::Host(accessor) => {
                        let value = self.host_accessor(accessor, key, id, receiver, None)?;
                        Ok(Some(value.unwrap_or_default()))
                    }
                };
            }
            current = self.rt.heap().object(id).proto;
        }
        Ok(None)
    }

    /// `obj[key]`, undefined when missing
    pub fn get(&mut self, obj: ObjectId, key: &PropertyKey) -> JsResult<JSValue> {
        let receiver = JSValue::Object(obj);
        Ok(self.get_property(obj, key, &receiver)?.unwrap_or_default())
    }

    /// Convenience for string keys
    pub fn get_named(&mut self, obj: ObjectId, name: &str) -> JsResult<JSValue> {
        self.get(obj, &PropertyKey::from(name))
    }

    /// Property read on any value, boxing primitives through their prototype
    pub fn get_value(&mut self, base: &JSValue, key: &PropertyKey) -> JsResult<JSValue> {
        let proto = match base {
            JSValue::Object(obj) => return self.get(*obj, key),
            JSValue::Undefined | JSValue::Null => {
                return self.throw(
                    ErrorKind::TypeError,
                    format!(
                        "Cannot read properties of {} (reading '{}')",
                        nullish_name(base),
                        key
                    ),
                );
            }
            JSValue::String(s) => {
                match key {
                    PropertyKey::Index(i) => {
                        return Ok(s
                            .char_code_at(*i as usize)
                            .map(|unit| JSValue::string(crate::util::from_utf16_lossy(&[unit])))
                            .unwrap_or_default());
                    }
                    key if key.is("length") => return Ok(JSValue::from(s.len_utf16())),
                    _ => {}
                }
                self.intrinsics().string_prototype
            }
            JSValue::Number(_) => self.intrinsics().number_prototype,
            JSValue::Bool(_) => self.intrinsics().boolean_prototype,
        };
        Ok(self.get_property(proto, key, base)?.unwrap_or_default())
    }

    /// `[[Set]]` with sloppy-mode semantics: failed writes are ignored
    pub fn put(&mut self, obj: ObjectId, key: &PropertyKey, value: JSValue) -> JsResult<()> {
        let receiver = JSValue::Object(obj);
        if self
            .intercept(obj, &receiver, Some(key), InterceptOp::Set(value.clone()))?
            .is_some()
        {
            return Ok(());
        }
        if self.put_element(obj, key, &value)? {
            return Ok(());
        }

        // Own table property, then inherited setters and read-only slots
        let mut current = Some(obj);
        while let Some(id) = current {
            let property = self.rt.heap().object(id).properties.get(key).cloned();
            if let Some(property) = property {
                match property.slot {
                    PropertySlot::Data(_) if property.flags.contains(PropertyFlags::READ_ONLY) => {
                        return Ok(());
                    }
                    PropertySlot::Data(_) if id == obj => {
                        let mut heap = self.rt.heap_mut();
                        if let Some(own) = heap.object_mut(obj).properties.get_mut(key) {
                            own.slot = PropertySlot::Data(value);
                        }
                        return Ok(());
                    }
                    PropertySlot::Data(_) => break,
                    PropertySlot::Accessor { setter, .. } => {
                        if let Some(setter) = setter {
                            self.call(&JSValue::Object(setter), receiver, &[value])?;
                        }
                        return Ok(());
                    }
                    PropertySlot::Host(accessor) => {
                        self.host_accessor(accessor, key, id, &receiver, Some(value))?;
                        return Ok(());
                    }
                }
            }
            current = self.rt.heap().object(id).proto;
        }

        let mut heap = self.rt.heap_mut();
        let object = heap.object_mut(obj);
        if object.extensible {
            object.define_value(key.clone(), value, PropertyFlags::NONE);
        }
        Ok(())
    }

    /// Writes to virtual element properties; `true` if handled
    fn put_element(&mut self, obj: ObjectId, key: &PropertyKey, value: &JSValue) -> JsResult<bool> {
        enum Target {
            ArrayIndex(u32),
            ArrayLength,
            ReadOnly,
            Byte { buffer: ObjectId, at: usize },
            Other,
        }
        let target = {
            let heap = self.rt.heap();
            let object = heap.object(obj);
            match (&object.data, key) {
                (ObjectData::Array(_), _) if !object.extensible && key.as_index().is_some() => Target::ReadOnly,
                (ObjectData::Array(_), PropertyKey::Index(i)) => Target::ArrayIndex(*i),
                (ObjectData::Array(_), key) if key.is("length") => Target::ArrayLength,
                (ObjectData::Primitive(JSValue::String(s)), PropertyKey::Index(i)) if (*i as usize) < s.len_utf16() => {
                    Target::ReadOnly
                }
                (ObjectData::Primitive(JSValue::String(_)), key) if key.is("length") => Target::ReadOnly,
                (ObjectData::Uint8Array(view), PropertyKey::Index(i)) => {
                    if (*i as usize) < view.length {
                        Target::Byte {
                            buffer: view.buffer,
                            at: view.offset + *i as usize,
                        }
                    } else {
                        Target::ReadOnly
                    }
                }
                (ObjectData::Uint8Array(_), key)
                    if key.is("length") || key.is("byteLength") || key.is("byteOffset") || key.is("buffer") =>
                {
                    Target::ReadOnly
                }
                _ => Target::Other,
            }
        };

        match target {
            Target::Other => Ok(false),
            Target::ReadOnly => Ok(true),
            Target::ArrayIndex(i) => {
                let stored = self
                    .rt
                    .heap_mut()
                    .object_mut(obj)
                    .array_mut()
                    .is_some_and(|arr| arr.set(i, value.clone()));
                if !stored {
                    return self.throw(ErrorKind::RangeError, "Invalid array length");
                }
                Ok(true)
            }
            Target::ArrayLength => {
                let n = self.to_number(value)?;
                let length = to_uint32(n);
                if length as f64 != n {
                    return self.throw(ErrorKind::RangeError, "Invalid array length");
                }
                let resized = self
                    .rt
                    .heap_mut()
                    .object_mut(obj)
                    .array_mut()
                    .is_some_and(|arr| arr.set_length(length));
                if !resized {
                    return self.throw(ErrorKind::RangeError, "Invalid array length");
                }
                Ok(true)
            }
            Target::Byte { buffer, at } => {
                let n = self.to_number(value)?;
                let byte = to_uint32(n) as u8;
                let mut heap = self.rt.heap_mut();
                if let ObjectData::ArrayBuffer(buf) = &mut heap.object_mut(buffer).data {
                    if let Some(slot) = buf.bytes_mut().get_mut(at) {
                        *slot = byte;
                    }
                }
                Ok(true)
            }
        }
    }

    /// Property write on any value
    pub fn put_value(&mut self, base: &JSValue, key: &PropertyKey, value: JSValue) -> JsResult<()> {
        match base {
            JSValue::Object(obj) => self.put(*obj, key, value),
            JSValue::Undefined | JSValue::Null => self.throw(
                ErrorKind::TypeError,
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    nullish_name(base),
                    key
                ),
            ),
            _ => Ok(()),
        }
    }

    /// `key in obj`
    pub fn has_property(&mut self, obj: ObjectId, key: &PropertyKey) -> JsResult<bool> {
        let receiver = JSValue::Object(obj);
        let mut current = Some(obj);
        while let Some(id) = current {
            if self.intercept(id, &receiver, Some(key), InterceptOp::Query)?.is_some() {
                return Ok(true);
            }
            if self.own_property(id, key).is_some() {
                return Ok(true);
            }
            current = self.rt.heap().object(id).proto;
        }
        Ok(false)
    }

    /// Own property check without walking the chain
    pub fn has_own_property(&mut self, obj: ObjectId, key: &PropertyKey) -> JsResult<bool> {
        Ok(self.property_attributes(obj, key)?.is_some())
    }

    /// `delete obj[key]`; `force` ignores `DONT_DELETE`
    pub fn delete_property(&mut self, obj: ObjectId, key: &PropertyKey, force: bool) -> JsResult<bool> {
        let receiver = JSValue::Object(obj);
        if let Some(result) = self.intercept(obj, &receiver, Some(key), InterceptOp::Delete)? {
            return Ok(result.to_boolean());
        }
        let mut heap = self.rt.heap_mut();
        let object = heap.object_mut(obj);
        match (&mut object.data, key) {
            (ObjectData::Array(arr), PropertyKey::Index(i)) => {
                if *i < arr.len() {
                    arr.set(*i, JSValue::Undefined);
                }
                return Ok(true);
            }
            (ObjectData::Array(_), key) if key.is("length") => return Ok(false),
            (ObjectData::Primitive(JSValue::String(s)), PropertyKey::Index(i)) if (*i as usize) < s.len_utf16() => {
                return Ok(false);
            }
            (ObjectData::Uint8Array(view), PropertyKey::Index(i)) if (*i as usize) < view.length => {
                return Ok(false);
            }
            _ => {}
        }
        match object.properties.get(key) {
            None => Ok(true),
            Some(p) if p.flags.contains(PropertyFlags::DONT_DELETE) && !force => Ok(false),
            Some(_) => {
                object.properties.remove(key);
                Ok(true)
            }
        }
    }

    /// Attributes of an own property, `None` when absent
    pub fn property_attributes(&mut self, obj: ObjectId, key: &PropertyKey) -> JsResult<Option<PropertyFlags>> {
        let receiver = JSValue::Object(obj);
        if let Some(bits) = self.intercept(obj, &receiver, Some(key), InterceptOp::Query)? {
            let bits = self.to_number(&bits)?;
            return Ok(Some(PropertyFlags::from_bits(bits as u8)));
        }
        Ok(self.own_property(obj, key).map(|p| p.flags))
    }

    /// Own keys with their attributes: indices ascending, then names in
    /// insertion order
    fn own_entries(&mut self, obj: ObjectId) -> JsResult<Vec<(PropertyKey, PropertyFlags)>> {
        let mut indices: Vec<(u32, PropertyFlags)> = Vec::new();
        let mut names: Vec<(PropertyKey, PropertyFlags)> = Vec::new();
        {
            let heap = self.rt.heap();
            let object = heap.object(obj);
            let virtual_count = match &object.data {
                ObjectData::Array(arr) => arr.len() as usize,
                ObjectData::Primitive(JSValue::String(s)) => s.len_utf16(),
                ObjectData::Uint8Array(view) => view.length,
                _ => 0,
            };
            indices.extend((0..virtual_count as u32).map(|i| (i, PropertyFlags::NONE)));
            if let ObjectData::Array(_) = object.data {
                names.push(("length".into(), PropertyFlags::DONT_ENUM));
            }
            for (key, property) in object.properties.iter() {
                match key {
                    PropertyKey::Index(i) => indices.push((*i, property.flags)),
                    key => names.push((key.clone(), property.flags)),
                }
            }
        }
        indices.sort_by_key(|(i, _)| *i);
        indices.dedup_by_key(|(i, _)| *i);

        let mut entries: Vec<(PropertyKey, PropertyFlags)> = indices
            .into_iter()
            .map(|(i, flags)| (PropertyKey::Index(i), flags))
            .chain(names)
            .collect();

        let receiver = JSValue::Object(obj);
        if let Some(extra) = self.intercept(obj, &receiver, None, InterceptOp::Enumerate)? {
            if let Some(list) = extra.as_object() {
                let length = self.length_of(list)?;
                let mut seen: HashSet<PropertyKey> = entries.iter().map(|(k, _)| k.clone()).collect();
                for i in 0..length {
                    let item = self.get(list, &PropertyKey::Index(i))?;
                    let key = self.to_property_key(&item)?;
                    if seen.insert(key.clone()) {
                        entries.push((key, PropertyFlags::NONE));
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Own property keys, optionally only the enumerable ones
    pub fn own_keys(&mut self, obj: ObjectId, enumerable_only: bool) -> JsResult<Vec<PropertyKey>> {
        Ok(self
            .own_entries(obj)?
            .into_iter()
            .filter(|(_, flags)| !enumerable_only || flags.is_enumerable())
            .map(|(key, _)| key)
            .collect())
    }

    /// Keys visited by `for-in`: enumerable keys along the chain, each once
    pub fn enumerable_keys(&mut self, obj: ObjectId) -> JsResult<Vec<PropertyKey>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut current = Some(obj);
        while let Some(id) = current {
            for (key, flags) in self.own_entries(id)? {
                if seen.insert(key.clone()) && flags.is_enumerable() {
                    keys.push(key);
                }
            }
            current = self.rt.heap().object(id).proto;
        }
        Ok(keys)
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub fn is_callable(&self, value: &JSValue) -> bool {
        value
            .as_object()
            .is_some_and(|id| self.rt.heap().object(id).is_callable())
    }

    pub fn is_constructor(&self, value: &JSValue) -> bool {
        value.as_object().is_some_and(|id| {
            self.rt
                .heap()
                .object(id)
                .function_kind()
                .is_some_and(FunctionKind::is_constructor)
        })
    }

    pub fn type_of(&self, value: &JSValue) -> &'static str {
        if self.is_callable(value) {
            "function"
        } else {
            value.primitive_type_name()
        }
    }

    /// Call `obj[name]()` if it is callable
    pub fn call_method(&mut self, this: &JSValue, name: &str, args: &[JSValue]) -> JsResult<Option<JSValue>> {
        let func = self.get_value(this, &PropertyKey::from(name))?;
        if !self.is_callable(&func) {
            return Ok(None);
        }
        self.call(&func, this.clone(), args).map(Some)
    }

    pub fn to_primitive(&mut self, value: &JSValue, hint: Hint) -> JsResult<JSValue> {
        let JSValue::Object(obj) = value else {
            return Ok(value.clone());
        };
        let hint = match hint {
            Hint::Default if self.rt.heap().object(*obj).class == ClassId::Date => Hint::String,
            hint => hint,
        };
        let order = if hint == Hint::String {
            ["toString", "valueOf"]
        } else {
            ["valueOf", "toString"]
        };
        for name in order {
            if let Some(result) = self.call_method(value, name, &[])? {
                if !result.is_object() {
                    return Ok(result);
                }
            }
        }
        self.throw(ErrorKind::TypeError, "Cannot convert object to primitive value")
    }

    pub fn to_number(&mut self, value: &JSValue) -> JsResult<f64> {
        Ok(match value {
            JSValue::Undefined => f64::NAN,
            JSValue::Null => 0.0,
            JSValue::Bool(b) => *b as u8 as f64,
            JSValue::Number(n) => *n,
            JSValue::String(s) => string_to_number(s),
            JSValue::Object(_) => {
                let primitive = self.to_primitive(value, Hint::Number)?;
                return self.to_number(&primitive);
            }
        })
    }

    pub fn to_int32(&mut self, value: &JSValue) -> JsResult<i32> {
        Ok(to_int32(self.to_number(value)?))
    }

    pub fn to_uint32(&mut self, value: &JSValue) -> JsResult<u32> {
        Ok(to_uint32(self.to_number(value)?))
    }

    /// ToIntegerOrInfinity
    pub fn to_integer(&mut self, value: &JSValue) -> JsResult<f64> {
        let n = self.to_number(value)?;
        Ok(if n.is_nan() { 0.0 } else { n.trunc() })
    }

    pub fn to_string(&mut self, value: &JSValue) -> JsResult<JSString> {
        Ok(match value {
            JSValue::Undefined => JSString::from("undefined"),
            JSValue::Null => JSString::from("null"),
            JSValue::Bool(b) => JSString::from(if *b { "true" } else { "false" }),
            JSValue::Number(n) => JSString::from(number_to_string(*n)),
            JSValue::String(s) => s.clone(),
            JSValue::Object(_) => {
                let primitive = self.to_primitive(value, Hint::String)?;
                return self.to_string(&primitive);
            }
        })
    }

    pub fn to_property_key(&mut self, value: &JSValue) -> JsResult<PropertyKey> {
        Ok(match value {
            JSValue::Number(n) => PropertyKey::from_number(*n),
            JSValue::String(s) => PropertyKey::from_string(s.clone()),
            other => PropertyKey::from_string(self.to_string(other)?),
        })
    }

    /// ToObject: box primitives, reject `undefined` and `null`
    pub fn to_object(&mut self, value: &JSValue) -> JsResult<ObjectId> {
        let intrinsics = self.intrinsics();
        let (class, proto) = match value {
            JSValue::Object(obj) => return Ok(*obj),
            JSValue::Undefined | JSValue::Null => {
                return self.throw(ErrorKind::TypeError, "Cannot convert undefined or null to object");
            }
            JSValue::Bool(_) => (ClassId::Boolean, intrinsics.boolean_prototype),
            JSValue::Number(_) => (ClassId::Number, intrinsics.number_prototype),
            JSValue::String(_) => (ClassId::String, intrinsics.string_prototype),
        };
        Ok(self.alloc(JSObject::with_data(class, Some(proto), ObjectData::Primitive(value.clone()))))
    }

    /// Non-throwing description used in error messages
    pub fn describe_value(&self, value: &JSValue) -> String {
        match value {
            JSValue::String(s) => format!("\"{}\"", s),
            JSValue::Object(id) => {
                let heap = self.rt.heap();
                let obj = heap.object(*id);
                if obj.is_callable() {
                    "function".to_string()
                } else {
                    format!("#<{}>", obj.class.tag())
                }
            }
            JSValue::Number(n) => number_to_string(*n),
            JSValue::Bool(b) => b.to_string(),
            JSValue::Undefined => "undefined".to_string(),
            JSValue::Null => "null".to_string(),
        }
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// Abstract equality (`==`)
    pub fn loose_equals(&mut self, a: &JSValue, b: &JSValue) -> JsResult<bool> {
        Ok(match (a, b) {
            (JSValue::Undefined | JSValue::Null, JSValue::Undefined | JSValue::Null) => true,
            (JSValue::Undefined | JSValue::Null, _) | (_, JSValue::Undefined | JSValue::Null) => false,
            (JSValue::Number(_), JSValue::String(_)) | (JSValue::String(_), JSValue::Number(_)) => {
                self.to_number(a)? == self.to_number(b)?
            }
            (JSValue::Bool(_), _) => {
                let a = JSValue::Number(self.to_number(a)?);
                return self.loose_equals(&a, b);
            }
            (_, JSValue::Bool(_)) => {
                let b = JSValue::Number(self.to_number(b)?);
                return self.loose_equals(a, &b);
            }
            (JSValue::Object(_), JSValue::Object(_)) => a.strict_equals(b),
            (JSValue::Object(_), _) => {
                let a = self.to_primitive(a, Hint::Default)?;
                return self.loose_equals(&a, b);
            }
            (_, JSValue::Object(_)) => {
                let b = self.to_primitive(b, Hint::Default)?;
                return self.loose_equals(a, &b);
            }
            _ => a.strict_equals(b),
        })
    }

    /// Relational comparison; `None` when either side is NaN
    pub fn compare(&mut self, a: &JSValue, b: &JSValue) -> JsResult<Option<Ordering>> {
        let a = self.to_primitive(a, Hint::Number)?;
        let b = self.to_primitive(b, Hint::Number)?;
        if let (JSValue::String(x), JSValue::String(y)) = (&a, &b) {
            return Ok(Some(x.encode_utf16().cmp(y.encode_utf16())));
        }
        let x = self.to_number(&a)?;
        let y = self.to_number(&b)?;
        Ok(x.partial_cmp(&y))
    }

    pub fn instance_of(&mut self, value: &JSValue, constructor: &JSValue) -> JsResult<bool> {
        if !self.is_callable(constructor) {
            return self.throw(ErrorKind::TypeError, "Right-hand side of 'instanceof' is not callable");
        }
        let Some(mut ctor) = constructor.as_object() else {
            return Ok(false);
        };
        loop {
            let target = match self.rt.heap().object(ctor).function_kind() {
                Some(FunctionKind::Bound(bound)) => Some(bound.target),
                _ => None,
            };
            match target {
                Some(target) => ctor = target,
                None => break,
            }
        }
        let Some(obj) = value.as_object() else {
            return Ok(false);
        };
        let prototype = self.get_named(ctor, "prototype")?;
        let Some(prototype) = prototype.as_object() else {
            return self.throw(
                ErrorKind::TypeError,
                "Function has non-object prototype in instanceof check",
            );
        };
        let mut current = self.rt.heap().object(obj).proto;
        while let Some(id) = current {
            if id == prototype {
                return Ok(true);
            }
            current = self.rt.heap().object(id).proto;
        }
        Ok(false)
    }

    pub fn binary_op(&mut self, op: BinaryOp, left: &JSValue, right: &JSValue) -> JsResult<JSValue> {
        let number = |n: f64| Ok(JSValue::Number(n));
        match op {
            BinaryOp::Add => {
                if let (JSValue::Number(a), JSValue::Number(b)) = (left, right) {
                    return number(a + b);
                }
                let a = self.to_primitive(left, Hint::Default)?;
                let b = self.to_primitive(right, Hint::Default)?;
                if matches!(a, JSValue::String(_)) || matches!(b, JSValue::String(_)) {
                    let a = self.to_string(&a)?;
                    let b = self.to_string(&b)?;
                    return Ok(JSValue::String(a.concat(&b)));
                }
                number(self.to_number(&a)? + self.to_number(&b)?)
            }
            BinaryOp::Sub => number(self.to_number(left)? - self.to_number(right)?),
            BinaryOp::Mul => number(self.to_number(left)? * self.to_number(right)?),
            BinaryOp::Div => number(self.to_number(left)? / self.to_number(right)?),
            BinaryOp::Mod => number(self.to_number(left)? % self.to_number(right)?),
            BinaryOp::Exp => {
                let base = self.to_number(left)?;
                let exponent = self.to_number(right)?;
                if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
                    return number(f64::NAN);
                }
                number(base.powf(exponent))
            }
            BinaryOp::Eq => Ok(JSValue::Bool(self.loose_equals(left, right)?)),
            BinaryOp::NotEq => Ok(JSValue::Bool(!self.loose_equals(left, right)?)),
            BinaryOp::StrictEq => Ok(JSValue::Bool(left.strict_equals(right))),
            BinaryOp::StrictNotEq => Ok(JSValue::Bool(!left.strict_equals(right))),
            BinaryOp::Lt => Ok(JSValue::Bool(self.compare(left, right)? == Some(Ordering::Less))),
            BinaryOp::Gt => Ok(JSValue::Bool(self.compare(right, left)? == Some(Ordering::Less))),
            BinaryOp::LtEq => Ok(JSValue::Bool(matches!(
                self.compare(right, left)?,
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinaryOp::GtEq => Ok(JSValue::Bool(matches!(
                self.compare(left, right)?,
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinaryOp::Shl => {
                let a = self.to_int32(left)?;
                let b = self.to_uint32(right)?;
                number(a.wrapping_shl(b & 31) as f64)
            }
            BinaryOp::Shr => {
                let a = self.to_int32(left)?;
                let b = self.to_uint32(right)?;
                number((a >> (b & 31)) as f64)
            }
            BinaryOp::UShr => {
                let a = self.to_uint32(left)?;
                let b = self.to_uint32(right)?;
                number((a >> (b & 31)) as f64)
            }
            BinaryOp::BitAnd => number((self.to_int32(left)? & self.to_int32(right)?) as f64),
            BinaryOp::BitOr => number((self.to_int32(left)? | self.to_int32(right)?) as f64),
            BinaryOp::BitXor => number((self.to_int32(left)? ^ self.to_int32(right)?) as f64),
            BinaryOp::In => {
                let Some(obj) = right.as_object() else {
                    let key = self.to_string(left)?;
                    let target = self.describe_value(right);
                    return self.throw(
                        ErrorKind::TypeError,
                        format!("Cannot use 'in' operator to search for '{}' in {}", key, target),
                    );
                };
                let key = self.to_property_key(left)?;
                Ok(JSValue::Bool(self.has_property(obj, &key)?))
            }
            BinaryOp::InstanceOf => Ok(JSValue::Bool(self.instance_of(left, right)?)),
        }
    }
}

fn nullish_name(value: &JSValue) -> &'static str {
    if value.is_null() { "null" } else { "undefined" }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::EngineConfig;
    use crate::runtime::{NoHost, Runtime};

    fn with_interp<R>(f: impl FnOnce(&mut Interpreter<'_>) -> JsResult<R>) -> R {
        let rt = Runtime::new(EngineConfig::default(), Arc::new(NoHost));
        let realm = rt.create_realm();
        match rt.execute(realm, f) {
            Ok(value) => value,
            Err(thrown) => panic!("uncaught: {}", thrown.exception.message),
        }
    }

    #[test]
    fn test_array_virtual_properties() {
        with_interp(|interp| {
            let arr = interp.new_array(vec![JSValue::from(1), JSValue::from(2)]);
            assert_eq!(interp.get_named(arr, "length")?.as_number(), Some(2.0));
            interp.put(arr, &PropertyKey::Index(4), JSValue::from(5))?;
            assert_eq!(interp.get_named(arr, "length")?.as_number(), Some(5.0));
            assert!(interp.get(arr, &PropertyKey::Index(3))?.is_undefined());
            interp.put(arr, &"length".into(), JSValue::from(1))?;
            assert_eq!(interp.own_keys(arr, true)?, vec![PropertyKey::Index(0)]);
            assert!(interp.put(arr, &"length".into(), JSValue::from(-1.0)).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_read_only_and_dont_delete() {
        with_interp(|interp| {
            let obj = interp.new_object();
            interp.define_own(
                obj,
                "fixed".into(),
                JSValue::from(1),
                PropertyFlags::READ_ONLY | PropertyFlags::DONT_DELETE,
            );
            interp.put(obj, &"fixed".into(), JSValue::from(2))?;
            assert_eq!(interp.get_named(obj, "fixed")?.as_number(), Some(1.0));
            assert!(!interp.delete_property(obj, &"fixed".into(), false)?);
            assert!(interp.delete_property(obj, &"fixed".into(), true)?);
            assert!(interp.property_attributes(obj, &"fixed".into())?.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_key_order() {
        with_interp(|interp| {
            let obj = interp.new_object();
            for key in ["b", "2", "a", "0"] {
                interp.put(obj, &key.into(), JSValue::Null)?;
            }
            let keys: Vec<String> = interp.own_keys(obj, true)?.iter().map(|k| k.to_string()).collect();
            assert_eq!(keys, ["0", "2", "b", "a"]);
            Ok(())
        });
    }

    #[test]
    fn test_conversions() {
        with_interp(|interp| {
            assert!(interp.to_number(&JSValue::string(" 12 "))? == 12.0);
            assert!(interp.to_number(&JSValue::Undefined)?.is_nan());
            assert_eq!(interp.to_string(&JSValue::Number(1e21))?.as_str(), "1e+21");
            assert!(interp.loose_equals(&JSValue::string("1"), &JSValue::Bool(true))?);
            assert!(!interp.loose_equals(&JSValue::Null, &JSValue::from(0))?);
            assert!(interp.to_object(&JSValue::Null).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_exponent_edge_cases() {
        with_interp(|interp| {
            fn pow(interp: &mut Interpreter<'_>, a: f64, b: f64) -> JsResult<f64> {
                interp
                    .binary_op(BinaryOp::Exp, &JSValue::Number(a), &JSValue::Number(b))
                    .map(|v| v.as_number().unwrap_or_default())
            }
            assert!(pow(interp, 1.0, f64::NAN)?.is_nan());
            assert!(pow(interp, -1.0, f64::INFINITY)?.is_nan());
            assert_eq!(pow(interp, f64::NAN, 0.0)?, 1.0);
            assert_eq!(pow(interp, 2.0, -1.0)?, 0.5);
            Ok(())
        });
    }

    #[test]
    fn test_string_comparison_uses_code_units() {
        with_interp(|interp| {
            let a = JSValue::string("\u{FF61}");
            let b = JSValue::string("\u{1F600}");
            assert_eq!(interp.compare(&a, &b)?, Some(Ordering::Greater));
            Ok(())
        });
    }
}
