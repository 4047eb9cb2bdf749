//! JavaScript object representation
//!
//! This module implements the JSObject struct and related types for
//! representing JavaScript objects in the engine.

use std::any::Any;
use std::sync::Arc;

use crate::allocator::BufferData;
use crate::gc::{ObjectId, RealmId, Trace, Tracer};
use crate::runtime::array::JSArray;
use crate::runtime::function::FunctionKind;
use crate::runtime::property::{Property, PropertyFlags, PropertyKey, PropertySlot, PropertyTable};
use crate::runtime::regexp::RegExpData;
use crate::runtime::{JSString, JSValue};

/// Host payload attached to an object (internal fields, externals)
pub type HostData = Arc<dyn Any + Send + Sync>;

/// JavaScript class IDs
///
/// These identify the type of a JavaScript object and determine its behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassId {
    /// Plain object
    Object,
    Array,
    Function,
    Arguments,
    Error,
    /// Boxed Boolean
    Boolean,
    /// Boxed Number
    Number,
    /// Boxed String
    String,
    Date,
    RegExp,
    ArrayBuffer,
    Uint8Array,
    /// Opaque host payload
    External,
}

impl ClassId {
    /// Tag used by `Object.prototype.toString`
    pub fn tag(self) -> &'static str {
        match self {
            ClassId::Object | ClassId::External => "Object",
            ClassId::Array => "Array",
            ClassId::Function => "Function",
            ClassId::Arguments => "Arguments",
            ClassId::Error => "Error",
            ClassId::Boolean => "Boolean",
            ClassId::Number => "Number",
            ClassId::String => "String",
            ClassId::Date => "Date",
            ClassId::RegExp => "RegExp",
            ClassId::ArrayBuffer => "ArrayBuffer",
            ClassId::Uint8Array => "Uint8Array",
        }
    }
}

/// View of an `ArrayBuffer` through a `Uint8Array`
#[derive(Debug, Clone, Copy)]
pub struct TypedView {
    pub buffer: ObjectId,
    pub offset: usize,
    pub length: usize,
}

/// Class-specific payload
#[derive(Debug)]
pub enum ObjectData {
    Ordinary,
    Array(JSArray),
    Function(FunctionKind),
    /// Boxed primitive (Boolean, Number, String)
    Primitive(JSValue),
    /// Time value in milliseconds
    Date(f64),
    RegExp(Box<RegExpData>),
    Error,
    ArrayBuffer(BufferData),
    Uint8Array(TypedView),
    External(HostData),
}

/// Per-object state set up by host templates
#[derive(Debug, Default)]
pub struct HostSlots {
    pub internal_fields: Vec<Option<HostData>>,
    /// Object template whose interceptors apply to this object
    pub interceptor: Option<u64>,
    /// Class name reported by `Object.prototype.toString`
    pub class_name: Option<JSString>,
}

/// A JavaScript object
#[derive(Debug)]
pub struct JSObject {
    pub class: ClassId,
    pub proto: Option<ObjectId>,
    pub properties: PropertyTable,
    pub data: ObjectData,
    pub extensible: bool,
    /// Realm of a function object; calls run in this realm
    pub realm: Option<RealmId>,
    pub host: Option<Box<HostSlots>>,
}

impl JSObject {
    /// Create an ordinary object
    pub fn new(class: ClassId, proto: Option<ObjectId>) -> Self {
        Self::with_data(class, proto, ObjectData::Ordinary)
    }

    /// Create an object with a class payload
    pub fn with_data(class: ClassId, proto: Option<ObjectId>, data: ObjectData) -> Self {
        JSObject {
            class,
            proto,
            properties: PropertyTable::new(),
            data,
            extensible: true,
            realm: None,
            host: None,
        }
    }

    /// Define or replace an own data property
    pub fn define_value(&mut self, key: PropertyKey, value: JSValue, flags: PropertyFlags) -> bool {
        self.properties.insert(key, Property::data(value, flags))
    }

    #[inline]
    pub fn function_kind(&self) -> Option<&FunctionKind> {
        match &self.data {
            ObjectData::Function(kind) => Some(kind),
            _ => None,
        }
    }

    #[inline]
    pub fn is_callable(&self) -> bool {
        matches!(self.data, ObjectData::Function(_))
    }

    #[inline]
    pub fn array(&self) -> Option<&JSArray> {
        match &self.data {
            ObjectData::Array(arr) => Some(arr),
            _ => None,
        }
    }

    #[inline]
    pub fn array_mut(&mut self) -> Option<&mut JSArray> {
        match &mut self.data {
            ObjectData::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Host slots, created on first use
    pub fn host_slots_mut(&mut self) -> &mut HostSlots {
        self.host.get_or_insert_with(Box::default)
    }

    /// Object template providing interceptors, if any
    #[inline]
    pub fn interceptor(&self) -> Option<u64> {
        self.host.as_ref().and_then(|h| h.interceptor)
    }

    pub fn internal_field_count(&self) -> usize {
        self.host.as_ref().map_or(0, |h| h.internal_fields.len())
    }
}

impl Trace for JSObject {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(proto) = self.proto {
            tracer.object(proto);
        }
        if let Some(realm) = self.realm {
            tracer.realm(realm);
        }
        for (_, property) in self.properties.iter() {
            match &property.slot {
                PropertySlot::Data(value) => tracer.value(value),
                PropertySlot::Accessor { getter, setter } => {
                    if let Some(g) = getter {
                        tracer.object(*g);
                    }
                    if let Some(s) = setter {
                        tracer.object(*s);
                    }
                }
                PropertySlot::Host(_) => {}
            }
        }
        match &self.data {
            ObjectData::Array(arr) => {
                for value in arr.iter() {
                    tracer.value(value);
                }
            }
            ObjectData::Function(kind) => kind.trace(tracer),
            ObjectData::Primitive(value) => tracer.value(value),
            ObjectData::Uint8Array(view) => tracer.object(view.buffer),
            ObjectData::Ordinary
            | ObjectData::Date(_)
            | ObjectData::RegExp(_)
            | ObjectData::Error
            | ObjectData::ArrayBuffer(_)
            | ObjectData::External(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_slots_created_lazily() {
        let mut obj = JSObject::new(ClassId::Object, None);
        assert!(obj.host.is_none());
        assert_eq!(obj.internal_field_count(), 0);
        assert_eq!(obj.interceptor(), None);

        obj.host_slots_mut().internal_fields = vec![None, None];
        obj.host_slots_mut().interceptor = Some(3);
        assert_eq!(obj.internal_field_count(), 2);
        assert_eq!(obj.interceptor(), Some(3));
    }

    #[test]
    fn test_class_tags() {
        assert_eq!(ClassId::Array.tag(), "Array");
        assert_eq!(ClassId::External.tag(), "Object");
    }
}
