//! JavaScript built-in objects
//!
//! This module contains implementations for the standard built-in objects
//! and their methods. [`create_realm`] allocates the intrinsic prototypes,
//! the global object and the global environment of a new realm, then lets
//! each builtin module install its constructors and methods through a
//! [`RealmBuilder`].

pub mod array;
pub mod date;
pub mod error;
pub mod function;
pub mod global;
pub mod json;
pub mod math;
pub mod number;
pub mod object;
pub mod regexp;
pub mod string;
pub mod typed_array;

use std::collections::HashMap;

use crate::gc::{Heap, ObjectId, RealmId};
use crate::runtime::env::Env;
use crate::runtime::property::{Property, PropertySlot};
use crate::runtime::realm::{ErrorKind, Intrinsics, Realm};
use crate::runtime::{
    ClassId, FunctionKind, JSObject, JSString, JSValue, JsResult, NativeCall, NativeFn,
    ObjectData, PropertyFlags, PropertyKey,
};
use crate::vm::Interpreter;

/// Native that does nothing; backs `Function.prototype` itself
fn empty_function(_: &mut Interpreter<'_>, _: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Undefined)
}

/// Create a realm with a fresh global object and all builtins installed
pub fn create_realm(heap: &mut Heap) -> RealmId {
    let object_prototype = heap.alloc_object(JSObject::new(ClassId::Object, None));
    let proto = |heap: &mut Heap, class: ClassId, data: ObjectData| {
        heap.alloc_object(JSObject::with_data(class, Some(object_prototype), data))
    };

    let function_prototype = proto(
        heap,
        ClassId::Function,
        ObjectData::Function(FunctionKind::Native {
            func: empty_function,
            constructor: false,
        }),
    );
    let array_prototype = proto(heap, ClassId::Object, ObjectData::Ordinary);
    let string_prototype = proto(heap, ClassId::String, ObjectData::Primitive(JSValue::string("")));
    let number_prototype = proto(heap, ClassId::Number, ObjectData::Primitive(JSValue::Number(0.0)));
    let boolean_prototype = proto(heap, ClassId::Boolean, ObjectData::Primitive(JSValue::Bool(false)));
    let date_prototype = proto(heap, ClassId::Object, ObjectData::Ordinary);
    let regexp_prototype = proto(heap, ClassId::Object, ObjectData::Ordinary);
    let array_buffer_prototype = proto(heap, ClassId::Object, ObjectData::Ordinary);
    let uint8_array_prototype = proto(heap, ClassId::Object, ObjectData::Ordinary);

    let base_error = proto(heap, ClassId::Object, ObjectData::Ordinary);
    let mut error_prototypes = [base_error; ErrorKind::COUNT];
    for kind in ErrorKind::ALL.iter().skip(1) {
        error_prototypes[*kind as usize] =
            heap.alloc_object(JSObject::new(ClassId::Object, Some(base_error)));
    }

    let intrinsics = Intrinsics {
        object_prototype,
        function_prototype,
        array_prototype,
        string_prototype,
        number_prototype,
        boolean_prototype,
        date_prototype,
        regexp_prototype,
        array_buffer_prototype,
        uint8_array_prototype,
        error_prototypes,
    };

    let global = heap.alloc_object(JSObject::new(ClassId::Object, Some(object_prototype)));
    let global_env = heap.alloc_env(Env::global(global));
    let realm = heap.alloc_realm(Realm {
        global,
        global_env,
        intrinsics: intrinsics.clone(),
        attached: true,
        host_functions: HashMap::new(),
    });
    heap.object_mut(function_prototype).realm = Some(realm);

    let mut builder = RealmBuilder {
        heap,
        realm,
        intrinsics,
        global,
    };
    object::install(&mut builder);
    function::install(&mut builder);
    array::install(&mut builder);
    string::install(&mut builder);
    number::install(&mut builder);
    math::install(&mut builder);
    error::install(&mut builder);
    json::install(&mut builder);
    regexp::install(&mut builder);
    date::install(&mut builder);
    typed_array::install(&mut builder);
    global::install(&mut builder);
    realm
}

/// Installs builtins into a realm under construction
pub struct RealmBuilder<'a> {
    pub heap: &'a mut Heap,
    pub realm: RealmId,
    pub intrinsics: Intrinsics,
    pub global: ObjectId,
}

impl RealmBuilder<'_> {
    /// Native function object belonging to this realm
    pub fn function(&mut self, name: &str, length: u32, func: NativeFn, constructor: bool) -> ObjectId {
        let mut obj = JSObject::with_data(
            ClassId::Function,
            Some(self.intrinsics.function_prototype),
            ObjectData::Function(FunctionKind::Native { func, constructor }),
        );
        obj.realm = Some(self.realm);
        let hidden = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM;
        obj.define_value("length".into(), JSValue::from(length), hidden);
        obj.define_value("name".into(), JSValue::string(name), hidden);
        self.heap.alloc_object(obj)
    }

    /// Non-enumerable method on `target`
    pub fn method(&mut self, target: ObjectId, name: &str, length: u32, func: NativeFn) {
        let f = self.function(name, length, func, false);
        self.value(target, name, JSValue::Object(f), PropertyFlags::DONT_ENUM);
    }

    /// Non-enumerable getter on `target`
    pub fn getter(&mut self, target: ObjectId, name: &str, func: NativeFn) {
        let f = self.function(&format!("get {}", name), 0, func, false);
        self.heap.object_mut(target).properties.insert(
            PropertyKey::from(name),
            Property {
                slot: PropertySlot::Accessor {
                    getter: Some(f),
                    setter: None,
                },
                flags: PropertyFlags::DONT_ENUM,
            },
        );
    }

    pub fn value(&mut self, target: ObjectId, name: &str, value: JSValue, flags: PropertyFlags) {
        self.heap
            .object_mut(target)
            .define_value(PropertyKey::from(name), value, flags);
    }

    /// Constructor linked with its prototype and exposed as a global
    pub fn constructor(&mut self, name: &str, length: u32, func: NativeFn, prototype: ObjectId) -> ObjectId {
        let ctor = self.function(name, length, func, true);
        self.value(
            ctor,
            "prototype",
            JSValue::Object(prototype),
            PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE,
        );
        self.value(prototype, "constructor", JSValue::Object(ctor), PropertyFlags::DONT_ENUM);
        self.global(name, JSValue::Object(ctor));
        ctor
    }

    /// Non-enumerable property of the global object
    pub fn global(&mut self, name: &str, value: JSValue) {
        let global = self.global;
        self.value(global, name, value, PropertyFlags::DONT_ENUM);
    }

    /// Plain namespace object (`Math`, `JSON`) exposed as a global
    pub fn namespace(&mut self, name: &str) -> ObjectId {
        let obj = self
            .heap
            .alloc_object(JSObject::new(ClassId::Object, Some(self.intrinsics.object_prototype)));
        self.global(name, JSValue::Object(obj));
        obj
    }
}

// =============================================================================
// Helpers shared by the natives
// =============================================================================

/// Resolve a relative index argument (negative counts from the end)
pub(crate) fn relative_index(
    interp: &mut Interpreter<'_>,
    value: &JSValue,
    len: usize,
    default: usize,
) -> JsResult<usize> {
    if value.is_undefined() {
        return Ok(default);
    }
    let n = interp.to_integer(value)?;
    Ok(if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    })
}

/// Elements of an array-like object
pub(crate) fn array_like_values(interp: &mut Interpreter<'_>, obj: ObjectId) -> JsResult<Vec<JSValue>> {
    let fast = interp
        .runtime()
        .heap()
        .object(obj)
        .array()
        .map(|arr| arr.as_slice().to_vec());
    if let Some(values) = fast {
        return Ok(values);
    }
    let length = interp.length_of(obj)?;
    let mut values = Vec::with_capacity(length.min(1 << 16) as usize);
    for i in 0..length {
        values.push(interp.get(obj, &PropertyKey::Index(i))?);
    }
    Ok(values)
}

/// String value of a function's `name` for diagnostics
pub(crate) fn function_name(interp: &mut Interpreter<'_>, func: ObjectId) -> JsResult<JSString> {
    match interp.get_named(func, "name")? {
        JSValue::String(s) => Ok(s),
        _ => Ok(JSString::from("")),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::parser::parse;
    use crate::runtime::{NoHost, Runtime, ScriptSource};

    /// Evaluate `code` in a fresh realm and stringify the result
    pub fn eval(code: &str) -> Result<String, String> {
        let rt = Runtime::new(EngineConfig::default(), Arc::new(NoHost));
        let realm = rt.create_realm();
        let program = parse(code).map_err(|e| e.to_string())?;
        let source = Arc::new(ScriptSource::anonymous(Arc::from(code)));
        rt.execute(realm, |interp| {
            let value = interp.run_program(&program, source)?;
            interp.to_string(&value).map(|s| s.to_string())
        })
        .map_err(|thrown| thrown.exception.message)
    }

    /// Like [`eval`], panicking on an uncaught exception
    pub fn eval_ok(code: &str) -> String {
        match eval(code) {
            Ok(s) => s,
            Err(message) => panic!("uncaught exception in {:?}: {}", code, message),
        }
    }
}
