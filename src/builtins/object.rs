//! Object constructor and Object.prototype

use crate::builtins::RealmBuilder;
use crate::gc::ObjectId;
use crate::runtime::property::{Property, PropertySlot};
use crate::runtime::{ErrorKind, JSString, JSValue, JsResult, NativeCall, PropertyFlags, PropertyKey};
use crate::vm::Interpreter;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.object_prototype;
    let ctor = b.constructor("Object", 1, object_constructor, proto);

    b.method(ctor, "keys", 1, object_keys);
    b.method(ctor, "values", 1, object_values);
    b.method(ctor, "entries", 1, object_entries);
    b.method(ctor, "create", 2, object_create);
    b.method(ctor, "getPrototypeOf", 1, object_get_prototype_of);
    b.method(ctor, "setPrototypeOf", 2, object_set_prototype_of);
    b.method(ctor, "defineProperty", 3, object_define_property);
    b.method(ctor, "getOwnPropertyNames", 1, object_get_own_property_names);
    b.method(ctor, "getOwnPropertyDescriptor", 2, object_get_own_property_descriptor);
    b.method(ctor, "assign", 2, object_assign);
    b.method(ctor, "freeze", 1, object_freeze);
    b.method(ctor, "isFrozen", 1, object_is_frozen);

    b.method(proto, "hasOwnProperty", 1, proto_has_own_property);
    b.method(proto, "isPrototypeOf", 1, proto_is_prototype_of);
    b.method(proto, "propertyIsEnumerable", 1, proto_property_is_enumerable);
    b.method(proto, "toString", 0, proto_to_string);
    b.method(proto, "toLocaleString", 0, proto_to_string);
    b.method(proto, "valueOf", 0, proto_value_of);
}

fn object_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let value = call.arg(0);
    if value.is_nullish() {
        return Ok(JSValue::Object(interp.new_object()));
    }
    interp.to_object(&value).map(JSValue::Object)
}

fn keys_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<(ObjectId, Vec<PropertyKey>)> {
    let obj = interp.to_object(&call.arg(0))?;
    let keys = interp.own_keys(obj, true)?;
    Ok((obj, keys))
}

fn object_keys(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (_, keys) = keys_of(interp, call)?;
    let names = keys.iter().map(|k| JSValue::String(k.to_js_string())).collect();
    Ok(JSValue::Object(interp.new_array(names)))
}

fn object_values(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, keys) = keys_of(interp, call)?;
    let mut values = Vec::with_capacity(keys.len());
    for key in &keys {
        values.push(interp.get(obj, key)?);
    }
    Ok(JSValue::Object(interp.new_array(values)))
}

fn object_entries(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, keys) = keys_of(interp, call)?;
    let mut entries = Vec::with_capacity(keys.len());
    for key in &keys {
        let value = interp.get(obj, key)?;
        let pair = interp.new_array(vec![JSValue::String(key.to_js_string()), value]);
        entries.push(JSValue::Object(pair));
    }
    Ok(JSValue::Object(interp.new_array(entries)))
}

fn object_create(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let proto = match call.arg(0) {
        JSValue::Object(proto) => Some(proto),
        JSValue::Null => None,
        _ => return interp.throw(ErrorKind::TypeError, "Object prototype may only be an Object or null"),
    };
    let obj = interp.new_object_with_proto(proto);
    if let JSValue::Object(props) = call.arg(1) {
        define_properties(interp, obj, props)?;
    }
    Ok(JSValue::Object(obj))
}

fn define_properties(interp: &mut Interpreter<'_>, obj: ObjectId, props: ObjectId) -> JsResult<()> {
    for key in interp.own_keys(props, true)? {
        let desc = interp.get(props, &key)?;
        define_from_descriptor(interp, obj, key, &desc)?;
    }
    Ok(())
}

fn object_get_prototype_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.arg(0))?;
    let proto = interp.runtime().heap().object(obj).proto;
    Ok(proto.map_or(JSValue::Null, JSValue::Object))
}

fn object_set_prototype_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let target = call.arg(0);
    let proto = match call.arg(1) {
        JSValue::Object(proto) => Some(proto),
        JSValue::Null => None,
        _ => return interp.throw(ErrorKind::TypeError, "Object prototype may only be an Object or null"),
    };
    let Some(obj) = target.as_object() else {
        return Ok(target);
    };
    if !set_prototype(interp, obj, proto) {
        return interp.throw(ErrorKind::TypeError, "Cyclic __proto__ value");
    }
    Ok(target)
}

/// Replace the prototype unless that would create a cycle
pub(crate) fn set_prototype(interp: &mut Interpreter<'_>, obj: ObjectId, proto: Option<ObjectId>) -> bool {
    let mut heap = interp.runtime().heap_mut();
    let mut current = proto;
    while let Some(id) = current {
        if id == obj {
            return false;
        }
        current = heap.object(id).proto;
    }
    heap.object_mut(obj).proto = proto;
    true
}

fn bool_field(interp: &mut Interpreter<'_>, desc: ObjectId, name: &str) -> JsResult<Option<bool>> {
    let key = PropertyKey::from(name);
    if !interp.has_property(desc, &key)? {
        return Ok(None);
    }
    Ok(Some(interp.get(desc, &key)?.to_boolean()))
}

/// Apply a property descriptor object
fn define_from_descriptor(interp: &mut Interpreter<'_>, obj: ObjectId, key: PropertyKey, desc: &JSValue) -> JsResult<()> {
    let Some(desc) = desc.as_object() else {
        return interp.throw(ErrorKind::TypeError, "Property description must be an object");
    };
    let existing = interp.own_property(obj, &key);
    let old_flags = existing.as_ref().map_or(
        PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE,
        |p| p.flags,
    );

    let flag = |set: Option<bool>, bit: PropertyFlags| match set {
        Some(true) => PropertyFlags::NONE,
        Some(false) => bit,
        None if old_flags.contains(bit) => bit,
        None => PropertyFlags::NONE,
    };
    let enumerable = bool_field(interp, desc, "enumerable")?;
    let configurable = bool_field(interp, desc, "configurable")?;
    let flags = flag(enumerable, PropertyFlags::DONT_ENUM) | flag(configurable, PropertyFlags::DONT_DELETE);

    let getter = interp.get_named(desc, "get")?;
    let setter = interp.get_named(desc, "set")?;
    if !getter.is_undefined() || !setter.is_undefined() {
        for accessor in [&getter, &setter] {
            if !accessor.is_undefined() && !interp.is_callable(accessor) {
                return interp.throw(ErrorKind::TypeError, "Getter and setter must be functions");
            }
        }
        interp.define_accessor(obj, key, getter.as_object(), setter.as_object(), flags);
        return Ok(());
    }

    let writable = bool_field(interp, desc, "writable")?;
    let flags = flags | flag(writable, PropertyFlags::READ_ONLY);
    let value_key = PropertyKey::from("value");
    let value = if interp.has_property(desc, &value_key)? {
        interp.get(desc, &value_key)?
    } else {
        match existing.map(|p| p.slot) {
            Some(PropertySlot::Data(value)) => value,
            _ => JSValue::Undefined,
        }
    };
    interp.define_own(obj, key, value, flags);
    Ok(())
}

fn object_define_property(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let target = call.arg(0);
    let Some(obj) = target.as_object() else {
        return interp.throw(ErrorKind::TypeError, "Object.defineProperty called on non-object");
    };
    let key = interp.to_property_key(&call.arg(1))?;
    define_from_descriptor(interp, obj, key, &call.arg(2))?;
    Ok(target)
}

fn object_get_own_property_names(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.arg(0))?;
    let keys = interp.own_keys(obj, false)?;
    let names = keys.iter().map(|k| JSValue::String(k.to_js_string())).collect();
    Ok(JSValue::Object(interp.new_array(names)))
}

fn object_get_own_property_descriptor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.arg(0))?;
    let key = interp.to_property_key(&call.arg(1))?;
    let Some(Property { slot, flags }) = interp.own_property(obj, &key) else {
        return Ok(JSValue::Undefined);
    };
    let desc = interp.new_object();
    match slot {
        PropertySlot::Accessor { getter, setter } => {
            let to_value = |f: Option<ObjectId>| f.map_or(JSValue::Undefined, JSValue::Object);
            interp.put(desc, &"get".into(), to_value(getter))?;
            interp.put(desc, &"set".into(), to_value(setter))?;
        }
        PropertySlot::Data(value) => {
            interp.put(desc, &"value".into(), value)?;
            interp.put(desc, &"writable".into(), JSValue::Bool(!flags.contains(PropertyFlags::READ_ONLY)))?;
        }
        PropertySlot::Host(_) => {
            let value = interp.get(obj, &key)?;
            interp.put(desc, &"value".into(), value)?;
            interp.put(desc, &"writable".into(), JSValue::Bool(!flags.contains(PropertyFlags::READ_ONLY)))?;
        }
    }
    interp.put(desc, &"enumerable".into(), JSValue::Bool(flags.is_enumerable()))?;
    interp.put(desc, &"configurable".into(), JSValue::Bool(!flags.contains(PropertyFlags::DONT_DELETE)))?;
    Ok(JSValue::Object(desc))
}

fn object_assign(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let target = interp.to_object(&call.arg(0))?;
    for source in call.args.iter().skip(1) {
        if source.is_nullish() {
            continue;
        }
        let source = interp.to_object(source)?;
        for key in interp.own_keys(source, true)? {
            let value = interp.get(source, &key)?;
            interp.put(target, &key, value)?;
        }
    }
    Ok(JSValue::Object(target))
}

fn object_freeze(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let target = call.arg(0);
    if let Some(obj) = target.as_object() {
        let mut heap = interp.runtime().heap_mut();
        let object = heap.object_mut(obj);
        object.extensible = false;
        let keys: Vec<PropertyKey> = object.properties.keys().cloned().collect();
        for key in keys {
            if let Some(property) = object.properties.get_mut(&key) {
                property.flags = match property.slot {
                    PropertySlot::Data(_) => property.flags | PropertyFlags::READ_ONLY | PropertyFlags::DONT_DELETE,
                    _ => property.flags | PropertyFlags::DONT_DELETE,
                };
            }
        }
    }
    Ok(target)
}

fn object_is_frozen(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let Some(obj) = call.arg(0).as_object() else {
        return Ok(JSValue::Bool(true));
    };
    let heap = interp.runtime().heap();
    let object = heap.object(obj);
    let frozen = !object.extensible
        && object.properties.iter().all(|(_, p)| {
            p.flags.contains(PropertyFlags::DONT_DELETE)
                && (!matches!(p.slot, PropertySlot::Data(_)) || p.flags.contains(PropertyFlags::READ_ONLY))
        });
    Ok(JSValue::Bool(frozen))
}

fn proto_has_own_property(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let key = interp.to_property_key(&call.arg(0))?;
    let obj = interp.to_object(&call.this)?;
    interp.has_own_property(obj, &key).map(JSValue::Bool)
}

fn proto_is_prototype_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let Some(mut current) = call.arg(0).as_object() else {
        return Ok(JSValue::Bool(false));
    };
    let this = interp.to_object(&call.this)?;
    loop {
        let proto = interp.runtime().heap().object(current).proto;
        match proto {
            Some(proto) if proto == this => return Ok(JSValue::Bool(true)),
            Some(proto) => current = proto,
            None => return Ok(JSValue::Bool(false)),
        }
    }
}

fn proto_property_is_enumerable(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let key = interp.to_property_key(&call.arg(0))?;
    let obj = interp.to_object(&call.this)?;
    let flags = interp.property_attributes(obj, &key)?;
    Ok(JSValue::Bool(flags.is_some_and(PropertyFlags::is_enumerable)))
}

fn proto_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let tag = match &call.this {
        JSValue::Undefined => JSString::from("Undefined"),
        JSValue::Null => JSString::from("Null"),
        this => {
            let obj = interp.to_object(this)?;
            let heap = interp.runtime().heap();
            let object = heap.object(obj);
            match object.host.as_ref().and_then(|h| h.class_name.clone()) {
                Some(name) => name,
                None => JSString::from(object.class.tag()),
            }
        }
    };
    Ok(JSValue::string(format!("[object {}]", tag)))
}

fn proto_value_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    interp.to_object(&call.this).map(JSValue::Object)
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_keys_values_entries() {
        assert_eq!(eval_ok("Object.keys({ b: 1, a: 2, 1: 3 }).join()"), "1,b,a");
        assert_eq!(eval_ok("Object.values({ x: 1, y: 'z' }).join()"), "1,z");
        assert_eq!(eval_ok("JSON.stringify(Object.entries({ k: 1 }))"), "[[\"k\",1]]");
    }

    #[test]
    fn test_define_property() {
        assert_eq!(
            eval_ok("var o = {}; Object.defineProperty(o, 'x', { value: 1 }); o.x = 2; o.x + ':' + Object.keys(o).length"),
            "1:0"
        );
        assert_eq!(
            eval_ok("var o = {}; var n = 0; Object.defineProperty(o, 'g', { get: function () { return ++n; }, enumerable: true }); o.g + o.g"),
            "3"
        );
        assert_eq!(
            eval_ok("var d = Object.getOwnPropertyDescriptor({ a: 1 }, 'a'); [d.value, d.writable, d.enumerable, d.configurable].join()"),
            "1,true,true,true"
        );
    }

    #[test]
    fn test_prototypes() {
        assert_eq!(eval_ok("var p = { hi: 'x' }; var o = Object.create(p); o.hi + Object.getPrototypeOf(o).hi"), "xx");
        assert_eq!(eval_ok("Object.getPrototypeOf(Object.create(null))"), "null");
        assert_eq!(eval("var a = {}; Object.setPrototypeOf(Object.prototype, a)").unwrap_err(), "TypeError: Cyclic __proto__ value");
        assert_eq!(eval_ok("Object.prototype.isPrototypeOf([])"), "true");
    }

    #[test]
    fn test_to_string_tags() {
        assert_eq!(eval_ok("Object.prototype.toString.call([])"), "[object Array]");
        assert_eq!(eval_ok("Object.prototype.toString.call(null)"), "[object Null]");
        assert_eq!(eval_ok("String({})"), "[object Object]");
    }

    #[test]
    fn test_freeze_and_assign() {
        assert_eq!(eval_ok("var o = Object.freeze({ a: 1 }); o.a = 2; o.b = 3; o.a + ':' + o.b + ':' + Object.isFrozen(o)"), "1:undefined:true");
        assert_eq!(eval_ok("var t = Object.assign({ a: 1 }, { b: 2 }, null); t.a + t.b"), "3");
        assert_eq!(eval_ok("({ a: 1 }).hasOwnProperty('a') && !({}).hasOwnProperty('toString')"), "true");
    }
}
