//! ArrayBuffer and Uint8Array
//!
//! Buffer memory is obtained from the process-wide allocator hook, so an
//! embedder that installs its own allocator sees every script allocation.

use crate::allocator::BufferData;
use crate::builtins::array::join;
use crate::builtins::{RealmBuilder, array_like_values, relative_index};
use crate::gc::ObjectId;
use crate::runtime::object::TypedView;
use crate::runtime::{
    ClassId, ErrorKind, JSObject, JSValue, JsResult, NativeCall, ObjectData, PropertyFlags, PropertyKey,
};
use crate::util::dtoa::to_uint32;
use crate::vm::Interpreter;

/// Largest buffer scripts may request
const MAX_BYTE_LENGTH: f64 = (1u64 << 32) as f64;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.array_buffer_prototype;
    let ctor = b.constructor("ArrayBuffer", 1, array_buffer_constructor, proto);
    b.method(ctor, "isView", 1, array_buffer_is_view);
    b.method(proto, "slice", 2, array_buffer_slice);

    let proto = b.intrinsics.uint8_array_prototype;
    let ctor = b.constructor("Uint8Array", 3, uint8_array_constructor, proto);
    let constant = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE;
    b.value(ctor, "BYTES_PER_ELEMENT", JSValue::from(1), constant);
    b.method(proto, "subarray", 2, uint8_array_subarray);
    b.method(proto, "set", 1, uint8_array_set);
    b.method(proto, "fill", 1, uint8_array_fill);
    b.method(proto, "join", 1, uint8_array_join);
    b.method(proto, "toString", 0, uint8_array_to_string);
}

fn require_new(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, name: &str) -> JsResult<()> {
    if call.construct {
        Ok(())
    } else {
        interp.throw(ErrorKind::TypeError, format!("Constructor {} requires 'new'", name))
    }
}

/// Allocate a new `ArrayBuffer` of `length` zeroed bytes
fn new_buffer(interp: &mut Interpreter<'_>, length: usize) -> JsResult<ObjectId> {
    let Some(data) = BufferData::allocate(length) else {
        return interp.throw(ErrorKind::RangeError, "Array buffer allocation failed");
    };
    let proto = interp.intrinsics().array_buffer_prototype;
    let obj = JSObject::with_data(ClassId::ArrayBuffer, Some(proto), ObjectData::ArrayBuffer(data));
    Ok(interp.alloc(obj))
}

fn new_view(interp: &mut Interpreter<'_>, view: TypedView) -> ObjectId {
    let proto = interp.intrinsics().uint8_array_prototype;
    interp.alloc(JSObject::with_data(ClassId::Uint8Array, Some(proto), ObjectData::Uint8Array(view)))
}

fn byte_length(interp: &mut Interpreter<'_>, value: &JSValue) -> JsResult<usize> {
    let n = interp.to_integer(value)?;
    if !(0.0..=MAX_BYTE_LENGTH).contains(&n) {
        return interp.throw(ErrorKind::RangeError, "Invalid array buffer length");
    }
    Ok(n as usize)
}

fn buffer_len(interp: &Interpreter<'_>, obj: ObjectId) -> Option<usize> {
    match &interp.runtime().heap().object(obj).data {
        ObjectData::ArrayBuffer(buf) => Some(buf.len()),
        _ => None,
    }
}

fn this_view(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str) -> JsResult<(ObjectId, TypedView)> {
    let view = call.this.as_object().and_then(|id| match &interp.runtime().heap().object(id).data {
        ObjectData::Uint8Array(view) => Some((id, *view)),
        _ => None,
    });
    match view {
        Some(view) => Ok(view),
        None => interp.throw(
            ErrorKind::TypeError,
            format!("Uint8Array.prototype.{} called on incompatible receiver", method),
        ),
    }
}

fn array_buffer_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    require_new(interp, call, "ArrayBuffer")?;
    let length = byte_length(interp, &call.arg(0))?;
    new_buffer(interp, length).map(JSValue::Object)
}

fn array_buffer_is_view(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let is_view = call
        .arg(0)
        .as_object()
        .is_some_and(|id| interp.runtime().heap().object(id).class == ClassId::Uint8Array);
    Ok(JSValue::Bool(is_view))
}

fn array_buffer_slice(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let source = call.this.as_object();
    let Some((source, len)) = source.and_then(|id| Some((id, buffer_len(interp, id)?))) else {
        return interp.throw(ErrorKind::TypeError, "ArrayBuffer.prototype.slice called on incompatible receiver");
    };
    let start = relative_index(interp, &call.arg(0), len, 0)?;
    let end = relative_index(interp, &call.arg(1), len, len)?.max(start);
    let copy = new_buffer(interp, end - start)?;

    let mut heap = interp.runtime().heap_mut();
    let bytes = match &heap.object(source).data {
        ObjectData::ArrayBuffer(buf) => buf.bytes()[start..end].to_vec(),
        _ => Vec::new(),
    };
    if let ObjectData::ArrayBuffer(buf) = &mut heap.object_mut(copy).data {
        buf.bytes_mut().copy_from_slice(&bytes);
    }
    Ok(JSValue::Object(copy))
}

fn uint8_array_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    require_new(interp, call, "Uint8Array")?;
    let first = call.arg(0);
    let Some(obj) = first.as_object() else {
        let length = byte_length(interp, &first)?;
        let buffer = new_buffer(interp, length)?;
        return Ok(JSValue::Object(new_view(interp, TypedView { buffer, offset: 0, length })));
    };

    if let Some(buffer_length) = buffer_len(interp, obj) {
        let offset = byte_length(interp, &call.arg(1))?;
        if offset > buffer_length {
            return interp.throw(
                ErrorKind::RangeError,
                format!("Start offset {} is outside the bounds of the buffer", offset),
            );
        }
        let length = match call.arg(2) {
            JSValue::Undefined => buffer_length - offset,
            other => byte_length(interp, &other)?,
        };
        if offset + length > buffer_length {
            return interp.throw(ErrorKind::RangeError, format!("Invalid typed array length: {}", length));
        }
        let view = TypedView { buffer: obj, offset, length };
        return Ok(JSValue::Object(new_view(interp, view)));
    }

    let values = array_like_values(interp, obj)?;
    let mut bytes = Vec::with_capacity(values.len());
    for value in &values {
        bytes.push(to_uint32(interp.to_number(value)?) as u8);
    }
    let buffer = new_buffer(interp, bytes.len())?;
    if let ObjectData::ArrayBuffer(buf) = &mut interp.runtime().heap_mut().object_mut(buffer).data {
        buf.bytes_mut().copy_from_slice(&bytes);
    }
    let view = TypedView { buffer, offset: 0, length: bytes.len() };
    Ok(JSValue::Object(new_view(interp, view)))
}

fn uint8_array_subarray(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (_, view) = this_view(interp, call, "subarray")?;
    let start = relative_index(interp, &call.arg(0), view.length, 0)?;
    let end = relative_index(interp, &call.arg(1), view.length, view.length)?.max(start);
    let sub = TypedView {
        buffer: view.buffer,
        offset: view.offset + start,
        length: end - start,
    };
    Ok(JSValue::Object(new_view(interp, sub)))
}

fn uint8_array_set(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (target, view) = this_view(interp, call, "set")?;
    let Some(source) = call.arg(0).as_object() else {
        return interp.throw(ErrorKind::TypeError, "Uint8Array.prototype.set: source must be an object");
    };
    let offset = interp.to_integer(&call.arg(1))?;
    let values = array_like_values(interp, source)?;
    if offset < 0.0 || offset as usize + values.len() > view.length {
        return interp.throw(ErrorKind::RangeError, "offset is out of bounds");
    }
    for (i, value) in values.into_iter().enumerate() {
        interp.put(target, &PropertyKey::Index((offset as usize + i) as u32), value)?;
    }
    Ok(JSValue::Undefined)
}

fn uint8_array_fill(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (_, view) = this_view(interp, call, "fill")?;
    let byte = to_uint32(interp.to_number(&call.arg(0))?) as u8;
    let start = relative_index(interp, &call.arg(1), view.length, 0)?;
    let end = relative_index(interp, &call.arg(2), view.length, view.length)?.max(start);
    if let ObjectData::ArrayBuffer(buf) = &mut interp.runtime().heap_mut().object_mut(view.buffer).data {
        if let Some(range) = buf.bytes_mut().get_mut(view.offset + start..view.offset + end) {
            range.fill(byte);
        }
    }
    Ok(call.this.clone())
}

fn uint8_array_join(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, _) = this_view(interp, call, "join")?;
    let separator = match call.arg(0) {
        JSValue::Undefined => ",".into(),
        other => interp.to_string(&other)?,
    };
    join(interp, obj, &separator).map(JSValue::String)
}

fn uint8_array_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, _) = this_view(interp, call, "toString")?;
    join(interp, obj, ",").map(JSValue::String)
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_array_buffer() {
        assert_eq!(eval_ok("new ArrayBuffer(8).byteLength"), "8");
        assert_eq!(eval_ok("var b = new Uint8Array([1, 2, 3, 4]).buffer.slice(1, 3); new Uint8Array(b).join()"), "2,3");
        assert_eq!(eval("new ArrayBuffer(-1)").unwrap_err(), "RangeError: Invalid array buffer length");
        assert_eq!(eval("ArrayBuffer(1)").unwrap_err(), "TypeError: Constructor ArrayBuffer requires 'new'");
    }

    #[test]
    fn test_uint8_array() {
        assert_eq!(eval_ok("var a = new Uint8Array(3); a[0] = 257; a[1] = -1; a[5] = 9; a.join() + ':' + a.length"), "1,255,0:3");
        assert_eq!(eval_ok("var a = new Uint8Array([1, 2, 3]); var total = 0; for (var x of a) total += x; total"), "6");
        assert_eq!(eval_ok("var buf = new ArrayBuffer(4); var a = new Uint8Array(buf, 1, 2); a[0] = 7; new Uint8Array(buf).join()"), "0,7,0,0");
        assert_eq!(eval_ok("var a = new Uint8Array([1, 2, 3, 4]); var s = a.subarray(1, 3); s[0] = 9; a.join() + ':' + s.byteOffset"), "1,9,3,4:1");
        assert_eq!(eval_ok("var a = new Uint8Array(4); a.set([5, 6], 1); a.fill(1, 3); String(a)"), "0,5,6,1");
        assert_eq!(eval("new Uint8Array(new ArrayBuffer(2), 3)").unwrap_err(), "RangeError: Start offset 3 is outside the bounds of the buffer");
        assert_eq!(eval_ok("ArrayBuffer.isView(new Uint8Array(1)) + ':' + ArrayBuffer.isView([])"), "true:false");
    }
}
