//! Array constructor and Array.prototype
//!
//! Mutating methods work on the dense element vector directly and require a
//! real array (or `arguments`) receiver. Read-only and callback methods are
//! generic over array-likes and read elements live, so callbacks observe
//! their own writes.

use std::cmp::Ordering;

use crate::builtins::{RealmBuilder, array_like_values, relative_index};
use crate::gc::ObjectId;
use crate::runtime::{
    ClassId, ErrorKind, JSArray, JSObject, JSString, JSValue, JsResult, MAX_ARRAY_LENGTH,
    NativeCall, ObjectData, PropertyKey,
};
use crate::vm::Interpreter;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.array_prototype;
    let ctor = b.constructor("Array", 1, array_constructor, proto);
    b.method(ctor, "isArray", 1, array_is_array);
    b.method(ctor, "of", 0, array_of);
    b.method(ctor, "from", 1, array_from);

    b.method(proto, "push", 1, array_push);
    b.method(proto, "pop", 0, array_pop);
    b.method(proto, "shift", 0, array_shift);
    b.method(proto, "unshift", 1, array_unshift);
    b.method(proto, "slice", 2, array_slice);
    b.method(proto, "splice", 2, array_splice);
    b.method(proto, "concat", 1, array_concat);
    b.method(proto, "join", 1, array_join);
    b.method(proto, "toString", 0, array_to_string);
    b.method(proto, "reverse", 0, array_reverse);
    b.method(proto, "indexOf", 1, array_index_of);
    b.method(proto, "lastIndexOf", 1, array_last_index_of);
    b.method(proto, "includes", 1, array_includes);
    b.method(proto, "find", 1, array_find);
    b.method(proto, "findIndex", 1, array_find_index);
    b.method(proto, "filter", 1, array_filter);
    b.method(proto, "map", 1, array_map);
    b.method(proto, "forEach", 1, array_for_each);
    b.method(proto, "some", 1, array_some);
    b.method(proto, "every", 1, array_every);
    b.method(proto, "reduce", 1, array_reduce);
    b.method(proto, "reduceRight", 1, array_reduce_right);
    b.method(proto, "sort", 1, array_sort);
    b.method(proto, "fill", 1, array_fill);
    b.method(proto, "at", 1, array_at);
}

fn array_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    if let [JSValue::Number(n)] = call.args {
        let length = *n as u32;
        let arr = match JSArray::with_length(length) {
            Some(arr) if length as f64 == *n => arr,
            _ => return interp.throw(ErrorKind::RangeError, "Invalid array length"),
        };
        let proto = interp.intrinsics().array_prototype;
        let obj = JSObject::with_data(ClassId::Array, Some(proto), ObjectData::Array(arr));
        return Ok(JSValue::Object(interp.alloc(obj)));
    }
    Ok(JSValue::Object(interp.new_array(call.args.to_vec())))
}

fn array_is_array(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let is_array = call
        .arg(0)
        .as_object()
        .is_some_and(|id| interp.runtime().heap().object(id).class == ClassId::Array);
    Ok(JSValue::Bool(is_array))
}

fn array_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Object(interp.new_array(call.args.to_vec())))
}

fn array_from(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let items = call.arg(0);
    let mut values = match &items {
        JSValue::String(s) => s.chars().map(|c| JSValue::string(c.to_string())).collect(),
        JSValue::Undefined | JSValue::Null => {
            return interp.throw(ErrorKind::TypeError, "Array.from requires an array-like object");
        }
        other => {
            let obj = interp.to_object(other)?;
            array_like_values(interp, obj)?
        }
    };
    let map_fn = call.arg(1);
    if !map_fn.is_undefined() {
        if !interp.is_callable(&map_fn) {
            return interp.throw(ErrorKind::TypeError, "Array.from: mapper is not a function");
        }
        for (i, value) in values.iter_mut().enumerate() {
            let args = [value.clone(), JSValue::from(i)];
            *value = interp.call(&map_fn, call.arg(2), &args)?;
        }
    }
    Ok(JSValue::Object(interp.new_array(values)))
}

// =============================================================================
// Mutators
// =============================================================================

/// Run `f` on the receiver's element vector
fn with_array<R>(
    interp: &mut Interpreter<'_>,
    this: &JSValue,
    method: &str,
    f: impl FnOnce(&mut JSArray) -> R,
) -> JsResult<R> {
    let obj = interp.to_object(this)?;
    let outcome = {
        let mut heap = interp.runtime().heap_mut();
        let object = heap.object_mut(obj);
        let extensible = object.extensible;
        match object.array_mut() {
            Some(arr) if extensible => Ok(f(arr)),
            Some(_) => Err("Cannot modify a frozen array"),
            None => Err("receiver is not an array"),
        }
    };
    match outcome {
        Ok(result) => Ok(result),
        Err(reason) => interp.throw(ErrorKind::TypeError, format!("Array.prototype.{}: {}", method, reason)),
    }
}

fn array_push(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let pushed = with_array(interp, &call.this, "push", |arr| {
        if arr.len() as usize + call.args.len() > MAX_ARRAY_LENGTH as usize {
            return None;
        }
        for value in call.args {
            arr.push(value.clone());
        }
        Some(arr.len())
    })?;
    match pushed {
        Some(len) => Ok(JSValue::from(len)),
        None => interp.throw(ErrorKind::RangeError, "Invalid array length"),
    }
}

fn array_pop(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    with_array(interp, &call.this, "pop", |arr| arr.pop().unwrap_or_default())
}

fn array_shift(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    with_array(interp, &call.this, "shift", |arr| arr.shift().unwrap_or_default())
}

fn array_unshift(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let result = with_array(interp, &call.this, "unshift", |arr| arr.unshift(call.args).then(|| arr.len()))?;
    match result {
        Some(len) => Ok(JSValue::from(len)),
        None => interp.throw(ErrorKind::RangeError, "Invalid array length"),
    }
}

fn array_splice(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let len = interp.length_of(obj)? as usize;
    let start = relative_index(interp, &call.arg(0), len, 0)?;
    let delete_count = match call.args.len() {
        0 => 0,
        1 => len - start,
        _ => {
            let n = interp.to_integer(&call.arg(1))?;
            n.clamp(0.0, (len - start) as f64) as usize
        }
    };
    let items = call.args.get(2..).unwrap_or_default().to_vec();
    let removed = with_array(interp, &call.this, "splice", |arr| arr.splice(start, delete_count, items))?;
    Ok(JSValue::Object(interp.new_array(removed)))
}

fn array_reverse(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    with_array(interp, &call.this, "reverse", JSArray::reverse)?;
    Ok(call.this.clone())
}

fn array_fill(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let len = interp.length_of(obj)? as usize;
    let start = relative_index(interp, &call.arg(1), len, 0)?;
    let end = relative_index(interp, &call.arg(2), len, len)?;
    let value = call.arg(0);
    with_array(interp, &call.this, "fill", |arr| {
        for i in start..end.max(start) {
            arr.set(i as u32, value.clone());
        }
    })?;
    Ok(call.this.clone())
}

fn array_sort(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let compare = call.arg(0);
    if !compare.is_undefined() && !interp.is_callable(&compare) {
        return interp.throw(
            ErrorKind::TypeError,
            "The comparison function must be either a function or undefined",
        );
    }
    let obj = interp.to_object(&call.this)?;
    let values = array_like_values(interp, obj)?;
    let (mut defined, undefined): (Vec<JSValue>, Vec<JSValue>) =
        values.into_iter().partition(|v| !v.is_undefined());

    defined = merge_sort(interp, defined, &compare)?;
    defined.extend(undefined);
    with_array(interp, &call.this, "sort", |arr| *arr = JSArray::from_values(defined))?;
    Ok(call.this.clone())
}

fn sort_compare(interp: &mut Interpreter<'_>, compare: &JSValue, a: &JSValue, b: &JSValue) -> JsResult<Ordering> {
    if compare.is_undefined() {
        let a = interp.to_string(a)?;
        let b = interp.to_string(b)?;
        return Ok(a.encode_utf16().cmp(b.encode_utf16()));
    }
    let result = interp.call(compare, JSValue::Undefined, &[a.clone(), b.clone()])?;
    let n = interp.to_number(&result)?;
    Ok(n.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
}

/// Stable bottom-up merge sort with a comparator that may throw
fn merge_sort(interp: &mut Interpreter<'_>, mut values: Vec<JSValue>, compare: &JSValue) -> JsResult<Vec<JSValue>> {
    let n = values.len();
    let mut width = 1;
    while width < n {
        let mut merged = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                if sort_compare(interp, compare, &values[j], &values[i])? == Ordering::Less {
                    merged.push(values[j].clone());
                    j += 1;
                } else {
                    merged.push(values[i].clone());
                    i += 1;
                }
            }
            merged.extend_from_slice(&values[i..mid]);
            merged.extend_from_slice(&values[j..end]);
            start = end;
        }
        values = merged;
        width *= 2;
    }
    Ok(values)
}

// =============================================================================
// Accessors
// =============================================================================

fn array_slice(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let values = array_like_values(interp, obj)?;
    let len = values.len();
    let start = relative_index(interp, &call.arg(0), len, 0)?;
    let end = relative_index(interp, &call.arg(1), len, len)?;
    let slice = values.get(start..end.max(start)).unwrap_or_default().to_vec();
    Ok(JSValue::Object(interp.new_array(slice)))
}

fn array_concat(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let mut values = array_like_values(interp, obj)?;
    for arg in call.args {
        let spread = arg
            .as_object()
            .filter(|id| interp.runtime().heap().object(*id).class == ClassId::Array);
        match spread {
            Some(id) => values.extend(array_like_values(interp, id)?),
            None => values.push(arg.clone()),
        }
        if values.len() > MAX_ARRAY_LENGTH as usize {
            return interp.throw(ErrorKind::RangeError, "Invalid array length");
        }
    }
    Ok(JSValue::Object(interp.new_array(values)))
}

/// `join`, yielding an empty string for arrays already being joined
pub(crate) fn join(interp: &mut Interpreter<'_>, obj: ObjectId, separator: &str) -> JsResult<JSString> {
    if interp.joining.contains(&obj) {
        return Ok(JSString::from(""));
    }
    interp.joining.push(obj);
    let result = join_values(interp, obj, separator);
    interp.joining.pop();
    result
}

fn join_values(interp: &mut Interpreter<'_>, obj: ObjectId, separator: &str) -> JsResult<JSString> {
    let values = array_like_values(interp, obj)?;
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        if !value.is_nullish() {
            out.push_str(&interp.to_string(value)?);
        }
    }
    Ok(JSString::from(out))
}

fn array_join(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let separator = match call.arg(0) {
        JSValue::Undefined => JSString::from(","),
        other => interp.to_string(&other)?,
    };
    join(interp, obj, &separator).map(JSValue::String)
}

fn array_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    join(interp, obj, ",").map(JSValue::String)
}

fn array_index_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let values = array_like_values(interp, obj)?;
    let start = relative_index(interp, &call.arg(1), values.len(), 0)?;
    let target = call.arg(0);
    let found = values
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, v)| v.strict_equals(&target))
        .map(|(i, _)| i as f64);
    Ok(JSValue::Number(found.unwrap_or(-1.0)))
}

fn array_last_index_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let values = array_like_values(interp, obj)?;
    if values.is_empty() {
        return Ok(JSValue::Number(-1.0));
    }
    let from = match call.args.get(1) {
        Some(value) => {
            let n = interp.to_integer(value)?;
            if n < 0.0 { values.len() as f64 + n } else { n.min(values.len() as f64 - 1.0) }
        }
        None => values.len() as f64 - 1.0,
    };
    if from < 0.0 {
        return Ok(JSValue::Number(-1.0));
    }
    let target = call.arg(0);
    let found = values[..=from as usize]
        .iter()
        .rposition(|v| v.strict_equals(&target))
        .map(|i| i as f64);
    Ok(JSValue::Number(found.unwrap_or(-1.0)))
}

fn array_includes(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let values = array_like_values(interp, obj)?;
    let start = relative_index(interp, &call.arg(1), values.len(), 0)?;
    let target = call.arg(0);
    Ok(JSValue::Bool(values.iter().skip(start).any(|v| v.same_value_zero(&target))))
}

fn array_at(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let len = interp.length_of(obj)? as f64;
    let n = interp.to_integer(&call.arg(0))?;
    let index = if n < 0.0 { len + n } else { n };
    if index < 0.0 || index >= len {
        return Ok(JSValue::Undefined);
    }
    interp.get(obj, &PropertyKey::Index(index as u32))
}

// =============================================================================
// Iteration
// =============================================================================

/// Receiver, its length and the callback of an iteration method
fn iteration(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<(ObjectId, u32, JSValue)> {
    let obj = interp.to_object(&call.this)?;
    let len = interp.length_of(obj)?;
    let callback = call.arg(0);
    if !interp.is_callable(&callback) {
        let desc = interp.describe_value(&callback);
        return interp.throw(ErrorKind::TypeError, format!("{} is not a function", desc));
    }
    Ok((obj, len, callback))
}

/// Call the callback for element `i`, skipping indices past the live end
fn visit(
    interp: &mut Interpreter<'_>,
    call: &NativeCall<'_>,
    obj: ObjectId,
    callback: &JSValue,
    i: u32,
) -> JsResult<Option<(JSValue, JSValue)>> {
    if i >= interp.length_of(obj)? {
        return Ok(None);
    }
    let value = interp.get(obj, &PropertyKey::Index(i))?;
    let args = [value.clone(), JSValue::from(i), JSValue::Object(obj)];
    let result = interp.call(callback, call.arg(1), &args)?;
    Ok(Some((value, result)))
}

fn array_for_each(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, len, callback) = iteration(interp, call)?;
    for i in 0..len {
        visit(interp, call, obj, &callback, i)?;
    }
    Ok(JSValue::Undefined)
}

fn array_map(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, len, callback) = iteration(interp, call)?;
    let mut mapped = Vec::with_capacity(len as usize);
    for i in 0..len {
        let result = visit(interp, call, obj, &callback, i)?;
        mapped.push(result.map(|(_, r)| r).unwrap_or_default());
    }
    Ok(JSValue::Object(interp.new_array(mapped)))
}

fn array_filter(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, len, callback) = iteration(interp, call)?;
    let mut kept = Vec::new();
    for i in 0..len {
        if let Some((value, result)) = visit(interp, call, obj, &callback, i)? {
            if result.to_boolean() {
                kept.push(value);
            }
        }
    }
    Ok(JSValue::Object(interp.new_array(kept)))
}

/// First element whose callback result is truthy
fn find_first(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<Option<(u32, JSValue)>> {
    let (obj, len, callback) = iteration(interp, call)?;
    for i in 0..len {
        if let Some((value, result)) = visit(interp, call, obj, &callback, i)? {
            if result.to_boolean() {
                return Ok(Some((i, value)));
            }
        }
    }
    Ok(None)
}

fn array_find(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(find_first(interp, call)?.map(|(_, v)| v).unwrap_or_default())
}

fn array_find_index(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Number(find_first(interp, call)?.map_or(-1.0, |(i, _)| i as f64)))
}

fn array_some(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(find_first(interp, call)?.is_some()))
}

fn array_every(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let (obj, len, callback) = iteration(interp, call)?;
    for i in 0..len {
        if let Some((_, result)) = visit(interp, call, obj, &callback, i)? {
            if !result.to_boolean() {
                return Ok(JSValue::Bool(false));
            }
        }
    }
    Ok(JSValue::Bool(true))
}

fn reduce(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, indices: Vec<u32>) -> JsResult<JSValue> {
    let (obj, _, callback) = iteration(interp, call)?;
    let mut indices = indices.into_iter();
    let mut acc = match call.args.get(1) {
        Some(initial) => initial.clone(),
        None => match indices.next() {
            Some(first) => interp.get(obj, &PropertyKey::Index(first))?,
            None => return interp.throw(ErrorKind::TypeError, "Reduce of empty array with no initial value"),
        },
    };
    for i in indices {
        let value = interp.get(obj, &PropertyKey::Index(i))?;
        let args = [acc, value, JSValue::from(i), JSValue::Object(obj)];
        acc = interp.call(&callback, JSValue::Undefined, &args)?;
    }
    Ok(acc)
}

fn array_reduce(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let len = interp.length_of(obj)?;
    reduce(interp, call, (0..len).collect())
}

fn array_reduce_right(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let obj = interp.to_object(&call.this)?;
    let len = interp.length_of(obj)?;
    reduce(interp, call, (0..len).rev().collect())
}
