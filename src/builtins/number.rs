//! Number and Boolean constructors and prototypes

use crate::builtins::RealmBuilder;
use crate::runtime::{
    ClassId, ErrorKind, JSObject, JSValue, JsResult, NativeCall, ObjectData, PropertyFlags,
};
use crate::util::dtoa::{number_to_fixed, number_to_radix_string, number_to_string, parse_float_prefix};
use crate::util::is_js_whitespace;
use crate::vm::Interpreter;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.number_prototype;
    let ctor = b.constructor("Number", 1, number_constructor, proto);
    b.method(ctor, "isInteger", 1, number_is_integer);
    b.method(ctor, "isFinite", 1, number_is_finite);
    b.method(ctor, "isNaN", 1, number_is_nan);
    b.method(ctor, "isSafeInteger", 1, number_is_safe_integer);
    b.method(ctor, "parseFloat", 1, parse_float);
    b.method(ctor, "parseInt", 2, parse_int);

    let constant = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE;
    for (name, value) in [
        ("MAX_SAFE_INTEGER", MAX_SAFE_INTEGER),
        ("MIN_SAFE_INTEGER", -MAX_SAFE_INTEGER),
        ("EPSILON", f64::EPSILON),
        ("MAX_VALUE", f64::MAX),
        ("MIN_VALUE", 5e-324),
        ("POSITIVE_INFINITY", f64::INFINITY),
        ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
        ("NaN", f64::NAN),
    ] {
        b.value(ctor, name, JSValue::Number(value), constant);
    }

    b.method(proto, "toString", 1, number_to_string_method);
    b.method(proto, "toFixed", 1, number_to_fixed_method);
    b.method(proto, "valueOf", 0, number_value_of);

    let proto = b.intrinsics.boolean_prototype;
    b.constructor("Boolean", 1, boolean_constructor, proto);
    b.method(proto, "toString", 0, boolean_to_string);
    b.method(proto, "valueOf", 0, boolean_value_of);
}

/// Wrap a primitive in its boxed object
fn boxed(interp: &mut Interpreter<'_>, class: ClassId, value: JSValue) -> JSValue {
    let intrinsics = interp.intrinsics();
    let proto = match class {
        ClassId::Boolean => intrinsics.boolean_prototype,
        _ => intrinsics.number_prototype,
    };
    let obj = JSObject::with_data(class, Some(proto), ObjectData::Primitive(value));
    JSValue::Object(interp.alloc(obj))
}

/// The primitive behind a receiver of the given class
fn this_primitive(interp: &Interpreter<'_>, this: &JSValue, class: ClassId) -> Option<JSValue> {
    match (this, class) {
        (JSValue::Number(_), ClassId::Number) | (JSValue::Bool(_), ClassId::Boolean) => Some(this.clone()),
        (JSValue::Object(id), _) => {
            let heap = interp.runtime().heap();
            let obj = heap.object(*id);
            match &obj.data {
                ObjectData::Primitive(value) if obj.class == class => Some(value.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn this_number(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str) -> JsResult<f64> {
    match this_primitive(interp, &call.this, ClassId::Number) {
        Some(JSValue::Number(n)) => Ok(n),
        _ => interp.throw(
            ErrorKind::TypeError,
            format!("Number.prototype.{} requires that 'this' be a Number", method),
        ),
    }
}

fn number_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let n = match call.args.first() {
        Some(arg) => interp.to_number(arg)?,
        None => 0.0,
    };
    if call.construct {
        return Ok(boxed(interp, ClassId::Number, JSValue::Number(n)));
    }
    Ok(JSValue::Number(n))
}

fn number_is_integer(_: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let result = matches!(call.arg(0), JSValue::Number(n) if n.is_finite() && n.trunc() == n);
    Ok(JSValue::Bool(result))
}

fn number_is_finite(_: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(matches!(call.arg(0), JSValue::Number(n) if n.is_finite())))
}

fn number_is_nan(_: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(matches!(call.arg(0), JSValue::Number(n) if n.is_nan())))
}

fn number_is_safe_integer(_: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let result = matches!(call.arg(0), JSValue::Number(n) if n.trunc() == n && n.abs() <= MAX_SAFE_INTEGER);
    Ok(JSValue::Bool(result))
}

pub(crate) fn parse_float(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = interp.to_string(&call.arg(0))?;
    Ok(JSValue::Number(parse_float_prefix(&s)))
}

pub(crate) fn parse_int(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = interp.to_string(&call.arg(0))?;
    let radix = interp.to_int32(&call.arg(1))?;
    Ok(JSValue::Number(parse_int_str(&s, radix)))
}

/// `parseInt` on an already converted string; radix 0 means auto-detect
fn parse_int_str(s: &str, radix: i32) -> f64 {
    let mut t = s.trim_start_matches(is_js_whitespace);
    let negative = t.starts_with('-');
    if negative || t.starts_with('+') {
        t = &t[1..];
    }
    let mut radix = radix as u32;
    if radix != 0 && !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let hex = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X"));
    if let Some(rest) = hex.filter(|_| radix == 0 || radix == 16) {
        t = rest;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }

    let mut value = 0.0f64;
    let mut any = false;
    for c in t.chars() {
        match c.to_digit(radix) {
            Some(d) => {
                value = value * radix as f64 + d as f64;
                any = true;
            }
            None => break,
        }
    }
    if !any {
        return f64::NAN;
    }
    // Long decimal strings accumulate rounding error digit by digit
    if radix == 10 && value >= 1e15 {
        let digits: String = t.chars().take_while(char::is_ascii_digit).collect();
        value = digits.parse().unwrap_or(value);
    }
    if negative { -value } else { value }
}

fn number_to_string_method(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let n = this_number(interp, call, "toString")?;
    let radix = match call.arg(0) {
        JSValue::Undefined => 10.0,
        other => interp.to_integer(&other)?,
    };
    if !(2.0..=36.0).contains(&radix) {
        return interp.throw(ErrorKind::RangeError, "toString() radix must be between 2 and 36");
    }
    let s = if radix == 10.0 {
        number_to_string(n)
    } else {
        number_to_radix_string(n, radix as u32)
    };
    Ok(JSValue::string(s))
}

fn number_to_fixed_method(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let n = this_number(interp, call, "toFixed")?;
    let digits = interp.to_integer(&call.arg(0))?;
    if !(0.0..=100.0).contains(&digits) {
        return interp.throw(ErrorKind::RangeError, "toFixed() digits argument must be between 0 and 100");
    }
    Ok(JSValue::string(number_to_fixed(n, digits as usize)))
}

fn number_value_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    this_number(interp, call, "valueOf").map(JSValue::Number)
}

// =============================================================================
// Boolean
// =============================================================================

fn boolean_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let value = JSValue::Bool(call.arg(0).to_boolean());
    if call.construct {
        return Ok(boxed(interp, ClassId::Boolean, value));
    }
    Ok(value)
}

fn this_boolean(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str) -> JsResult<bool> {
    match this_primitive(interp, &call.this, ClassId::Boolean) {
        Some(JSValue::Bool(b)) => Ok(b),
        _ => interp.throw(
            ErrorKind::TypeError,
            format!("Boolean.prototype.{} requires that 'this' be a Boolean", method),
        ),
    }
}

fn boolean_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let b = this_boolean(interp, call, "toString")?;
    Ok(JSValue::string(if b { "true" } else { "false" }))
}

fn boolean_value_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    this_boolean(interp, call, "valueOf").map(JSValue::Bool)
}

#[cfg(test)]
mod tests {
    use super::parse_int_str;
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int_str("  42px", 0), 42.0);
        assert_eq!(parse_int_str("-0x1F", 0), -31.0);
        assert_eq!(parse_int_str("ff", 16), 255.0);
        assert_eq!(parse_int_str("101", 2), 5.0);
        assert!(parse_int_str("z", 10).is_nan());
        assert!(parse_int_str("1", 1).is_nan());
        assert_eq!(parse_int_str("9007199254740993", 10), 9007199254740992.0);
    }

    #[test]
    fn test_constructor_and_statics() {
        assert_eq!(eval_ok("Number('12') + Number()"), "12");
        assert_eq!(eval_ok("typeof new Number(1) + ':' + (new Number(5) + 1)"), "object:6");
        assert_eq!(eval_ok("Number.isInteger(5) + ':' + Number.isInteger(5.5) + ':' + Number.isInteger('5')"), "true:false:false");
        assert_eq!(eval_ok("Number.isNaN(NaN) + ':' + Number.isNaN('x')"), "true:false");
        assert_eq!(eval_ok("Number.isSafeInteger(Number.MAX_SAFE_INTEGER) + ':' + Number.isSafeInteger(Number.MAX_SAFE_INTEGER + 1)"), "true:false");
        assert_eq!(eval_ok("Number.parseFloat('3.5e1x')"), "35");
    }

    #[test]
    fn test_prototype() {
        assert_eq!(eval_ok("(255).toString(16) + ':' + (255).toString(2)"), "ff:11111111");
        assert_eq!(eval_ok("(1.005).toFixed(1) + ':' + (3).toFixed(2)"), "1.0:3.00");
        assert_eq!(eval("(1).toString(1)").unwrap_err(), "RangeError: toString() radix must be between 2 and 36");
        assert_eq!(eval("Number.prototype.valueOf.call('x')").unwrap_err(), "TypeError: Number.prototype.valueOf requires that 'this' be a Number");
    }

    #[test]
    fn test_boolean() {
        assert_eq!(eval_ok("Boolean('') + ':' + Boolean('x')"), "false:true");
        assert_eq!(eval_ok("var b = new Boolean(false); (b ? 'truthy' : 'falsy') + ':' + b.valueOf()"), "truthy:false");
        assert_eq!(eval_ok("true.toString()"), "true");
    }
}
