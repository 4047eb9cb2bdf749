//! Global functions and value properties

use crate::builtins::RealmBuilder;
use crate::builtins::number::{parse_float, parse_int};
use crate::runtime::{ErrorKind, JSValue, JsResult, NativeCall, PropertyFlags};
use crate::vm::Interpreter;

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics
const URI_UNRESERVED: &[u8] = b"-_.!~*'()";

pub fn install(b: &mut RealmBuilder<'_>) {
    let global = b.global;
    let constant = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM | PropertyFlags::DONT_DELETE;
    b.value(global, "undefined", JSValue::Undefined, constant);
    b.value(global, "NaN", JSValue::Number(f64::NAN), constant);
    b.value(global, "Infinity", JSValue::Number(f64::INFINITY), constant);
    b.global("globalThis", JSValue::Object(global));

    b.method(global, "parseInt", 2, parse_int);
    b.method(global, "parseFloat", 1, parse_float);
    b.method(global, "isNaN", 1, global_is_nan);
    b.method(global, "isFinite", 1, global_is_finite);
    b.method(global, "encodeURIComponent", 1, global_encode_uri_component);
    b.method(global, "decodeURIComponent", 1, global_decode_uri_component);
}

fn global_is_nan(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(interp.to_number(&call.arg(0))?.is_nan()))
}

fn global_is_finite(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(interp.to_number(&call.arg(0))?.is_finite()))
}

fn global_encode_uri_component(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = interp.to_string(&call.arg(0))?;
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || URI_UNRESERVED.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    Ok(JSValue::string(out))
}

fn global_decode_uri_component(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = interp.to_string(&call.arg(0))?;
    match percent_decode(&s) {
        Some(decoded) => Ok(JSValue::string(decoded)),
        None => interp.throw(ErrorKind::UriError, "URI malformed"),
    }
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::percent_decode;
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_value_properties() {
        assert_eq!(eval_ok("typeof undefined + ':' + (NaN !== NaN) + ':' + (Infinity > 1e308)"), "undefined:true:true");
        assert_eq!(eval_ok("undefined = 1; typeof undefined"), "undefined");
        assert_eq!(eval_ok("globalThis.Math === Math"), "true");
        assert_eq!(eval_ok("var g = 5; globalThis.g"), "5");
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval_ok("parseInt('0x10') + parseInt('12abc') + parseFloat('.5e1')"), "33");
        assert_eq!(eval_ok("isNaN('abc') + ':' + isFinite('12')"), "true:true");
        assert_eq!(eval_ok("encodeURIComponent('a b&中')"), "a%20b%26%E4%B8%AD");
        assert_eq!(eval_ok("decodeURIComponent('a%20b%26%E4%B8%AD')"), "a b&中");
        assert_eq!(eval("decodeURIComponent('%E4')").unwrap_err(), "URIError: URI malformed");
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("%41%42c").as_deref(), Some("ABc"));
        assert_eq!(percent_decode("%4"), None);
        assert_eq!(percent_decode("%zz"), None);
    }
}
