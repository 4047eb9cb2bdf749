//! Error constructors and Error.prototype

use crate::builtins::RealmBuilder;
use crate::runtime::{ErrorKind, JSValue, JsResult, NativeCall, NativeFn, PropertyFlags};
use crate::vm::Interpreter;

pub fn install(b: &mut RealmBuilder<'_>) {
    let constructors: [NativeFn; ErrorKind::COUNT] = [
        error_constructor,
        eval_error_constructor,
        range_error_constructor,
        reference_error_constructor,
        syntax_error_constructor,
        type_error_constructor,
        uri_error_constructor,
    ];
    for (kind, func) in ErrorKind::ALL.into_iter().zip(constructors) {
        let proto = b.intrinsics.error_prototype(kind);
        b.constructor(kind.name(), 1, func, proto);
        b.value(proto, "name", JSValue::string(kind.name()), PropertyFlags::DONT_ENUM);
        b.value(proto, "message", JSValue::string(""), PropertyFlags::DONT_ENUM);
    }
    let base = b.intrinsics.error_prototype(ErrorKind::Error);
    b.method(base, "toString", 0, error_to_string);
}

/// Build an error of `kind`; `Error(msg)` and `new Error(msg)` behave alike
fn construct_error(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, kind: ErrorKind) -> JsResult<JSValue> {
    let message = match call.arg(0) {
        JSValue::Undefined => None,
        other => Some(interp.to_string(&other)?),
    };
    let proto = interp.intrinsics().error_prototype(kind);
    let obj = interp.error_with_proto(proto, kind.name(), message.as_deref());
    Ok(JSValue::Object(obj))
}

fn error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::Error)
}

fn eval_error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::EvalError)
}

fn range_error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::RangeError)
}

fn reference_error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::ReferenceError)
}

fn syntax_error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::SyntaxError)
}

fn type_error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::TypeError)
}

fn uri_error_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    construct_error(interp, call, ErrorKind::UriError)
}

fn error_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let Some(obj) = call.this.as_object() else {
        return interp.throw(ErrorKind::TypeError, "Error.prototype.toString requires that 'this' be an Object");
    };
    let name = match interp.get_named(obj, "name")? {
        JSValue::Undefined => "Error".into(),
        other => interp.to_string(&other)?,
    };
    let message = match interp.get_named(obj, "message")? {
        JSValue::Undefined => "".into(),
        other => interp.to_string(&other)?,
    };
    Ok(JSValue::string(match (name.is_empty(), message.is_empty()) {
        (_, true) => name.to_string(),
        (true, false) => message.to_string(),
        (false, false) => format!("{}: {}", name, message),
    }))
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_constructors() {
        assert_eq!(eval_ok("String(new Error('boom'))"), "Error: boom");
        assert_eq!(eval_ok("String(TypeError('bad'))"), "TypeError: bad");
        assert_eq!(eval_ok("String(new RangeError())"), "RangeError");
        assert_eq!(eval_ok("var e = new SyntaxError('x'); (e instanceof SyntaxError) + ':' + (e instanceof Error)"), "true:true");
        assert_eq!(eval_ok("new Error('m').hasOwnProperty('message') + ':' + new Error().hasOwnProperty('message')"), "true:false");
    }

    #[test]
    fn test_to_string() {
        assert_eq!(eval_ok("var e = new Error('m'); e.name = ''; e.toString()"), "m");
        assert_eq!(eval_ok("Error.prototype.toString.call({ name: 'Custom', message: 'x' })"), "Custom: x");
        assert_eq!(eval_ok("Object.keys(new Error('m')).length"), "0");
    }

    #[test]
    fn test_stack() {
        assert_eq!(eval_ok("new Error('boom').stack.split('\\n')[0]"), "Error: boom");
        assert_eq!(eval("throw new URIError('u')").unwrap_err(), "URIError: u");
    }
}
