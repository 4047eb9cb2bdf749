//! Function constructor and Function.prototype

use std::sync::Arc;

use crate::builtins::{RealmBuilder, array_like_values, function_name};
use crate::parser::parse;
use crate::runtime::function::BoundFunction;
use crate::runtime::{
    ClassId, ErrorKind, FunctionKind, JSObject, JSValue, JsResult, NativeCall, ObjectData,
    PropertyFlags, ScriptSource,
};
use crate::vm::Interpreter;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.function_prototype;
    b.value(proto, "length", JSValue::from(0), PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM);
    b.value(proto, "name", JSValue::string(""), PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM);
    b.constructor("Function", 1, function_constructor, proto);

    b.method(proto, "call", 1, function_call);
    b.method(proto, "apply", 2, function_apply);
    b.method(proto, "bind", 1, function_bind);
    b.method(proto, "toString", 0, function_to_string);
}

/// `Function(p1, ..., body)` compiles its arguments in the global scope
fn function_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let mut parts = Vec::with_capacity(call.args.len());
    for arg in call.args {
        parts.push(interp.to_string(arg)?.to_string());
    }
    let body = parts.pop().unwrap_or_default();
    let text = format!("(function anonymous({}\n) {{\n{}\n}})", parts.join(","), body);

    let program = match parse(&text) {
        Ok(program) => program,
        Err(e) => return interp.throw(ErrorKind::SyntaxError, e.message),
    };
    let source = Arc::new(ScriptSource::anonymous(Arc::from(text)));
    interp.run_program(&program, source)
}

fn function_call(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let args = call.args.get(1..).unwrap_or_default();
    interp.call(&call.this, call.arg(0), args)
}

fn function_apply(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let args = match call.arg(1) {
        JSValue::Undefined | JSValue::Null => Vec::new(),
        JSValue::Object(list) => array_like_values(interp, list)?,
        _ => return interp.throw(ErrorKind::TypeError, "CreateListFromArrayLike called on non-object"),
    };
    interp.call(&call.this, call.arg(0), &args)
}

fn function_bind(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let target = match &call.this {
        JSValue::Object(id) if interp.is_callable(&call.this) => *id,
        _ => return interp.throw(ErrorKind::TypeError, "Bind must be called on a function"),
    };
    let bound_args = call.args.get(1..).unwrap_or_default().to_vec();
    let name = function_name(interp, target)?;
    let target_length = match interp.get_named(target, "length")? {
        JSValue::Number(n) => n,
        _ => 0.0,
    };
    let length = (target_length - bound_args.len() as f64).max(0.0);

    let proto = interp.intrinsics().function_prototype;
    let mut obj = JSObject::with_data(
        ClassId::Function,
        Some(proto),
        ObjectData::Function(FunctionKind::Bound(Box::new(BoundFunction {
            target,
            this: call.arg(0),
            args: bound_args,
        }))),
    );
    obj.realm = Some(interp.realm());
    let hidden = PropertyFlags::READ_ONLY | PropertyFlags::DONT_ENUM;
    obj.define_value("length".into(), JSValue::Number(length), hidden);
    obj.define_value("name".into(), JSValue::string(format!("bound {}", name)), hidden);
    Ok(JSValue::Object(interp.alloc(obj)))
}

fn function_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let Some(id) = call.this.as_object().filter(|_| interp.is_callable(&call.this)) else {
        return interp.throw(ErrorKind::TypeError, "Function.prototype.toString requires that 'this' be a Function");
    };
    let text = {
        let heap = interp.runtime().heap();
        match heap.object(id).function_kind() {
            Some(FunctionKind::Closure(closure)) => {
                let (start, end) = closure.node.span;
                closure.source.text.get(start..end).map(str::to_string)
            }
            _ => None,
        }
    };
    match text {
        Some(text) => Ok(JSValue::string(text)),
        None => {
            let name = function_name(interp, id)?;
            Ok(JSValue::string(format!("function {}() {{ [native code] }}", name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_call_apply_bind() {
        assert_eq!(eval_ok("function f(a, b) { return this.x + a + b; } f.call({ x: 1 }, 2, 3)"), "6");
        assert_eq!(eval_ok("function f(a, b) { return this.x + a + b; } f.apply({ x: 1 }, [2, 3])"), "6");
        assert_eq!(eval_ok("function f(a, b) { return this.x + a + b; } var g = f.bind({ x: 1 }, 2); g(3)"), "6");
        assert_eq!(eval_ok("function f(a, b) {} var g = f.bind(null, 1); g.name + ':' + g.length"), "bound f:1");
        assert_eq!(eval_ok("function P(v) { this.v = v; } var B = P.bind(null, 7); new B().v"), "7");
    }

    #[test]
    fn test_function_constructor() {
        assert_eq!(eval_ok("new Function('a', 'b', 'return a * b')(6, 7)"), "42");
        assert_eq!(eval("Function('return (')").unwrap_err().split(':').next(), Some("SyntaxError"));
    }

    #[test]
    fn test_to_string() {
        assert_eq!(eval_ok("function add(a, b) { return a + b; } add.toString()"), "function add(a, b) { return a + b; }");
        assert_eq!(eval_ok("Math.max.toString()"), "function max() { [native code] }");
    }
}
