//! The JSON namespace
//!
//! Parsing goes through `serde_json` and converts the resulting tree into
//! engine values. Serialization walks engine values directly so that
//! `toJSON`, replacers and accessors run as scripts expect.

use std::fmt::Write;

use crate::builtins::RealmBuilder;
use crate::gc::ObjectId;
use crate::runtime::{
    ClassId, ErrorKind, JSString, JSValue, JsResult, NativeCall, ObjectData, PropertyFlags,
    PropertyKey,
};
use crate::util::dtoa::number_to_string;
use crate::vm::Interpreter;

/// Nesting beyond this is reported as a stack overflow
const MAX_DEPTH: usize = 512;

pub fn install(b: &mut RealmBuilder<'_>) {
    let json = b.namespace("JSON");
    b.method(json, "parse", 2, json_parse);
    b.method(json, "stringify", 3, json_stringify);
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse JSON text into an engine value, throwing `SyntaxError` on bad input
pub(crate) fn parse(interp: &mut Interpreter<'_>, text: &str) -> JsResult<JSValue> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(tree) => Ok(from_tree(interp, &tree)),
        Err(e) => interp.throw(ErrorKind::SyntaxError, format!("JSON.parse: {}", e)),
    }
}

fn from_tree(interp: &mut Interpreter<'_>, tree: &serde_json::Value) -> JSValue {
    match tree {
        serde_json::Value::Null => JSValue::Null,
        serde_json::Value::Bool(b) => JSValue::Bool(*b),
        serde_json::Value::Number(n) => JSValue::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => JSValue::string(s.as_str()),
        serde_json::Value::Array(items) => {
            let values = items.iter().map(|item| from_tree(interp, item)).collect();
            JSValue::Object(interp.new_array(values))
        }
        serde_json::Value::Object(map) => {
            let obj = interp.new_object();
            for (key, value) in map {
                let value = from_tree(interp, value);
                interp.define_own(
                    obj,
                    PropertyKey::from_string(JSString::from(key.as_str())),
                    value,
                    PropertyFlags::NONE,
                );
            }
            JSValue::Object(obj)
        }
    }
}

fn json_parse(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let text = interp.to_string(&call.arg(0))?;
    let value = parse(interp, &text)?;
    let reviver = call.arg(1);
    if !interp.is_callable(&reviver) {
        return Ok(value);
    }
    let root = interp.new_object();
    interp.put(root, &PropertyKey::from(""), value)?;
    revive(interp, &reviver, root, PropertyKey::from(""))
}

/// Walk the parsed tree bottom-up through the reviver
fn revive(interp: &mut Interpreter<'_>, reviver: &JSValue, holder: ObjectId, key: PropertyKey) -> JsResult<JSValue> {
    let value = interp.get(holder, &key)?;
    if let Some(obj) = value.as_object() {
        for child in interp.own_keys(obj, true)? {
            let revived = revive(interp, reviver, obj, child.clone())?;
            if revived.is_undefined() {
                interp.delete_property(obj, &child, false)?;
            } else {
                interp.put(obj, &child, revived)?;
            }
        }
    }
    let args = [JSValue::String(key.to_js_string()), value];
    interp.call(reviver, JSValue::Object(holder), &args)
}

// =============================================================================
// Serialization
// =============================================================================

/// How strings are escaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Escape {
    /// `JSON.stringify`: quotes, backslashes and control characters
    Standard,
    /// The embedding API: quotes, backslashes, `/` and the short escapes
    /// `\n \r \t \b \f`; every other character passes through
    Binding,
}

pub(crate) struct Serializer {
    escape: Escape,
    indent: String,
    replacer: Option<JSValue>,
    allow_list: Option<Vec<JSString>>,
    stack: Vec<ObjectId>,
}

impl Serializer {
    pub(crate) fn new(escape: Escape) -> Self {
        Serializer {
            escape,
            indent: String::new(),
            replacer: None,
            allow_list: None,
            stack: Vec::new(),
        }
    }

    /// Serialize `value` as the root; `None` when it has no JSON form
    pub(crate) fn serialize(&mut self, interp: &mut Interpreter<'_>, value: JSValue) -> JsResult<Option<String>> {
        let holder = interp.new_object();
        interp.put(holder, &PropertyKey::from(""), value)?;
        let mut out = String::new();
        let written = self.property(interp, holder, &PropertyKey::from(""), &mut out, "")?;
        Ok(written.then_some(out))
    }

    /// Write the value of `holder[key]`; false when it serializes to nothing
    fn property(
        &mut self,
        interp: &mut Interpreter<'_>,
        holder: ObjectId,
        key: &PropertyKey,
        out: &mut String,
        gap: &str,
    ) -> JsResult<bool> {
        let mut value = interp.get(holder, key)?;
        if value.is_object() {
            let to_json = interp.get_value(&value, &PropertyKey::from("toJSON"))?;
            if interp.is_callable(&to_json) {
                value = interp.call(&to_json, value, &[JSValue::String(key.to_js_string())])?;
            }
        }
        if let Some(replacer) = self.replacer.clone() {
            let args = [JSValue::String(key.to_js_string()), value];
            value = interp.call(&replacer, JSValue::Object(holder), &args)?;
        }
        if let Some(id) = value.as_object() {
            value = unbox(interp, id).unwrap_or(value);
        }

        match &value {
            JSValue::Undefined => Ok(false),
            JSValue::Null => {
                out.push_str("null");
                Ok(true)
            }
            JSValue::Bool(b) => {
                out.push_str(if *b { "true" } else { "false" });
                Ok(true)
            }
            JSValue::Number(n) => {
                if n.is_finite() {
                    out.push_str(&number_to_string(*n));
                } else {
                    out.push_str("null");
                }
                Ok(true)
            }
            JSValue::String(s) => {
                quote(s, self.escape, out);
                Ok(true)
            }
            JSValue::Object(id) => {
                if interp.is_callable(&value) {
                    return Ok(false);
                }
                if self.stack.contains(id) {
                    return interp.throw(ErrorKind::TypeError, "Converting circular structure to JSON");
                }
                if self.stack.len() >= MAX_DEPTH {
                    return interp.throw(ErrorKind::RangeError, "Maximum call stack size exceeded");
                }
                self.stack.push(*id);
                let inner = format!("{}{}", gap, self.indent);
                let is_array = interp.runtime().heap().object(*id).class == ClassId::Array;
                let result = if is_array {
                    self.array(interp, *id, out, gap, &inner)
                } else {
                    self.object(interp, *id, out, gap, &inner)
                };
                self.stack.pop();
                result.map(|()| true)
            }
        }
    }

    fn array(&mut self, interp: &mut Interpreter<'_>, arr: ObjectId, out: &mut String, gap: &str, inner: &str) -> JsResult<()> {
        let length = interp.length_of(arr)?;
        if length == 0 {
            out.push_str("[]");
            return Ok(());
        }
        out.push('[');
        for i in 0..length {
            if i > 0 {
                out.push(',');
            }
            self.newline(out, inner);
            if !self.property(interp, arr, &PropertyKey::Index(i), out, inner)? {
                out.push_str("null");
            }
        }
        self.newline(out, gap);
        out.push(']');
        Ok(())
    }

    fn object(&mut self, interp: &mut Interpreter<'_>, obj: ObjectId, out: &mut String, gap: &str, inner: &str) -> JsResult<()> {
        let keys = match &self.allow_list {
            Some(list) => list.iter().cloned().map(PropertyKey::from_string).collect(),
            None => interp.own_keys(obj, true)?,
        };
        out.push('{');
        let mut any = false;
        for key in keys {
            let mark = out.len();
            if any {
                out.push(',');
            }
            self.newline(out, inner);
            quote(&key.to_js_string(), self.escape, out);
            out.push(':');
            if !self.indent.is_empty() {
                out.push(' ');
            }
            if self.property(interp, obj, &key, out, inner)? {
                any = true;
            } else {
                out.truncate(mark);
            }
        }
        if any {
            self.newline(out, gap);
        }
        out.push('}');
        Ok(())
    }

    fn newline(&self, out: &mut String, gap: &str) {
        if !self.indent.is_empty() {
            out.push('\n');
            out.push_str(gap);
        }
    }
}

/// The primitive inside a Number, String or Boolean wrapper object
fn unbox(interp: &Interpreter<'_>, id: ObjectId) -> Option<JSValue> {
    let heap = interp.runtime().heap();
    let obj = heap.object(id);
    match (&obj.data, obj.class) {
        (ObjectData::Primitive(value), ClassId::Number | ClassId::String | ClassId::Boolean) => Some(value.clone()),
        _ => None,
    }
}

/// Append `s` as a quoted JSON string
pub(crate) fn quote(s: &str, escape: Escape, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '/' if escape == Escape::Binding => out.push_str("\\/"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c < ' ' && escape == Escape::Standard => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn json_stringify(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let mut serializer = Serializer::new(Escape::Standard);

    let replacer = call.arg(1);
    if interp.is_callable(&replacer) {
        serializer.replacer = Some(replacer);
    } else if let Some(list) = replacer.as_object().filter(|id| interp.runtime().heap().object(*id).class == ClassId::Array) {
        let length = interp.length_of(list)?;
        let mut allow = Vec::new();
        for i in 0..length {
            let item = interp.get(list, &PropertyKey::Index(i))?;
            let item = match item.as_object().and_then(|id| unbox(interp, id)) {
                Some(primitive) => primitive,
                None => item,
            };
            if matches!(item, JSValue::String(_) | JSValue::Number(_)) {
                let name = interp.to_string(&item)?;
                if !allow.contains(&name) {
                    allow.push(name);
                }
            }
        }
        serializer.allow_list = Some(allow);
    }

    let space = match call.arg(2) {
        JSValue::Object(id) => unbox(interp, id).unwrap_or(JSValue::Undefined),
        other => other,
    };
    serializer.indent = match space {
        JSValue::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        JSValue::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };

    Ok(serializer
        .serialize(interp, call.arg(0))?
        .map_or(JSValue::Undefined, JSValue::string))
}

#[cfg(test)]
mod tests {
    use super::{Escape, quote};
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_quote_modes() {
        let mut standard = String::new();
        quote("a/b\u{1}é\n", Escape::Standard, &mut standard);
        assert_eq!(standard, "\"a/b\\u0001é\\n\"");

        let mut binding = String::new();
        quote("a/b\u{1}é\n", Escape::Binding, &mut binding);
        assert_eq!(binding, "\"a\\/b\u{1}é\\n\"");
    }

    #[test]
    fn test_parse() {
        assert_eq!(eval_ok("JSON.parse('{\"a\":[1,2,{\"b\":null}]}').a[2].b"), "null");
        assert_eq!(eval_ok("Object.keys(JSON.parse('{\"z\":1,\"a\":2}')).join()"), "z,a");
        assert_eq!(eval_ok("JSON.parse('\"\\\\u4e2d\"')"), "中");
        assert_eq!(eval("JSON.parse('{bad')").unwrap_err().split(':').next(), Some("SyntaxError"));
        assert_eq!(
            eval_ok("JSON.stringify(JSON.parse('{\"a\":1,\"b\":[2]}', function (k, v) { return typeof v === 'number' ? v * 10 : v; }))"),
            "{\"a\":10,\"b\":[20]}"
        );
    }

    #[test]
    fn test_stringify() {
        assert_eq!(eval_ok("JSON.stringify({ a: 1, b: 'x', c: [true, null], d: undefined, e: function () {} })"), "{\"a\":1,\"b\":\"x\",\"c\":[true,null]}");
        assert_eq!(eval_ok("JSON.stringify([undefined, NaN, Infinity])"), "[null,null,null]");
        assert_eq!(eval_ok("String(JSON.stringify(undefined))"), "undefined");
        assert_eq!(eval_ok("JSON.stringify({ toJSON: function () { return 42; } })"), "42");
        assert_eq!(eval_ok("JSON.stringify(new Date(0))"), "\"1970-01-01T00:00:00.000Z\"");
        assert_eq!(eval_ok("JSON.stringify([new Number(1), new String('s')])"), "[1,\"s\"]");
        assert_eq!(eval_ok("JSON.stringify('a\"b/')"), "\"a\\\"b/\"");
    }

    #[test]
    fn test_stringify_options() {
        assert_eq!(eval_ok("JSON.stringify({ a: [1], b: {} }, null, 2)"), "{\n  \"a\": [\n    1\n  ],\n  \"b\": {}\n}");
        assert_eq!(eval_ok("JSON.stringify({ a: 1, b: 2, c: 3 }, ['c', 'a'])"), "{\"c\":3,\"a\":1}");
        assert_eq!(eval_ok("JSON.stringify({ a: 1, b: 2 }, function (k, v) { return k === 'a' ? undefined : v; })"), "{\"b\":2}");
    }

    #[test]
    fn test_cycles() {
        assert_eq!(eval("var o = {}; o.self = o; JSON.stringify(o)").unwrap_err(), "TypeError: Converting circular structure to JSON");
        assert_eq!(eval_ok("var shared = {}; JSON.stringify([shared, shared])"), "[{},{}]");
    }
}
