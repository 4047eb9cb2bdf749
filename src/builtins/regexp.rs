//! RegExp constructor and RegExp.prototype
//!
//! Matching runs on the UTF-8 text; `lastIndex` and match indices are
//! converted to and from UTF-16 offsets at the boundary.

use regex::{Captures, Regex};

use crate::builtins::RealmBuilder;
use crate::gc::ObjectId;
use crate::runtime::{ErrorKind, JSString, JSValue, JsResult, NativeCall, ObjectData, PropertyFlags, PropertyKey};
use crate::util::{byte_to_utf16_offset, utf16_to_byte_offset};
use crate::vm::Interpreter;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.regexp_prototype;
    b.constructor("RegExp", 2, regexp_constructor, proto);

    b.method(proto, "exec", 1, regexp_exec);
    b.method(proto, "test", 1, regexp_test);
    b.method(proto, "toString", 0, regexp_to_string);
    b.getter(proto, "source", regexp_source);
    b.getter(proto, "flags", regexp_flags);
    b.getter(proto, "global", regexp_global);
    b.getter(proto, "ignoreCase", regexp_ignore_case);
    b.getter(proto, "multiline", regexp_multiline);
    b.getter(proto, "sticky", regexp_sticky);
}

/// Snapshot of a RegExp object's matcher, detached from the heap
#[derive(Clone)]
pub(crate) struct Matcher {
    pub obj: ObjectId,
    pub regex: Regex,
    pub source: JSString,
    pub flags: JSString,
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub sticky: bool,
}

/// The matcher of `value` if it is a RegExp object
pub(crate) fn matcher(interp: &Interpreter<'_>, value: &JSValue) -> Option<Matcher> {
    let obj = value.as_object()?;
    let heap = interp.runtime().heap();
    match &heap.object(obj).data {
        ObjectData::RegExp(data) => Some(Matcher {
            obj,
            regex: data.regex.clone(),
            source: data.source.clone(),
            flags: data.flags.clone(),
            global: data.global,
            ignore_case: data.ignore_case,
            multiline: data.multiline,
            sticky: data.sticky,
        }),
        _ => None,
    }
}

fn this_matcher(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str) -> JsResult<Matcher> {
    match matcher(interp, &call.this) {
        Some(m) => Ok(m),
        None => interp.throw(
            ErrorKind::TypeError,
            format!("RegExp.prototype.{} requires that 'this' be a RegExp object", method),
        ),
    }
}

impl Matcher {
    /// Match starting the search at byte `start`; sticky matches must begin there
    pub fn captures_at<'t>(&self, text: &'t str, start: usize) -> Option<Captures<'t>> {
        if start > text.len() {
            return None;
        }
        let caps = self.regex.captures_at(text, start)?;
        let whole = caps.get(0)?;
        if self.sticky && whole.start() != start {
            return None;
        }
        Some(caps)
    }
}

/// Byte offset just past the character starting at `offset`
pub(crate) fn next_char_boundary(text: &str, offset: usize) -> usize {
    text[offset..].chars().next().map_or(offset + 1, |c| offset + c.len_utf8())
}

/// Result array of a successful match: the groups plus `index` and `input`
pub(crate) fn match_result(interp: &mut Interpreter<'_>, caps: &Captures<'_>, input: &JSString) -> ObjectId {
    let values = caps
        .iter()
        .map(|group| group.map_or(JSValue::Undefined, |m| JSValue::string(m.as_str())))
        .collect();
    let arr = interp.new_array(values);
    let index = caps.get(0).map_or(0, |m| byte_to_utf16_offset(input, m.start()));
    interp.define_own(arr, "index".into(), JSValue::from(index), PropertyFlags::NONE);
    interp.define_own(arr, "input".into(), JSValue::String(input.clone()), PropertyFlags::NONE);
    arr
}

/// `exec` with `lastIndex` handling for global and sticky expressions
pub(crate) fn exec(interp: &mut Interpreter<'_>, m: &Matcher, input: &JSString) -> JsResult<Option<ObjectId>> {
    let last_index_key = PropertyKey::from("lastIndex");
    let uses_last_index = m.global || m.sticky;
    let start = if uses_last_index {
        let value = interp.get(m.obj, &last_index_key)?;
        let n = interp.to_integer(&value)?;
        if n < 0.0 || n > input.len_utf16() as f64 {
            interp.put(m.obj, &last_index_key, JSValue::Number(0.0))?;
            return Ok(None);
        }
        utf16_to_byte_offset(input, n as usize)
    } else {
        0
    };

    let Some(caps) = m.captures_at(input, start) else {
        if uses_last_index {
            interp.put(m.obj, &last_index_key, JSValue::Number(0.0))?;
        }
        return Ok(None);
    };
    if uses_last_index {
        let end = caps.get(0).map_or(start, |whole| whole.end());
        let end = byte_to_utf16_offset(input, end);
        interp.put(m.obj, &last_index_key, JSValue::from(end))?;
    }
    Ok(Some(match_result(interp, &caps, input)))
}

fn regexp_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let pattern = call.arg(0);
    let flags = call.arg(1);
    if let Some(existing) = matcher(interp, &pattern) {
        if !call.construct && flags.is_undefined() {
            return Ok(pattern);
        }
        let flags = match flags {
            JSValue::Undefined => existing.flags.clone(),
            other => interp.to_string(&other)?,
        };
        return interp.new_regexp(&existing.source, &flags).map(JSValue::Object);
    }
    let source = match pattern {
        JSValue::Undefined => JSString::from(""),
        other => interp.to_string(&other)?,
    };
    let flags = match flags {
        JSValue::Undefined => JSString::from(""),
        other => interp.to_string(&other)?,
    };
    interp.new_regexp(&source, &flags).map(JSValue::Object)
}

fn regexp_exec(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let m = this_matcher(interp, call, "exec")?;
    let input = interp.to_string(&call.arg(0))?;
    Ok(exec(interp, &m, &input)?.map_or(JSValue::Null, JSValue::Object))
}

fn regexp_test(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let m = this_matcher(interp, call, "test")?;
    let input = interp.to_string(&call.arg(0))?;
    Ok(JSValue::Bool(exec(interp, &m, &input)?.is_some()))
}

fn regexp_to_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let m = this_matcher(interp, call, "toString")?;
    Ok(JSValue::string(format!("/{}/{}", m.source, m.flags)))
}

fn regexp_source(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::String(this_matcher(interp, call, "source")?.source))
}

fn regexp_flags(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::String(this_matcher(interp, call, "flags")?.flags))
}

fn regexp_global(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(this_matcher(interp, call, "global")?.global))
}

fn regexp_ignore_case(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(this_matcher(interp, call, "ignoreCase")?.ignore_case))
}

fn regexp_multiline(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(this_matcher(interp, call, "multiline")?.multiline))
}

fn regexp_sticky(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    Ok(JSValue::Bool(this_matcher(interp, call, "sticky")?.sticky))
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_exec() {
        assert_eq!(eval_ok("var m = /(\\d+)-(\\d+)/.exec('tel 12-34'); m.join('|') + ':' + m.index"), "12-34|12|34:4");
        assert_eq!(eval_ok("/x/.exec('abc')"), "null");
        assert_eq!(eval_ok("var m = /a(z)?/.exec('a'); m.length + ':' + (m[1] === undefined)"), "2:true");
        assert_eq!(eval_ok("/é(.)/.exec('café!').index"), "3");
    }

    #[test]
    fn test_last_index() {
        assert_eq!(
            eval_ok("var re = /o/g; var s = 'foo'; re.test(s) + ',' + re.lastIndex + ',' + re.test(s) + ',' + re.lastIndex + ',' + re.test(s) + ',' + re.lastIndex"),
            "true,2,true,3,false,0"
        );
        assert_eq!(eval_ok("var re = /b/y; re.test('ab') + ':' + re.lastIndex"), "false:0");
        assert_eq!(eval_ok("var re = /b/y; re.lastIndex = 1; re.test('ab') + ':' + re.lastIndex"), "true:2");
    }

    #[test]
    fn test_flags_and_source() {
        assert_eq!(eval_ok("var re = /a.c/gi; re.source + ' ' + re.flags + ' ' + re.global + re.ignoreCase + re.multiline"), "a.c gi truetruefalse");
        assert_eq!(eval_ok("String(new RegExp('x+', 'm'))"), "/x+/m");
        assert_eq!(eval_ok("new RegExp(/ab/g).flags + new RegExp(/ab/g, 'i').flags"), "gi");
        assert_eq!(eval_ok("/A/i.test('a')"), "true");
        assert_eq!(eval_ok("String(new RegExp(''))"), "/(?:)/");
    }

    #[test]
    fn test_invalid_patterns() {
        assert_eq!(eval("new RegExp('(')").unwrap_err().split(':').next(), Some("SyntaxError"));
        assert_eq!(eval("new RegExp('a', 'gg')").unwrap_err(), "SyntaxError: Invalid flags supplied to RegExp constructor 'gg'");
    }
}
