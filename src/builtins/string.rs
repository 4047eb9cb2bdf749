//! String constructor and String.prototype
//!
//! Indices and lengths are in UTF-16 code units.

use crate::builtins::regexp::{Matcher, exec, matcher, next_char_boundary};
use crate::builtins::{RealmBuilder, relative_index};
use crate::runtime::{ClassId, ErrorKind, JSObject, JSString, JSValue, JsResult, NativeCall, ObjectData};
use crate::util::{byte_to_utf16_offset, from_utf16_lossy, is_js_whitespace, to_utf16, utf16_to_byte_offset};
use crate::vm::Interpreter;

/// Longest string `repeat` and `padStart` will build
const MAX_STRING_LENGTH: usize = (1 << 30) - 1;

pub fn install(b: &mut RealmBuilder<'_>) {
    let proto = b.intrinsics.string_prototype;
    let ctor = b.constructor("String", 1, string_constructor, proto);
    b.method(ctor, "fromCharCode", 1, string_from_char_code);

    b.method(proto, "charAt", 1, string_char_at);
    b.method(proto, "charCodeAt", 1, string_char_code_at);
    b.method(proto, "codePointAt", 1, string_code_point_at);
    b.method(proto, "indexOf", 1, string_index_of);
    b.method(proto, "lastIndexOf", 1, string_last_index_of);
    b.method(proto, "includes", 1, string_includes);
    b.method(proto, "startsWith", 1, string_starts_with);
    b.method(proto, "endsWith", 1, string_ends_with);
    b.method(proto, "slice", 2, string_slice);
    b.method(proto, "substring", 2, string_substring);
    b.method(proto, "substr", 2, string_substr);
    b.method(proto, "toUpperCase", 0, string_to_upper_case);
    b.method(proto, "toLowerCase", 0, string_to_lower_case);
    b.method(proto, "trim", 0, string_trim);
    b.method(proto, "trimStart", 0, string_trim_start);
    b.method(proto, "trimEnd", 0, string_trim_end);
    b.method(proto, "split", 2, string_split);
    b.method(proto, "replace", 2, string_replace);
    b.method(proto, "replaceAll", 2, string_replace_all);
    b.method(proto, "match", 1, string_match);
    b.method(proto, "search", 1, string_search);
    b.method(proto, "concat", 1, string_concat);
    b.method(proto, "repeat", 1, string_repeat);
    b.method(proto, "padStart", 2, string_pad_start);
    b.method(proto, "padEnd", 2, string_pad_end);
    b.method(proto, "at", 1, string_at);
    b.method(proto, "localeCompare", 1, string_locale_compare);
    b.method(proto, "toString", 0, string_value_of);
    b.method(proto, "valueOf", 0, string_value_of);
}

fn string_constructor(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let value = match call.args.first() {
        Some(arg) => interp.to_string(arg)?,
        None => JSString::from(""),
    };
    if !call.construct {
        return Ok(JSValue::String(value));
    }
    let proto = interp.intrinsics().string_prototype;
    let obj = JSObject::with_data(ClassId::String, Some(proto), ObjectData::Primitive(JSValue::String(value)));
    Ok(JSValue::Object(interp.alloc(obj)))
}

fn string_from_char_code(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let mut units = Vec::with_capacity(call.args.len());
    for arg in call.args {
        units.push(interp.to_uint32(arg)? as u16);
    }
    Ok(JSValue::string(from_utf16_lossy(&units)))
}

/// The receiver coerced to a string
fn this_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str) -> JsResult<JSString> {
    match &call.this {
        JSValue::String(s) => Ok(s.clone()),
        JSValue::Undefined | JSValue::Null => interp.throw(
            ErrorKind::TypeError,
            format!("String.prototype.{} called on null or undefined", method),
        ),
        other => interp.to_string(other),
    }
}

/// String argument `i`, with `undefined` converted to `"undefined"`
fn string_arg(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, i: usize) -> JsResult<JSString> {
    interp.to_string(&call.arg(i))
}

fn string_char_at(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "charAt")?;
    let pos = interp.to_integer(&call.arg(0))?;
    if pos < 0.0 || pos >= s.len_utf16() as f64 {
        return Ok(JSValue::string(""));
    }
    let pos = pos as usize;
    Ok(JSValue::String(s.substring(pos, pos + 1)))
}

fn string_char_code_at(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "charCodeAt")?;
    let pos = interp.to_integer(&call.arg(0))?;
    if pos < 0.0 {
        return Ok(JSValue::Number(f64::NAN));
    }
    Ok(JSValue::Number(s.char_code_at(pos as usize).map_or(f64::NAN, f64::from)))
}

fn string_code_point_at(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "codePointAt")?;
    let pos = interp.to_integer(&call.arg(0))?;
    let units = to_utf16(&s);
    if pos < 0.0 || pos >= units.len() as f64 {
        return Ok(JSValue::Undefined);
    }
    let pos = pos as usize;
    let first = units[pos];
    let code_point = match units.get(pos + 1) {
        Some(&second) if (0xD800..0xDC00).contains(&first) && (0xDC00..0xE000).contains(&second) => {
            0x10000 + ((first as u32 - 0xD800) << 10) + (second as u32 - 0xDC00)
        }
        _ => first as u32,
    };
    Ok(JSValue::from(code_point))
}

fn string_index_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "indexOf")?;
    let needle = string_arg(interp, call, 0)?;
    let from = interp.to_integer(&call.arg(1))?.clamp(0.0, s.len_utf16() as f64) as usize;
    Ok(JSValue::Number(s.index_of(&needle, from).map_or(-1.0, |i| i as f64)))
}

fn string_last_index_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "lastIndexOf")?;
    let needle = string_arg(interp, call, 0)?;
    let len = s.len_utf16();
    let from = match interp.to_number(&call.arg(1))? {
        n if n.is_nan() => len,
        n => n.clamp(0.0, len as f64) as usize,
    };
    Ok(JSValue::Number(s.last_index_of(&needle, from).map_or(-1.0, |i| i as f64)))
}

/// Needle argument of `includes`, `startsWith` and `endsWith`, which reject RegExps
fn search_string(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str) -> JsResult<JSString> {
    if matcher(interp, &call.arg(0)).is_some() {
        return interp.throw(
            ErrorKind::TypeError,
            format!("First argument to String.prototype.{} must not be a regular expression", method),
        );
    }
    string_arg(interp, call, 0)
}

fn string_includes(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "includes")?;
    let needle = search_string(interp, call, "includes")?;
    let from = interp.to_integer(&call.arg(1))?.clamp(0.0, s.len_utf16() as f64) as usize;
    Ok(JSValue::Bool(s.index_of(&needle, from).is_some()))
}

fn string_starts_with(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "startsWith")?;
    let needle = search_string(interp, call, "startsWith")?;
    let start = interp.to_integer(&call.arg(1))?.clamp(0.0, s.len_utf16() as f64) as usize;
    let rest = &s[utf16_to_byte_offset(&s, start)..];
    Ok(JSValue::Bool(rest.starts_with(needle.as_str())))
}

fn string_ends_with(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "endsWith")?;
    let needle = search_string(interp, call, "endsWith")?;
    let len = s.len_utf16();
    let end = match call.arg(1) {
        JSValue::Undefined => len,
        other => interp.to_integer(&other)?.clamp(0.0, len as f64) as usize,
    };
    let head = &s[..utf16_to_byte_offset(&s, end)];
    Ok(JSValue::Bool(head.ends_with(needle.as_str())))
}

fn string_slice(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "slice")?;
    let len = s.len_utf16();
    let start = relative_index(interp, &call.arg(0), len, 0)?;
    let end = relative_index(interp, &call.arg(1), len, len)?;
    Ok(JSValue::String(s.substring(start, end.max(start))))
}

fn string_substring(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "substring")?;
    let len = s.len_utf16() as f64;
    let start = interp.to_integer(&call.arg(0))?.clamp(0.0, len) as usize;
    let end = match call.arg(1) {
        JSValue::Undefined => len as usize,
        other => interp.to_integer(&other)?.clamp(0.0, len) as usize,
    };
    Ok(JSValue::String(s.substring(start.min(end), start.max(end))))
}

fn string_substr(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "substr")?;
    let len = s.len_utf16();
    let start = relative_index(interp, &call.arg(0), len, 0)?;
    let count = match call.arg(1) {
        JSValue::Undefined => len - start,
        other => interp.to_integer(&other)?.clamp(0.0, (len - start) as f64) as usize,
    };
    Ok(JSValue::String(s.substring(start, start + count)))
}

fn string_to_upper_case(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "toUpperCase")?;
    Ok(JSValue::string(s.to_uppercase()))
}

fn string_to_lower_case(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "toLowerCase")?;
    Ok(JSValue::string(s.to_lowercase()))
}

fn string_trim(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "trim")?;
    Ok(JSValue::string(s.trim_matches(is_js_whitespace)))
}

fn string_trim_start(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "trimStart")?;
    Ok(JSValue::string(s.trim_start_matches(is_js_whitespace)))
}

fn string_trim_end(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "trimEnd")?;
    Ok(JSValue::string(s.trim_end_matches(is_js_whitespace)))
}

fn string_concat(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let mut s = this_string(interp, call, "concat")?.to_string();
    for arg in call.args {
        s.push_str(&interp.to_string(arg)?);
    }
    Ok(JSValue::string(s))
}

fn string_repeat(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "repeat")?;
    let count = interp.to_integer(&call.arg(0))?;
    if count < 0.0 || count.is_infinite() {
        let shown = interp.to_string(&call.arg(0))?;
        return interp.throw(ErrorKind::RangeError, format!("Invalid count value: {}", shown));
    }
    if s.is_empty() || count == 0.0 {
        return Ok(JSValue::string(""));
    }
    if s.len_utf16() as f64 * count > MAX_STRING_LENGTH as f64 {
        return interp.throw(ErrorKind::RangeError, "Invalid string length");
    }
    Ok(JSValue::string(s.repeat(count as usize)))
}

fn pad(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str, at_start: bool) -> JsResult<JSValue> {
    let s = this_string(interp, call, method)?;
    let target = interp.to_integer(&call.arg(0))?;
    let filler = match call.arg(1) {
        JSValue::Undefined => JSString::from(" "),
        other => interp.to_string(&other)?,
    };
    let len = s.len_utf16();
    if target <= len as f64 || filler.is_empty() {
        return Ok(JSValue::String(s));
    }
    if target > MAX_STRING_LENGTH as f64 {
        return interp.throw(ErrorKind::RangeError, "Invalid string length");
    }
    let fill_len = target as usize - len;
    let filler_units = to_utf16(&filler);
    let units: Vec<u16> = filler_units.iter().copied().cycle().take(fill_len).collect();
    let fill = from_utf16_lossy(&units);
    Ok(JSValue::string(if at_start {
        format!("{}{}", fill, s)
    } else {
        format!("{}{}", s, fill)
    }))
}

fn string_pad_start(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    pad(interp, call, "padStart", true)
}

fn string_pad_end(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    pad(interp, call, "padEnd", false)
}

fn string_at(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "at")?;
    let len = s.len_utf16() as f64;
    let n = interp.to_integer(&call.arg(0))?;
    let index = if n < 0.0 { len + n } else { n };
    if index < 0.0 || index >= len {
        return Ok(JSValue::Undefined);
    }
    let index = index as usize;
    Ok(JSValue::String(s.substring(index, index + 1)))
}

fn string_locale_compare(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "localeCompare")?;
    let other = string_arg(interp, call, 0)?;
    Ok(JSValue::Number(match s.as_str().cmp(other.as_str()) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    }))
}

fn string_value_of(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    if let JSValue::String(s) = &call.this {
        return Ok(JSValue::String(s.clone()));
    }
    let boxed = call.this.as_object().and_then(|id| {
        let heap = interp.runtime().heap();
        match &heap.object(id).data {
            ObjectData::Primitive(JSValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    });
    match boxed {
        Some(s) => Ok(JSValue::String(s)),
        None => interp.throw(ErrorKind::TypeError, "String.prototype.valueOf requires that 'this' be a String"),
    }
}

// =============================================================================
// Pattern methods
// =============================================================================

fn string_split(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "split")?;
    let limit = match call.arg(1) {
        JSValue::Undefined => usize::MAX,
        other => interp.to_uint32(&other)? as usize,
    };
    let separator = call.arg(0);

    let parts = if limit == 0 {
        Vec::new()
    } else if let Some(m) = matcher(interp, &separator) {
        split_regexp(&m, &s, limit)
    } else if separator.is_undefined() {
        vec![JSValue::String(s.clone())]
    } else {
        let sep = interp.to_string(&separator)?;
        if sep.is_empty() {
            s.chars().map(|c| JSValue::string(c.to_string())).take(limit).collect()
        } else {
            s.split(sep.as_str()).map(JSValue::string).take(limit).collect()
        }
    };
    Ok(JSValue::Object(interp.new_array(parts)))
}

fn split_regexp(m: &Matcher, s: &str, limit: usize) -> Vec<JSValue> {
    let mut parts = Vec::new();
    if s.is_empty() {
        if m.captures_at(s, 0).is_none() {
            parts.push(JSValue::string(""));
        }
        return parts;
    }
    let mut last = 0;
    let mut search = 0;
    while search < s.len() {
        let Some(caps) = m.captures_at(s, search) else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        if whole.start() >= s.len() {
            break;
        }
        if whole.end() == last {
            search = next_char_boundary(s, whole.start());
            continue;
        }
        parts.push(JSValue::string(&s[last..whole.start()]));
        if parts.len() == limit {
            return parts;
        }
        for group in caps.iter().skip(1) {
            parts.push(group.map_or(JSValue::Undefined, |g| JSValue::string(g.as_str())));
            if parts.len() == limit {
                return parts;
            }
        }
        last = whole.end();
        search = if whole.start() == whole.end() { next_char_boundary(s, last) } else { last };
    }
    parts.push(JSValue::string(&s[last..]));
    parts
}

/// One match to be replaced: byte range plus captured groups
struct Found {
    start: usize,
    end: usize,
    groups: Vec<Option<String>>,
}

/// Expand `$$`, `$&`, `` $` ``, `$'` and `$n` in a replacement template
fn expand_template(template: &str, subject: &str, found: &Found) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let Some(offset) = template[i..].find('$') else {
            out.push_str(&template[i..]);
            break;
        };
        out.push_str(&template[i..i + offset]);
        i += offset;
        let next = bytes.get(i + 1).copied();
        match next {
            Some(b'$') => {
                out.push('$');
                i += 2;
            }
            Some(b'&') => {
                out.push_str(&subject[found.start..found.end]);
                i += 2;
            }
            Some(b'`') => {
                out.push_str(&subject[..found.start]);
                i += 2;
            }
            Some(b'\'') => {
                out.push_str(&subject[found.end..]);
                i += 2;
            }
            Some(d) if d.is_ascii_digit() => {
                let one = (d - b'0') as usize;
                let two = bytes
                    .get(i + 2)
                    .filter(|c| c.is_ascii_digit())
                    .map(|c| one * 10 + (c - b'0') as usize)
                    .filter(|n| (1..=found.groups.len()).contains(n));
                let (index, width) = match two {
                    Some(n) => (n, 3),
                    None if (1..=found.groups.len()).contains(&one) => (one, 2),
                    None => {
                        out.push('$');
                        i += 1;
                        continue;
                    }
                };
                if let Some(Some(group)) = found.groups.get(index - 1) {
                    out.push_str(group);
                }
                i += width;
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }
    out
}

fn find_matches(interp: &mut Interpreter<'_>, s: &JSString, pattern: &JSValue, all: bool) -> JsResult<Vec<Found>> {
    let mut found = Vec::new();
    if let Some(m) = matcher(interp, pattern) {
        let mut search = 0;
        while let Some(caps) = m.captures_at(s, search) {
            let Some(whole) = caps.get(0) else {
                break;
            };
            found.push(Found {
                start: whole.start(),
                end: whole.end(),
                groups: caps.iter().skip(1).map(|g| g.map(|g| g.as_str().to_string())).collect(),
            });
            if !all || (whole.end() >= s.len() && whole.start() == whole.end()) {
                break;
            }
            search = if whole.start() == whole.end() { next_char_boundary(s, whole.end()) } else { whole.end() };
        }
        if m.global {
            interp.put(m.obj, &"lastIndex".into(), JSValue::Number(0.0))?;
        }
        return Ok(found);
    }

    let needle = interp.to_string(pattern)?;
    let mut search = 0;
    while search <= s.len() {
        let Some(offset) = s[search..].find(needle.as_str()) else {
            break;
        };
        let start = search + offset;
        found.push(Found {
            start,
            end: start + needle.len(),
            groups: Vec::new(),
        });
        if !all {
            break;
        }
        search = if needle.is_empty() { next_char_boundary(s, start) } else { start + needle.len() };
    }
    Ok(found)
}

fn replace(interp: &mut Interpreter<'_>, call: &NativeCall<'_>, method: &str, all: bool) -> JsResult<JSValue> {
    let s = this_string(interp, call, method)?;
    let pattern = call.arg(0);
    let global = match matcher(interp, &pattern) {
        Some(m) if all && !m.global => {
            return interp.throw(ErrorKind::TypeError, "replaceAll must be called with a global RegExp");
        }
        Some(m) => m.global,
        None => all,
    };
    let found = find_matches(interp, &s, &pattern, global)?;

    let replacement = call.arg(1);
    let callback = interp.is_callable(&replacement);
    let template = if callback {
        JSString::from("")
    } else {
        interp.to_string(&replacement)?
    };

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for f in &found {
        out.push_str(&s[last..f.start]);
        if callback {
            let mut args = vec![JSValue::string(&s[f.start..f.end])];
            args.extend(f.groups.iter().map(|g| g.as_deref().map_or(JSValue::Undefined, JSValue::string)));
            args.push(JSValue::from(byte_to_utf16_offset(&s, f.start)));
            args.push(JSValue::String(s.clone()));
            let result = interp.call(&replacement, JSValue::Undefined, &args)?;
            out.push_str(&interp.to_string(&result)?);
        } else {
            out.push_str(&expand_template(&template, &s, f));
        }
        last = f.end;
    }
    out.push_str(&s[last..]);
    Ok(JSValue::string(out))
}

fn string_replace(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    replace(interp, call, "replace", false)
}

fn string_replace_all(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    replace(interp, call, "replaceAll", true)
}

/// RegExp argument of `match` and `search`, compiling strings as patterns
fn regexp_arg(interp: &mut Interpreter<'_>, value: &JSValue, flags: &str) -> JsResult<Matcher> {
    if let Some(m) = matcher(interp, value) {
        return Ok(m);
    }
    let source = match value {
        JSValue::Undefined => JSString::from(""),
        other => interp.to_string(other)?,
    };
    let obj = interp.new_regexp(&source, flags)?;
    match matcher(interp, &JSValue::Object(obj)) {
        Some(m) => Ok(m),
        None => interp.throw(ErrorKind::TypeError, "not a regular expression"),
    }
}

fn string_match(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "match")?;
    let m = regexp_arg(interp, &call.arg(0), "")?;
    if !m.global {
        return Ok(exec(interp, &m, &s)?.map_or(JSValue::Null, JSValue::Object));
    }
    let found = find_matches(interp, &s, &JSValue::Object(m.obj), true)?;
    if found.is_empty() {
        return Ok(JSValue::Null);
    }
    let values = found.iter().map(|f| JSValue::string(&s[f.start..f.end])).collect();
    Ok(JSValue::Object(interp.new_array(values)))
}

fn string_search(interp: &mut Interpreter<'_>, call: &NativeCall<'_>) -> JsResult<JSValue> {
    let s = this_string(interp, call, "search")?;
    let m = regexp_arg(interp, &call.arg(0), "")?;
    let index = m
        .regex
        .find(&s)
        .map_or(-1.0, |found| byte_to_utf16_offset(&s, found.start()) as f64);
    Ok(JSValue::Number(index))
}

#[cfg(test)]
mod tests {
    use crate::builtins::test_support::{eval, eval_ok};

    #[test]
    fn test_constructor() {
        assert_eq!(eval_ok("String(12) + String()"), "12");
        assert_eq!(eval_ok("typeof new String('a') + ':' + new String('abc').length"), "object:3");
        assert_eq!(eval_ok("String.fromCharCode(72, 105)"), "Hi");
        assert_eq!(eval_ok("new String('x') + 'y'"), "xy");
    }

    #[test]
    fn test_indexing() {
        assert_eq!(eval_ok("'hello'.charAt(1) + 'hello'.charAt(9)"), "e");
        assert_eq!(eval_ok("'A'.charCodeAt(0) + ':' + 'A'.charCodeAt(3)"), "65:NaN");
        assert_eq!(eval_ok("'😀'.length + ':' + '😀'.codePointAt(0)"), "2:128512");
        assert_eq!(eval_ok("'abcabc'.indexOf('c') + ':' + 'abcabc'.lastIndexOf('c') + ':' + 'abc'.indexOf('z')"), "2:5:-1");
        assert_eq!(eval_ok("'abc'.at(-1)"), "c");
    }

    #[test]
    fn test_substrings() {
        assert_eq!(eval_ok("'abcdef'.slice(1, -1)"), "bcde");
        assert_eq!(eval_ok("'abcdef'.substring(4, 1)"), "bcd");
        assert_eq!(eval_ok("'abcdef'.substr(-3, 2)"), "de");
        assert_eq!(eval_ok("'  pad  '.trim() + '|' + '  x'.trimStart() + '|' + 'x  '.trimEnd() + '|'"), "pad|x|x|");
        assert_eq!(eval_ok("'Hello'.toUpperCase() + 'Hello'.toLowerCase()"), "HELLOhello");
        assert_eq!(eval_ok("'abc'.startsWith('b', 1) + ':' + 'abc'.endsWith('b', 2) + ':' + 'abc'.includes('d')"), "true:true:false");
        assert_eq!(eval("'abc'.includes(/a/)").unwrap_err(), "TypeError: First argument to String.prototype.includes must not be a regular expression");
    }

    #[test]
    fn test_building() {
        assert_eq!(eval_ok("'ab'.repeat(3)"), "ababab");
        assert_eq!(eval("'ab'.repeat(-1)").unwrap_err(), "RangeError: Invalid count value: -1");
        assert_eq!(eval_ok("'5'.padStart(3, '0') + '|' + 'x'.padEnd(4, 'ab')"), "005|xaba");
        assert_eq!(eval_ok("'a'.concat(1, null)"), "a1null");
        assert_eq!(eval_ok("'a'.localeCompare('b') + ':' + 'b'.localeCompare('b')"), "-1:0");
    }

    #[test]
    fn test_split() {
        assert_eq!(eval_ok("'a,b,c'.split(',').length"), "3");
        assert_eq!(eval_ok("'a,b,c'.split(',', 2).join('|')"), "a|b");
        assert_eq!(eval_ok("'abc'.split('').join('|')"), "a|b|c");
        assert_eq!(eval_ok("'abc'.split().length"), "1");
        assert_eq!(eval_ok("'a1b22c'.split(/\\d+/).join('|')"), "a|b|c");
        assert_eq!(eval_ok("'a1b2c'.split(/(\\d)/).join('|')"), "a|1|b|2|c");
        assert_eq!(eval_ok("'abc'.split(/(?:)/).join('|')"), "a|b|c");
        assert_eq!(eval_ok("''.split(',').length + ':' + ''.split(/,/).length"), "1:1");
    }

    #[test]
    fn test_replace() {
        assert_eq!(eval_ok("'aaa'.replace('a', 'b')"), "baa");
        assert_eq!(eval_ok("'aaa'.replaceAll('a', 'b')"), "bbb");
        assert_eq!(eval_ok("'aaa'.replace(/a/g, 'b')"), "bbb");
        assert_eq!(eval_ok("'john smith'.replace(/(\\w+) (\\w+)/, '$2, $1')"), "smith, john");
        assert_eq!(eval_ok("'x'.replace('x', '$$-$&-$&')"), "$-x-x");
        assert_eq!(eval_ok("'a-b'.replace(/(\\w)/g, function (m, c, i) { return c.toUpperCase() + i; })"), "A0-B2");
        assert_eq!(eval_ok("'abc'.replace(/x*/g, '-')"), "-a-b-c-");
        assert_eq!(eval("'a'.replaceAll(/a/, 'b')").unwrap_err(), "TypeError: replaceAll must be called with a global RegExp");
    }

    #[test]
    fn test_match_and_search() {
        assert_eq!(eval_ok("'a1b22'.match(/\\d+/g).join('|')"), "1|22");
        assert_eq!(eval_ok("var m = 'key=value'.match(/(\\w+)=(\\w+)/); m[2] + ':' + m.index"), "value:0");
        assert_eq!(eval_ok("'abc'.match(/z/g)"), "null");
        assert_eq!(eval_ok("'abc'.search(/c/) + ':' + 'abc'.search('z')"), "2:-1");
    }
}
