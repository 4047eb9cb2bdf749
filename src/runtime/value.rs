//! JavaScript value representation
//!
//! Values are a small tagged enum. Strings are shared `Arc<str>` buffers and
//! objects are heap ids, so cloning a value never allocates.

use std::fmt;

use crate::gc::ObjectId;
use crate::runtime::JSString;
use crate::util::dtoa::number_to_string;

/// A JavaScript value
#[derive(Clone, Default)]
pub enum JSValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(JSString),
    Object(ObjectId),
}

impl JSValue {
    /// Create a string value
    #[inline]
    pub fn string(s: impl Into<JSString>) -> Self {
        JSValue::String(s.into())
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, JSValue::Undefined)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, JSValue::Null)
    }

    /// `undefined` or `null`
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, JSValue::Undefined | JSValue::Null)
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self, JSValue::Object(_))
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            JSValue::Object(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            JSValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[inline]
    pub fn as_string(&self) -> Option<&JSString> {
        match self {
            JSValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// `ToBoolean`; never needs the heap
    pub fn to_boolean(&self) -> bool {
        match self {
            JSValue::Undefined | JSValue::Null => false,
            JSValue::Bool(b) => *b,
            JSValue::Number(n) => *n != 0.0 && !n.is_nan(),
            JSValue::String(s) => !s.is_empty(),
            JSValue::Object(_) => true,
        }
    }

    /// Strict equality (`===`)
    pub fn strict_equals(&self, other: &JSValue) -> bool {
        match (self, other) {
            (JSValue::Undefined, JSValue::Undefined) | (JSValue::Null, JSValue::Null) => true,
            (JSValue::Bool(a), JSValue::Bool(b)) => a == b,
            (JSValue::Number(a), JSValue::Number(b)) => a == b,
            (JSValue::String(a), JSValue::String(b)) => a == b,
            (JSValue::Object(a), JSValue::Object(b)) => a == b,
            _ => false,
        }
    }

    /// SameValueZero, used by `includes`
    pub fn same_value_zero(&self, other: &JSValue) -> bool {
        match (self, other) {
            (JSValue::Number(a), JSValue::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// `typeof` for primitives; objects need the heap to tell functions apart
    pub fn primitive_type_name(&self) -> &'static str {
        match self {
            JSValue::Undefined => "undefined",
            JSValue::Null => "object",
            JSValue::Bool(_) => "boolean",
            JSValue::Number(_) => "number",
            JSValue::String(_) => "string",
            JSValue::Object(_) => "object",
        }
    }
}

impl From<bool> for JSValue {
    fn from(b: bool) -> Self {
        JSValue::Bool(b)
    }
}

impl From<f64> for JSValue {
    fn from(n: f64) -> Self {
        JSValue::Number(n)
    }
}

impl From<i32> for JSValue {
    fn from(n: i32) -> Self {
        JSValue::Number(n as f64)
    }
}

impl From<u32> for JSValue {
    fn from(n: u32) -> Self {
        JSValue::Number(n as f64)
    }
}

impl From<usize> for JSValue {
    fn from(n: usize) -> Self {
        JSValue::Number(n as f64)
    }
}

impl From<JSString> for JSValue {
    fn from(s: JSString) -> Self {
        JSValue::String(s)
    }
}

impl From<&str> for JSValue {
    fn from(s: &str) -> Self {
        JSValue::String(JSString::from(s))
    }
}

impl From<ObjectId> for JSValue {
    fn from(id: ObjectId) -> Self {
        JSValue::Object(id)
    }
}

impl fmt::Debug for JSValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JSValue::Undefined => write!(f, "undefined"),
            JSValue::Null => write!(f, "null"),
            JSValue::Bool(b) => write!(f, "{}", b),
            JSValue::Number(n) => write!(f, "{}", number_to_string(*n)),
            JSValue::String(s) => write!(f, "{:?}", s),
            JSValue::Object(id) => write!(f, "[object #{}]", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_boolean() {
        assert!(!JSValue::Undefined.to_boolean());
        assert!(!JSValue::Number(f64::NAN).to_boolean());
        assert!(!JSValue::Number(-0.0).to_boolean());
        assert!(!JSValue::string("").to_boolean());
        assert!(JSValue::string("0").to_boolean());
        assert!(JSValue::Object(ObjectId(0)).to_boolean());
    }

    #[test]
    fn test_equality() {
        assert!(JSValue::Number(0.0).strict_equals(&JSValue::Number(-0.0)));
        assert!(!JSValue::Number(f64::NAN).strict_equals(&JSValue::Number(f64::NAN)));
        assert!(JSValue::Number(f64::NAN).same_value_zero(&JSValue::Number(f64::NAN)));
        assert!(!JSValue::Null.strict_equals(&JSValue::Undefined));
        assert!(JSValue::string("a").strict_equals(&JSValue::from("a")));
    }
}
