//! Callback arguments
//!
//! Each host callback receives a short-lived info value describing the
//! invocation. It borrows the scope the callback runs in and must not be
//! kept past the call.

use std::any::Any;

use crate::context::ContextScope;
use crate::runtime::{HostData, JSValue};
use crate::value::{Function, Object, Value};

/// Result slot of a callback
///
/// Leaving it unset means "no result": `undefined` for calls and getters,
/// fall-through to ordinary property storage for interceptors.
#[derive(Debug, Default)]
pub struct ReturnValue {
    value: Option<JSValue>,
}

impl ReturnValue {
    pub fn set(&mut self, value: &Value) {
        self.value = Some(value.raw().clone());
    }

    pub fn set_boolean(&mut self, value: bool) {
        self.value = Some(JSValue::Bool(value));
    }

    pub fn set_number(&mut self, value: f64) {
        self.value = Some(JSValue::Number(value));
    }

    pub fn set_int32(&mut self, value: i32) {
        self.value = Some(JSValue::from(value));
    }

    pub fn set_uint32(&mut self, value: u32) {
        self.value = Some(JSValue::from(value));
    }

    pub fn set_string(&mut self, value: &str) {
        self.value = Some(JSValue::string(value));
    }

    pub fn set_null(&mut self) {
        self.value = Some(JSValue::Null);
    }

    pub fn set_undefined(&mut self) {
        self.value = Some(JSValue::Undefined);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub(crate) fn take(&mut self) -> Option<JSValue> {
        self.value.take()
    }
}

/// Arguments of a call to a host function
pub struct FunctionCallbackInfo<'a> {
    pub(crate) scope: &'a ContextScope,
    pub(crate) args: &'a [Value],
    pub(crate) this: Value,
    pub(crate) callee: Function,
    pub(crate) data: Option<&'a HostData>,
    pub(crate) construct: bool,
    pub(crate) return_value: ReturnValue,
}

impl<'a> FunctionCallbackInfo<'a> {
    /// Scope of the context the function belongs to
    #[inline]
    pub fn current_scope(&self) -> &'a ContextScope {
        self.scope
    }

    /// Number of arguments passed
    #[inline]
    pub fn length(&self) -> usize {
        self.args.len()
    }

    /// Argument `i`, `undefined` when missing
    pub fn get(&self, i: usize) -> Value {
        match self.args.get(i) {
            Some(arg) => arg.clone(),
            None => self.scope.undefined(),
        }
    }

    #[inline]
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// Receiver; the new instance for construct calls
    #[inline]
    pub fn this(&self) -> &Value {
        &self.this
    }

    #[inline]
    pub fn holder(&self) -> &Value {
        &self.this
    }

    #[inline]
    pub fn callee(&self) -> &Function {
        &self.callee
    }

    /// Data the function template was created with
    #[inline]
    pub fn data(&self) -> Option<&HostData> {
        self.data
    }

    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data.and_then(|data| (**data).downcast_ref::<T>())
    }

    /// Whether the function was invoked with `new`
    #[inline]
    pub fn is_construct_call(&self) -> bool {
        self.construct
    }

    #[inline]
    pub fn return_value(&mut self) -> &mut ReturnValue {
        &mut self.return_value
    }
}

/// Arguments of an accessor or interceptor callback
pub struct PropertyCallbackInfo<'a> {
    pub(crate) scope: &'a ContextScope,
    pub(crate) this: Value,
    pub(crate) holder: Object,
    pub(crate) data: Option<&'a HostData>,
    pub(crate) return_value: ReturnValue,
}

/// Accessors receive the same information as interceptors
pub type AccessorCallbackInfo<'a> = PropertyCallbackInfo<'a>;

impl<'a> PropertyCallbackInfo<'a> {
    #[inline]
    pub fn current_scope(&self) -> &'a ContextScope {
        self.scope
    }

    /// Object the property was accessed through
    #[inline]
    pub fn this(&self) -> &Value {
        &self.this
    }

    /// Object the accessor or interceptor is installed on
    #[inline]
    pub fn holder(&self) -> &Object {
        &self.holder
    }

    #[inline]
    pub fn data(&self) -> Option<&HostData> {
        self.data
    }

    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data.and_then(|data| (**data).downcast_ref::<T>())
    }

    #[inline]
    pub fn return_value(&mut self) -> &mut ReturnValue {
        &mut self.return_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_return_value() {
        let mut rv = ReturnValue::default();
        assert!(!rv.is_set());
        rv.set_undefined();
        assert!(rv.is_set());
        assert!(rv.take().is_some_and(|v| v.is_undefined()));
        assert!(!rv.is_set());

        rv.set_int32(-5);
        assert_eq!(rv.take().and_then(|v| v.as_number()), Some(-5.0));
        rv.set_uint32(u32::MAX);
        assert_eq!(rv.take().and_then(|v| v.as_number()), Some(u32::MAX as f64));
        rv.set_string("s");
        assert_eq!(rv.take().and_then(|v| v.as_string().map(|s| s.to_string())), Some("s".to_string()));
        rv.set_null();
        assert!(rv.take().is_some_and(|v| v.is_null()));
    }
}
