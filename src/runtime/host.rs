//! Host dispatch
//!
//! Objects and functions created from host templates carry only the
//! template id. Whenever the interpreter reaches one of them it asks the
//! [`HostDispatch`] installed in the runtime to run the host side.
//!
//! Every method returns `Ok(None)` when the host has nothing to say, in
//! which case the interpreter falls back to ordinary behavior (real
//! property storage, `undefined` results).

use crate::gc::ObjectId;
use crate::runtime::property::{HostAccessor, PropertyKey};
use crate::runtime::{JSValue, JsResult};
use crate::vm::Interpreter;

/// A call to a host function
#[derive(Debug)]
pub struct HostCall<'a> {
    pub template: u64,
    pub callee: ObjectId,
    pub this: JSValue,
    pub args: &'a [JSValue],
    /// Invoked with `new`
    pub construct: bool,
}

/// Read or write of a host accessor property
#[derive(Debug)]
pub struct AccessorCall<'a> {
    pub accessor: HostAccessor,
    pub key: &'a PropertyKey,
    /// Object owning the accessor
    pub holder: ObjectId,
    pub this: JSValue,
    /// `Some` for writes
    pub value: Option<JSValue>,
}

/// Interceptor operation
#[derive(Debug, Clone)]
pub enum InterceptOp {
    Get,
    Set(JSValue),
    /// Result is the attribute bits as a number
    Query,
    /// Result is a boolean
    Delete,
    /// Result is an array of keys
    Enumerate,
}

/// Property access on an object with interceptors
#[derive(Debug)]
pub struct InterceptCall<'a> {
    pub template: u64,
    pub holder: ObjectId,
    pub this: JSValue,
    /// `None` for [`InterceptOp::Enumerate`]
    pub key: Option<&'a PropertyKey>,
    pub op: InterceptOp,
}

/// Host side of template-backed objects
pub trait HostDispatch: Send + Sync {
    /// Run a host function; `Some(object)` from a construct call replaces
    /// the new instance
    fn call(&self, interp: &mut Interpreter<'_>, call: HostCall<'_>) -> JsResult<Option<JSValue>>;

    /// Run a host accessor; the result of a write is ignored
    fn accessor(
        &self,
        interp: &mut Interpreter<'_>,
        call: AccessorCall<'_>,
    ) -> JsResult<Option<JSValue>>;

    /// Run an interceptor; `Some` means the access was handled
    fn intercept(
        &self,
        interp: &mut Interpreter<'_>,
        call: InterceptCall<'_>,
    ) -> JsResult<Option<JSValue>>;

    /// Set up a new instance of a host function's instance template
    fn init_instance(
        &self,
        interp: &mut Interpreter<'_>,
        template: u64,
        instance: ObjectId,
    ) -> JsResult<()>;
}

/// Dispatch for runtimes without host templates
#[derive(Debug, Default)]
pub struct NoHost;

impl HostDispatch for NoHost {
    fn call(&self, _: &mut Interpreter<'_>, _: HostCall<'_>) -> JsResult<Option<JSValue>> {
        Ok(None)
    }

    fn accessor(&self, _: &mut Interpreter<'_>, _: AccessorCall<'_>) -> JsResult<Option<JSValue>> {
        Ok(None)
    }

    fn intercept(&self, _: &mut Interpreter<'_>, _: InterceptCall<'_>) -> JsResult<Option<JSValue>> {
        Ok(None)
    }

    fn init_instance(&self, _: &mut Interpreter<'_>, _: u64, _: ObjectId) -> JsResult<()> {
        Ok(())
    }
}
