//! Host templates
//!
//! Templates describe host-backed functions and objects. They are created
//! from an [`Engine`](crate::Engine), configured once and then instantiated
//! in any number of contexts:
//!
//! - [`ObjectTemplate`]: data properties, [`Accessor`]s, named and indexed
//!   interceptors and internal fields
//! - [`FunctionTemplate`]: a host callback plus templates for the instances
//!   and the prototype of the function
//!
//! Callbacks are plain closures. They run on the thread that triggered
//! them, with the function's context entered, and may call back into the
//! engine. A panic inside a callback is turned into a script exception.

pub mod callback;
pub mod function;
pub mod object;

use std::sync::Arc;

pub use callback::{AccessorCallbackInfo, FunctionCallbackInfo, PropertyCallbackInfo, ReturnValue};
pub use function::FunctionTemplate;
pub use object::{Accessor, IndexedPropertyHandler, NamedPropertyHandler, ObjectTemplate};

use crate::value::Value;

/// Host function body
pub type FunctionCallback = Arc<dyn Fn(&mut FunctionCallbackInfo<'_>) + Send + Sync>;

/// Accessor read; receives the property name
pub type AccessorGetter = Arc<dyn Fn(&str, &mut PropertyCallbackInfo<'_>) + Send + Sync>;

/// Accessor write; receives the property name and the assigned value
pub type AccessorSetter = Arc<dyn Fn(&str, &Value, &mut PropertyCallbackInfo<'_>) + Send + Sync>;

/// Named interceptor for get, query and delete
pub type NamedCallback = Arc<dyn Fn(&str, &mut PropertyCallbackInfo<'_>) + Send + Sync>;

pub type NamedSetter = Arc<dyn Fn(&str, &Value, &mut PropertyCallbackInfo<'_>) + Send + Sync>;

/// Indexed interceptor for get, query and delete
pub type IndexedCallback = Arc<dyn Fn(u32, &mut PropertyCallbackInfo<'_>) + Send + Sync>;

pub type IndexedSetter = Arc<dyn Fn(u32, &Value, &mut PropertyCallbackInfo<'_>) + Send + Sync>;

/// Lists extra property keys as an array
pub type EnumeratorCallback = Arc<dyn Fn(&mut PropertyCallbackInfo<'_>) + Send + Sync>;
