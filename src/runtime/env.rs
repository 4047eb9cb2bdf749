//! Variable environments
//!
//! Each function call, block with lexical declarations, and loop iteration
//! gets an environment record. The outermost record of a realm is backed by
//! the global object: names not found among its own bindings are looked up
//! as properties of that object.

use std::collections::HashMap;

use crate::gc::{EnvId, ObjectId, Trace, Tracer};
use crate::runtime::{JSString, JSValue};

/// A single binding
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: JSValue,
    pub mutable: bool,
}

/// Environment record
#[derive(Debug, Default)]
pub struct Env {
    pub bindings: HashMap<JSString, Binding>,
    pub parent: Option<EnvId>,
    /// `this` for function and global environments; arrow functions and
    /// blocks leave it unset and inherit from the parent
    pub this_value: Option<JSValue>,
    /// Global object backing the outermost environment
    pub global: Option<ObjectId>,
}

impl Env {
    /// Create a child environment
    pub fn new(parent: Option<EnvId>) -> Self {
        Env {
            parent,
            ..Env::default()
        }
    }

    /// Create the global environment of a realm
    pub fn global(global: ObjectId) -> Self {
        Env {
            this_value: Some(JSValue::Object(global)),
            global: Some(global),
            ..Env::default()
        }
    }

    /// Add or overwrite a binding
    #[inline]
    pub fn declare(&mut self, name: JSString, value: JSValue, mutable: bool) {
        self.bindings.insert(name, Binding { value, mutable });
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }
}

impl Trace for Env {
    fn trace(&self, tracer: &mut Tracer) {
        if let Some(parent) = self.parent {
            tracer.env(parent);
        }
        if let Some(this) = &self.this_value {
            tracer.value(this);
        }
        if let Some(global) = self.global {
            tracer.object(global);
        }
        for binding in self.bindings.values() {
            tracer.value(&binding.value);
        }
    }
}
