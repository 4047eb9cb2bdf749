//! Realms
//!
//! A realm is the set of intrinsic objects and the global scope of one
//! context. Several realms share one heap; objects created by a function
//! run in that function's realm.

use std::collections::HashMap;

use crate::gc::{EnvId, ObjectId, Trace, Tracer};

/// Native error constructors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    EvalError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    UriError,
}

impl ErrorKind {
    pub const COUNT: usize = 7;

    pub const ALL: [ErrorKind; Self::COUNT] = [
        ErrorKind::Error,
        ErrorKind::EvalError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::UriError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::EvalError => "EvalError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::UriError => "URIError",
        }
    }
}

/// Prototype objects every realm provides
#[derive(Debug, Clone)]
pub struct Intrinsics {
    pub object_prototype: ObjectId,
    pub function_prototype: ObjectId,
    pub array_prototype: ObjectId,
    pub string_prototype: ObjectId,
    pub number_prototype: ObjectId,
    pub boolean_prototype: ObjectId,
    pub date_prototype: ObjectId,
    pub regexp_prototype: ObjectId,
    pub array_buffer_prototype: ObjectId,
    pub uint8_array_prototype: ObjectId,
    pub error_prototypes: [ObjectId; ErrorKind::COUNT],
}

impl Intrinsics {
    #[inline]
    pub fn error_prototype(&self, kind: ErrorKind) -> ObjectId {
        self.error_prototypes[kind as usize]
    }

    fn trace(&self, tracer: &mut Tracer) {
        for id in [
            self.object_prototype,
            self.function_prototype,
            self.array_prototype,
            self.string_prototype,
            self.number_prototype,
            self.boolean_prototype,
            self.date_prototype,
            self.regexp_prototype,
            self.array_buffer_prototype,
            self.uint8_array_prototype,
        ] {
            tracer.object(id);
        }
        for id in self.error_prototypes {
            tracer.object(id);
        }
    }
}

/// One context's global state
#[derive(Debug)]
pub struct Realm {
    pub global: ObjectId,
    pub global_env: EnvId,
    pub intrinsics: Intrinsics,
    /// Whether a live context owns this realm
    pub attached: bool,
    /// Functions instantiated from host function templates, by template id
    pub host_functions: HashMap<u64, ObjectId>,
}

impl Trace for Realm {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.object(self.global);
        tracer.env(self.global_env);
        self.intrinsics.trace(tracer);
        for id in self.host_functions.values() {
            tracer.object(*id);
        }
    }
}
