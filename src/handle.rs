//! Host handle table
//!
//! Every [`Value`](crate::Value) that refers to a heap object registers the
//! object here, and the collector treats registered objects as roots. The
//! table counts references so that clones of a handle share one entry and
//! the object becomes collectable when the last one is released.
//!
//! Handles are released from `Drop`, which can run on any thread and at any
//! time. When the engine is busy on another thread the release is queued and
//! applied the next time the engine is entered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::gc::{GcRoots, ObjectId, RealmId};

static TRACE_DISPOSE: AtomicBool = AtomicBool::new(false);

/// Log every handle disposal on the `mqjs_bridge::dispose` target
pub fn set_trace_dispose(enabled: bool) {
    TRACE_DISPOSE.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn trace_dispose() -> bool {
    TRACE_DISPOSE.load(Ordering::Relaxed)
}

/// Release deferred until the engine lock is available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingRelease {
    /// A value handle: its object, if any, and its realm
    Handle {
        object: Option<ObjectId>,
        realm: Option<RealmId>,
    },
    /// A context went away; its realm stops being a root
    Context(RealmId),
}

/// Reference counted roots held by host handles
#[derive(Debug, Default)]
pub struct HandleTable {
    objects: HashMap<ObjectId, u32>,
    realms: HashMap<RealmId, u32>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retain(&mut self, id: ObjectId) {
        *self.objects.entry(id).or_insert(0) += 1;
    }

    /// Drop one reference; returns true when it was the last
    pub fn release(&mut self, id: ObjectId) -> bool {
        release_entry(&mut self.objects, id)
    }

    pub fn retain_realm(&mut self, id: RealmId) {
        *self.realms.entry(id).or_insert(0) += 1;
    }

    pub fn release_realm(&mut self, id: RealmId) -> bool {
        release_entry(&mut self.realms, id)
    }

    /// Apply a queued or immediate handle release
    pub(crate) fn apply(&mut self, object: Option<ObjectId>, realm: Option<RealmId>, trace: bool) {
        if let Some(id) = object {
            let last = self.release(id);
            if trace || trace_dispose() {
                debug!(target: "mqjs_bridge::dispose", object = id.0, last, "dispose value handle");
            }
        }
        if let Some(id) = realm {
            self.release_realm(id);
        }
    }

    /// Number of distinct objects held
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_retained(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Roots for a collection
    pub fn roots(&self) -> GcRoots {
        GcRoots {
            objects: self.objects.keys().copied().collect(),
            realms: self.realms.keys().copied().collect(),
        }
    }
}

fn release_entry<K: std::hash::Hash + Eq>(map: &mut HashMap<K, u32>, key: K) -> bool {
    match map.get_mut(&key) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        Some(_) => {
            map.remove(&key);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::Engine;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_refcounts() {
        let mut table = HandleTable::new();
        let id = ObjectId(7);
        table.retain(id);
        table.retain(id);
        assert_eq!(table.len(), 1);

        assert!(!table.release(id));
        assert!(table.is_retained(id));
        assert!(table.release(id));
        assert!(table.is_empty());

        // Releasing an unknown handle is a no-op
        assert!(!table.release(id));
    }

    #[test]
    fn test_roots() {
        let mut table = HandleTable::new();
        table.retain(ObjectId(1));
        table.retain_realm(RealmId(0));
        let roots = table.roots();
        assert_eq!(roots.objects, vec![ObjectId(1)]);
        assert_eq!(roots.realms, vec![RealmId(0)]);

        table.apply(Some(ObjectId(1)), Some(RealmId(0)), false);
        assert!(table.roots().objects.is_empty());
        assert!(table.roots().realms.is_empty());
    }

    #[test]
    fn test_trace_dispose_logs_release() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let engine = Engine::new();
            let context = engine.new_context(None);
            let value = context.scope(|scope| scope.eval("({})").unwrap());
            let held = engine.heap_stats().handles;

            set_trace_dispose(true);
            assert!(trace_dispose());
            drop(value);
            set_trace_dispose(false);
            assert_eq!(engine.heap_stats().handles, held - 1);
        });

        let log = String::from_utf8(captured.0.lock().clone()).unwrap();
        assert!(log.contains("dispose value handle"), "{}", log);
    }
}
