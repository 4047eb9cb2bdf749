//! Mark-sweep garbage collector
//!
//! The GC works in two phases:
//! 1. Mark: starting from the roots, walk every reachable object,
//!    environment and realm with an explicit work list
//! 2. Sweep: free every slot that was not marked
//!
//! Realms are roots while their context is attached. A detached realm
//! survives as long as a reachable function still belongs to it.

use tracing::debug;

use super::allocator::Heap;
use super::{EnvId, ObjectId, RealmId};
use crate::runtime::JSValue;

/// Roots supplied by the runtime
#[derive(Debug, Default)]
pub struct GcRoots {
    /// Objects referenced from outside the heap (host handles, pending throws)
    pub objects: Vec<ObjectId>,
    /// Realms that must survive regardless of attachment
    pub realms: Vec<RealmId>,
}

/// Work list filled by [`Trace`] implementations
#[derive(Default)]
pub struct Tracer {
    objects: Vec<ObjectId>,
    envs: Vec<EnvId>,
    realms: Vec<RealmId>,
}

impl Tracer {
    #[inline]
    pub fn object(&mut self, id: ObjectId) {
        self.objects.push(id);
    }

    #[inline]
    pub fn env(&mut self, id: EnvId) {
        self.envs.push(id);
    }

    #[inline]
    pub fn realm(&mut self, id: RealmId) {
        self.realms.push(id);
    }

    #[inline]
    pub fn value(&mut self, value: &JSValue) {
        if let JSValue::Object(id) = value {
            self.objects.push(*id);
        }
    }
}

/// Types that hold heap references
pub trait Trace {
    fn trace(&self, tracer: &mut Tracer);
}

/// Run a full collection, returning the number of objects freed
pub fn collect(heap: &mut Heap, roots: &GcRoots) -> usize {
    let mut object_marks = vec![false; heap.objects.capacity()];
    let mut env_marks = vec![false; heap.envs.capacity()];
    let mut realm_marks = vec![false; heap.realms.capacity()];

    // Phase 1: mark
    let mut tracer = Tracer::default();
    tracer.objects.extend_from_slice(&roots.objects);
    tracer.realms.extend_from_slice(&roots.realms);
    for id in heap.realm_ids() {
        if heap.realm(id).attached {
            tracer.realm(id);
        }
    }

    loop {
        if let Some(id) = tracer.objects.pop() {
            let index = id.0 as usize;
            if index < object_marks.len() && !object_marks[index] {
                if let Some(object) = heap.try_object(id) {
                    object_marks[index] = true;
                    object.trace(&mut tracer);
                }
            }
        } else if let Some(id) = tracer.envs.pop() {
            let index = id.0 as usize;
            if index < env_marks.len() && !env_marks[index] && heap.envs.is_live(id.0) {
                env_marks[index] = true;
                heap.env(id).trace(&mut tracer);
            }
        } else if let Some(id) = tracer.realms.pop() {
            let index = id.0 as usize;
            if index < realm_marks.len() && !realm_marks[index] {
                if let Some(realm) = heap.try_realm(id) {
                    realm_marks[index] = true;
                    realm.trace(&mut tracer);
                }
            }
        } else {
            break;
        }
    }

    // Phase 2: sweep
    let mut freed_objects = 0;
    for (index, marked) in object_marks.iter().enumerate() {
        if !marked && heap.objects.free(index as u32).is_some() {
            freed_objects += 1;
        }
    }
    let mut freed_envs = 0;
    for (index, marked) in env_marks.iter().enumerate() {
        if !marked && heap.envs.free(index as u32).is_some() {
            freed_envs += 1;
        }
    }
    let mut freed_realms = 0;
    for (index, marked) in realm_marks.iter().enumerate() {
        if !marked && heap.realms.free(index as u32).is_some() {
            freed_realms += 1;
        }
    }

    heap.reset_allocation_count();
    debug!(
        freed_objects,
        freed_envs,
        freed_realms,
        live_objects = heap.object_count(),
        "gc cycle"
    );
    freed_objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object::{ClassId, JSObject};
    use crate::runtime::property::PropertyFlags;

    #[test]
    fn test_unreachable_objects_are_freed() {
        let mut heap = Heap::new();
        let root = heap.alloc_object(JSObject::new(ClassId::Object, None));
        let child = heap.alloc_object(JSObject::new(ClassId::Object, None));
        let garbage = heap.alloc_object(JSObject::new(ClassId::Object, None));
        heap.object_mut(root)
            .define_value("child".into(), JSValue::Object(child), PropertyFlags::NONE);

        let roots = GcRoots {
            objects: vec![root],
            realms: Vec::new(),
        };
        assert_eq!(heap.collect(&roots), 1);
        assert!(heap.try_object(root).is_some());
        assert!(heap.try_object(child).is_some());
        assert!(heap.try_object(garbage).is_none());
        assert_eq!(heap.allocated_since_gc(), 0);
    }

    #[test]
    fn test_cycles_are_collected() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(JSObject::new(ClassId::Object, None));
        let b = heap.alloc_object(JSObject::new(ClassId::Object, Some(a)));
        heap.object_mut(a).proto = Some(b);

        assert_eq!(heap.collect(&GcRoots::default()), 2);
        assert_eq!(heap.object_count(), 0);
    }
}
