//! Arena storage for the JavaScript heap
//!
//! ```text
//! objects: [ obj | obj | free | obj | free | ... ]   free list: [2, 4]
//! envs:    [ env | env | ... ]
//! realms:  [ realm | free | ... ]
//! ```
//!
//! Ids are slot indices. A freed slot is recycled by the next allocation of
//! the same kind, so an id is only meaningful while the collector keeps the
//! slot alive.

use super::{EnvId, ObjectId, RealmId};
use crate::runtime::env::Env;
use crate::runtime::object::JSObject;
use crate::runtime::realm::Realm;

/// Typed arena with slot reuse
pub(crate) struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    fn alloc(&mut self, value: T) -> u32 {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(value);
                index
            }
            None => {
                self.slots.push(Some(value));
                (self.slots.len() - 1) as u32
            }
        }
    }

    #[inline]
    fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    #[inline]
    fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    pub(crate) fn free(&mut self, index: u32) -> Option<T> {
        let value = self.slots.get_mut(index as usize)?.take()?;
        self.free.push(index);
        self.live -= 1;
        Some(value)
    }

    /// Number of slots, live or free
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn is_live(&self, index: u32) -> bool {
        self.get(index).is_some()
    }

    #[inline]
    fn len(&self) -> usize {
        self.live
    }
}

/// The JavaScript heap
pub struct Heap {
    pub(crate) objects: Arena<JSObject>,
    pub(crate) envs: Arena<Env>,
    pub(crate) realms: Arena<Realm>,
    /// Allocations since the last collection
    allocated: usize,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Heap {
            objects: Arena::new(),
            envs: Arena::new(),
            realms: Arena::new(),
            allocated: 0,
        }
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Allocate an object
    pub fn alloc_object(&mut self, object: JSObject) -> ObjectId {
        self.allocated += 1;
        ObjectId(self.objects.alloc(object))
    }

    /// Get an object
    ///
    /// # Panics
    /// Panics if the object has been collected.
    #[inline]
    pub fn object(&self, id: ObjectId) -> &JSObject {
        match self.objects.get(id.0) {
            Some(object) => object,
            None => panic!("use of collected object #{}", id.0),
        }
    }

    /// Get an object mutably
    #[inline]
    pub fn object_mut(&mut self, id: ObjectId) -> &mut JSObject {
        match self.objects.get_mut(id.0) {
            Some(object) => object,
            None => panic!("use of collected object #{}", id.0),
        }
    }

    /// Get an object if it is still alive
    #[inline]
    pub fn try_object(&self, id: ObjectId) -> Option<&JSObject> {
        self.objects.get(id.0)
    }

    /// Number of live objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // =========================================================================
    // Environments
    // =========================================================================

    /// Allocate a variable environment
    pub fn alloc_env(&mut self, env: Env) -> EnvId {
        self.allocated += 1;
        EnvId(self.envs.alloc(env))
    }

    #[inline]
    pub fn env(&self, id: EnvId) -> &Env {
        match self.envs.get(id.0) {
            Some(env) => env,
            None => panic!("use of collected environment #{}", id.0),
        }
    }

    #[inline]
    pub fn env_mut(&mut self, id: EnvId) -> &mut Env {
        match self.envs.get_mut(id.0) {
            Some(env) => env,
            None => panic!("use of collected environment #{}", id.0),
        }
    }

    /// Number of live environments
    pub fn env_count(&self) -> usize {
        self.envs.len()
    }

    // =========================================================================
    // Realms
    // =========================================================================

    pub fn alloc_realm(&mut self, realm: Realm) -> RealmId {
        RealmId(self.realms.alloc(realm))
    }

    #[inline]
    pub fn realm(&self, id: RealmId) -> &Realm {
        match self.realms.get(id.0) {
            Some(realm) => realm,
            None => panic!("use of collected realm #{}", id.0),
        }
    }

    #[inline]
    pub fn realm_mut(&mut self, id: RealmId) -> &mut Realm {
        match self.realms.get_mut(id.0) {
            Some(realm) => realm,
            None => panic!("use of collected realm #{}", id.0),
        }
    }

    #[inline]
    pub fn try_realm(&self, id: RealmId) -> Option<&Realm> {
        self.realms.get(id.0)
    }

    /// Ids of all allocated realms
    pub fn realm_ids(&self) -> Vec<RealmId> {
        (0..self.realms.capacity() as u32)
            .filter(|i| self.realms.is_live(*i))
            .map(RealmId)
            .collect()
    }

    /// Number of allocated realms
    pub fn realm_count(&self) -> usize {
        self.realms.len()
    }

    // =========================================================================
    // Collection bookkeeping
    // =========================================================================

    /// Allocations since the last collection
    #[inline]
    pub fn allocated_since_gc(&self) -> usize {
        self.allocated
    }

    pub(crate) fn reset_allocation_count(&mut self) {
        self.allocated = 0;
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object::{ClassId, JSObject};

    #[test]
    fn test_slot_reuse() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(JSObject::new(ClassId::Object, None));
        let b = heap.alloc_object(JSObject::new(ClassId::Object, None));
        assert_ne!(a, b);
        assert_eq!(heap.object_count(), 2);

        assert!(heap.objects.free(a.0).is_some());
        assert!(heap.try_object(a).is_none());
        assert_eq!(heap.object_count(), 1);

        let c = heap.alloc_object(JSObject::new(ClassId::Array, None));
        assert_eq!(c, a);
        assert_eq!(heap.object(c).class, ClassId::Array);
        assert_eq!(heap.allocated_since_gc(), 3);
    }

    #[test]
    #[should_panic(expected = "use of collected object")]
    fn test_use_after_free_panics() {
        let mut heap = Heap::new();
        let a = heap.alloc_object(JSObject::new(ClassId::Object, None));
        heap.objects.free(a.0);
        let _ = heap.object(a);
    }
}
