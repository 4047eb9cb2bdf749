//! Garbage collector module
//!
//! Objects, environments and realms live in typed arenas owned by [`Heap`]
//! and are addressed by small integer ids. The collector is a plain
//! mark-sweep over those arenas; freed slots go on a free list and are
//! reused by later allocations.
//!
//! Collection only runs when no script is executing, so the roots are
//! exactly the attached realms, the host handle table and the pending
//! exception. Nothing on the Rust stack needs to be scanned.

mod allocator;
mod collector;

pub use allocator::Heap;
pub use collector::{GcRoots, Trace, Tracer};

/// Index of an object in the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

/// Index of a variable environment in the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(pub(crate) u32);

/// Index of a realm (one per context) in the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealmId(pub(crate) u32);

/// Heap occupancy snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live objects
    pub objects: usize,
    /// Live variable environments
    pub environments: usize,
    /// Host handles currently registered
    pub handles: usize,
    /// Realms still allocated, attached or not
    pub contexts: usize,
}

impl Heap {
    /// Run garbage collection
    ///
    /// Returns the number of objects freed.
    pub fn collect(&mut self, roots: &GcRoots) -> usize {
        collector::collect(self, roots)
    }
}
