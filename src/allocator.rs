//! Allocator hook for `ArrayBuffer` storage
//!
//! Buffer memory comes from a single process-wide allocator. Installing a
//! new allocator replaces the singleton for buffers created afterwards;
//! existing buffers keep the allocator that produced them and return their
//! memory to it.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Source of zero-filled buffer memory
pub trait ArrayBufferAllocator: Send + Sync {
    /// Allocate `length` zeroed bytes, or `None` when out of memory
    fn allocate(&self, length: usize) -> Option<Vec<u8>>;

    /// Return a block obtained from [`allocate`](Self::allocate)
    fn free(&self, data: Vec<u8>);
}

/// Allocator backed by the global Rust allocator
#[derive(Debug, Default)]
pub struct DefaultAllocator;

impl ArrayBufferAllocator for DefaultAllocator {
    fn allocate(&self, length: usize) -> Option<Vec<u8>> {
        let mut data = Vec::new();
        data.try_reserve_exact(length).ok()?;
        data.resize(length, 0);
        Some(data)
    }

    fn free(&self, data: Vec<u8>) {
        drop(data);
    }
}

static ALLOCATOR: Lazy<RwLock<Arc<dyn ArrayBufferAllocator>>> =
    Lazy::new(|| RwLock::new(Arc::new(DefaultAllocator)));

/// Install the process-wide buffer allocator
pub fn set_array_buffer_allocator(allocator: Arc<dyn ArrayBufferAllocator>) {
    *ALLOCATOR.write() = allocator;
}

/// The allocator currently installed
pub fn array_buffer_allocator() -> Arc<dyn ArrayBufferAllocator> {
    ALLOCATOR.read().clone()
}

/// Buffer memory owned by an `ArrayBuffer` object
pub struct BufferData {
    bytes: Vec<u8>,
    allocator: Arc<dyn ArrayBufferAllocator>,
}

impl BufferData {
    /// Allocate through the installed allocator
    pub fn allocate(length: usize) -> Option<Self> {
        let allocator = array_buffer_allocator();
        let bytes = allocator.allocate(length)?;
        Some(BufferData { bytes, allocator })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl std::fmt::Debug for BufferData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferData({} bytes)", self.bytes.len())
    }
}

impl Drop for BufferData {
    fn drop(&mut self) {
        self.allocator.free(std::mem::take(&mut self.bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        live: AtomicUsize,
    }

    impl ArrayBufferAllocator for Counting {
        fn allocate(&self, length: usize) -> Option<Vec<u8>> {
            self.live.fetch_add(length, Ordering::SeqCst);
            Some(vec![0; length])
        }

        fn free(&self, data: Vec<u8>) {
            self.live.fetch_sub(data.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_buffer_returns_memory_to_its_allocator() {
        let counting = Arc::new(Counting {
            live: AtomicUsize::new(0),
        });
        let data = {
            let bytes = counting.allocate(16).unwrap();
            BufferData {
                bytes,
                allocator: counting.clone(),
            }
        };
        assert_eq!(data.len(), 16);
        assert!(data.bytes().iter().all(|b| *b == 0));
        assert_eq!(counting.live.load(Ordering::SeqCst), 16);
        drop(data);
        assert_eq!(counting.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_default_allocator() {
        let data = DefaultAllocator.allocate(8).unwrap();
        assert_eq!(data, vec![0; 8]);
    }
}
