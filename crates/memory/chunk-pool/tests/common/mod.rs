//! Shared upstream resources for pool tests

#![allow(dead_code)]

use chunk_pool::{MemoryResource, PoolError, Result, SystemResource};
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Heap resource that records every call
#[derive(Debug, Default)]
pub struct CountingResource {
    allocations: AtomicUsize,
    deallocations: AtomicUsize,
    last_allocated: AtomicUsize,
    last_deallocated: AtomicUsize,
}

impl CountingResource {
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }

    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }

    /// Size of the most recent allocation request
    pub fn last_allocated(&self) -> usize {
        self.last_allocated.load(Ordering::SeqCst)
    }

    /// Size passed to the most recent deallocation
    pub fn last_deallocated(&self) -> usize {
        self.last_deallocated.load(Ordering::SeqCst)
    }
}

impl MemoryResource for CountingResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        self.allocations.fetch_add(1, Ordering::SeqCst);
        self.last_allocated.store(layout.size(), Ordering::SeqCst);
        SystemResource.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::SeqCst);
        self.last_deallocated.store(layout.size(), Ordering::SeqCst);
        unsafe { SystemResource.deallocate(ptr, layout) };
    }
}

/// Resource that refuses every request
#[derive(Debug, Default)]
pub struct ExhaustedResource {
    deallocations: AtomicUsize,
}

impl ExhaustedResource {
    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::SeqCst)
    }
}

impl MemoryResource for ExhaustedResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        Err(PoolError::UpstreamExhausted {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        self.deallocations.fetch_add(1, Ordering::SeqCst);
    }
}
