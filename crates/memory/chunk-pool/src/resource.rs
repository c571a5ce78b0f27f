//! Upstream allocator abstraction
//!
//! The pool only ever asks its upstream for one block and gives it back once.
//! Anything implementing [`MemoryResource`] can serve as that source,
//! including another pool.

use crate::error::{PoolError, Result};
use std::alloc::{Layout, alloc, dealloc};
use std::ptr::{self, NonNull};

/// Source of raw memory blocks
///
/// Zero-size requests must succeed with a non-null, suitably aligned pointer
/// that is never dereferenced; deallocating such a pointer is a no-op.
pub trait MemoryResource {
    /// Allocate a block fitting `layout`
    ///
    /// # Errors
    /// Returns an error if the resource cannot supply the block.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>>;

    /// Return a block obtained from `allocate`
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this resource with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

impl<R: MemoryResource + ?Sized> MemoryResource for &R {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        (**self).allocate(layout)
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded contract
        unsafe { (**self).deallocate(ptr, layout) }
    }
}

/// Process heap via the global allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResource;

impl MemoryResource for SystemResource {
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }

        // SAFETY: layout has non-zero size
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr).ok_or(PoolError::UpstreamExhausted {
            size: layout.size(),
            align: layout.align(),
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: caller guarantees `ptr` came from `allocate(layout)`
        unsafe { dealloc(ptr.as_ptr(), layout) };
    }
}

/// Non-null pointer aligned for `layout`, valid for zero-size access only
#[inline]
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    NonNull::new(ptr::without_provenance_mut(layout.align())).unwrap_or(NonNull::dangling())
}
