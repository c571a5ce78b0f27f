//! Lock-based free list

use super::{FreeList, FreeNode};
use parking_lot::Mutex;
use std::ptr::NonNull;

/// Mutex-guarded free list
///
/// One lock covers both push and pop. The guard is dropped on every exit
/// path, including unwinding.
#[derive(Debug, Default)]
pub struct LockedStack {
    head: Mutex<Option<NonNull<FreeNode>>>,
}

// SAFETY: the head and every link reachable from it are only read or written
// while holding the mutex.
unsafe impl Send for LockedStack {}
unsafe impl Sync for LockedStack {}

impl FreeList for LockedStack {
    type Node = FreeNode;

    fn with_arena(_base: NonNull<u8>, _stride: usize) -> Self {
        Self::default()
    }

    #[inline]
    unsafe fn push(&self, node: NonNull<FreeNode>) {
        let mut head = self.head.lock();
        // SAFETY: caller guarantees `node` is valid and exclusively ours
        unsafe { (*node.as_ptr()).next = *head };
        *head = Some(node);
    }

    #[inline]
    fn pop(&self) -> Option<NonNull<FreeNode>> {
        let mut head = self.head.lock();
        let top = (*head)?;
        // SAFETY: nodes reachable from the head are owned by the list and
        // only touched under the lock
        *head = unsafe { top.as_ref() }.next;
        Some(top)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head.lock().is_none()
    }
}
