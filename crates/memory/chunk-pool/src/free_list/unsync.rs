//! Non-synchronized free list

use super::{FreeList, FreeNode};
use std::cell::Cell;
use std::ptr::NonNull;

/// Single-threaded free list
///
/// Mutates the head directly. The `Cell` head makes the type `!Sync`, so a
/// pool built on it cannot be shared between threads.
#[derive(Debug, Default)]
pub struct UnsyncStack {
    head: Cell<Option<NonNull<FreeNode>>>,
}

// SAFETY: the stack only links memory owned by whoever owns the stack, so
// moving it to another thread moves that ownership too.
unsafe impl Send for UnsyncStack {}

impl FreeList for UnsyncStack {
    type Node = FreeNode;

    fn with_arena(_base: NonNull<u8>, _stride: usize) -> Self {
        Self::default()
    }

    #[inline]
    unsafe fn push(&self, node: NonNull<FreeNode>) {
        // SAFETY: caller guarantees `node` is valid and exclusively ours
        unsafe { (*node.as_ptr()).next = self.head.get() };
        self.head.set(Some(node));
    }

    #[inline]
    fn pop(&self) -> Option<NonNull<FreeNode>> {
        let top = self.head.get()?;
        // SAFETY: every node in the list was valid when pushed and is still
        // owned by the list
        self.head.set(unsafe { top.as_ref() }.next);
        Some(top)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }
}
