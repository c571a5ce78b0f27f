//! Intrusive free-list stacks
//!
//! A free list threads through the chunks it tracks: while a chunk is free,
//! its first bytes hold the link to the next free chunk. The list owns no
//! memory of its own and never walks the chain except to pop.
//!
//! All three variants share one contract:
//! - `push(node)`: `node` becomes the new head
//! - `pop()`: removes and returns the head, `None` when empty

mod lock_free;
mod locked;
mod unsync;

pub use lock_free::{AtomicNode, LockFreeStack};
pub use locked::LockedStack;
pub use unsync::UnsyncStack;

use std::ptr::NonNull;

/// Link header stored in a free chunk
///
/// Used by the single-threaded and lock-based stacks, where the link is only
/// touched by the thread that owns the head.
#[repr(C)]
#[derive(Debug, Default)]
pub struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// LIFO stack of free nodes
pub trait FreeList {
    /// Header written into every free chunk
    type Node: Default;

    /// Largest number of nodes the list can address
    const MAX_NODES: usize = usize::MAX;

    /// Create an empty list for the chunks of one arena
    ///
    /// `stride` is the distance between consecutive chunks. Only variants
    /// that address nodes by index make use of the arena geometry.
    fn with_arena(base: NonNull<u8>, stride: usize) -> Self;

    /// Push `node` on top of the stack
    ///
    /// # Safety
    /// - `node` must point to an initialized `Self::Node`
    /// - the caller must own `node` exclusively; it must not already be in
    ///   this or any other free list
    /// - the node's memory must stay valid for as long as the list is used
    unsafe fn push(&self, node: NonNull<Self::Node>);

    /// Pop the top node, or `None` if the stack is empty
    fn pop(&self) -> Option<NonNull<Self::Node>>;

    /// Whether the stack currently holds no nodes
    ///
    /// Only a snapshot for the concurrent variants.
    fn is_empty(&self) -> bool;
}
