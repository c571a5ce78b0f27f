//! Lock-free free list (Treiber stack)
//!
//! Push and pop are compare-and-swap retry loops on an atomic head. There is
//! no backoff and no bound on retries under contention.
//!
//! # ABA prevention
//! The head is a tagged index, not a raw pointer: on 64-bit targets the upper
//! 32 bits carry a generation counter bumped by every successful push and
//! pop, the lower 32 bits the chunk index within the arena. A pop that
//! stalls while the same chunk is popped and pushed back fails its CAS
//! because the generation moved on. 32-bit targets store the bare index and
//! get no ABA protection.
//!
//! # Reclamation
//! No reclamation scheme is implemented. A popping thread may read the link
//! of a node another thread already took; this is only sound because nodes
//! are chunks of an arena that stays mapped until the owning pool is dropped,
//! and the pool cannot be dropped while other threads still borrow it.
//!
//! Such a stale `pop` performs an atomic read of a link that the node's new
//! owner may be overwriting with plain, non-atomic data. The value read is
//! never used: the head's generation has moved on, so the CAS fails and the
//! loop retries. The overlap of that atomic read with a plain write remains
//! a formal data race under the Rust memory model.

use super::FreeList;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

// Tagged index layout: upper 32 bits = generation, lower 32 bits = index
#[cfg(target_pointer_width = "64")]
const TAG_BITS: usize = 32;
#[cfg(target_pointer_width = "64")]
const INDEX_MASK: usize = 0xFFFF_FFFF;

// 32-bit fallback - no tagging, just the index
#[cfg(not(target_pointer_width = "64"))]
const INDEX_MASK: usize = usize::MAX;

/// Index marking the end of the list
const NIL: usize = INDEX_MASK;

#[inline(always)]
#[cfg(target_pointer_width = "64")]
fn pack_tagged(generation: u32, index: usize) -> usize {
    ((generation as usize) << TAG_BITS) | (index & INDEX_MASK)
}

#[inline(always)]
#[cfg(target_pointer_width = "64")]
fn unpack_generation(tagged: usize) -> u32 {
    (tagged >> TAG_BITS) as u32
}

#[inline(always)]
#[cfg(not(target_pointer_width = "64"))]
fn pack_tagged(_generation: u32, index: usize) -> usize {
    index
}

#[inline(always)]
#[cfg(not(target_pointer_width = "64"))]
fn unpack_generation(_tagged: usize) -> u32 {
    0
}

#[inline(always)]
fn unpack_index(tagged: usize) -> usize {
    tagged & INDEX_MASK
}

/// Link header for the lock-free stack
///
/// Holds the arena index of the next free chunk. The link is atomic because
/// a racing `pop` may read it while another thread takes the node.
#[repr(C)]
#[derive(Debug)]
pub struct AtomicNode {
    next: AtomicUsize,
}

impl Default for AtomicNode {
    fn default() -> Self {
        Self {
            next: AtomicUsize::new(NIL),
        }
    }
}

/// Lock-free free list
///
/// Nodes are addressed by index within the arena the list was built for.
#[derive(Debug)]
pub struct LockFreeStack {
    /// Tagged index of the top node
    head: AtomicUsize,
    base: NonNull<u8>,
    stride: usize,
}

// SAFETY: all shared state is the atomic head; `base` and `stride` are
// immutable, and nodes change hands only through successful CAS operations.
unsafe impl Send for LockFreeStack {}
unsafe impl Sync for LockFreeStack {}

impl LockFreeStack {
    #[inline(always)]
    fn index_of(&self, node: NonNull<AtomicNode>) -> usize {
        (node.as_ptr().addr() - self.base.as_ptr().addr()) / self.stride
    }

    /// # Safety
    /// `index` must name a chunk inside the arena.
    #[inline(always)]
    unsafe fn node_at(&self, index: usize) -> NonNull<AtomicNode> {
        // SAFETY: caller guarantees the offset stays inside the arena
        unsafe { self.base.add(index * self.stride) }.cast()
    }
}

impl FreeList for LockFreeStack {
    type Node = AtomicNode;

    const MAX_NODES: usize = NIL;

    fn with_arena(base: NonNull<u8>, stride: usize) -> Self {
        debug_assert!(stride >= size_of::<AtomicNode>(), "Stride {stride} too small");
        Self {
            head: AtomicUsize::new(pack_tagged(0, NIL)),
            base,
            stride,
        }
    }

    #[inline]
    unsafe fn push(&self, node: NonNull<AtomicNode>) {
        let index = self.index_of(node);
        debug_assert!(index < NIL, "Node index {index} out of range");

        // SAFETY: caller guarantees `node` is valid and exclusively ours
        let link = unsafe { &node.as_ref().next };

        loop {
            let head = self.head.load(Ordering::Relaxed);

            // Store current head as our next
            link.store(unpack_index(head), Ordering::Relaxed);

            let new_head = pack_tagged(unpack_generation(head).wrapping_add(1), index);

            // Release publishes the link store to the thread that pops us
            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    #[inline]
    fn pop(&self) -> Option<NonNull<AtomicNode>> {
        loop {
            let head = self.head.load(Ordering::Acquire);

            let index = unpack_index(head);
            if index == NIL {
                return None;
            }

            // SAFETY: every index in the head was pushed from this arena,
            // which stays mapped while the list is alive, so even a stale
            // head names readable memory
            let node = unsafe { self.node_at(index) };
            let next = unsafe { node.as_ref() }.next.load(Ordering::Relaxed);

            let new_head = pack_tagged(unpack_generation(head).wrapping_add(1), next);

            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(node);
            }
        }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        unpack_index(self.head.load(Ordering::Acquire)) == NIL
    }
}
