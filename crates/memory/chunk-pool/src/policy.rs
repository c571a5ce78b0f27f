//! Concurrency policy selection
//!
//! A policy maps a concurrency tag to its free-list type at compile time and
//! derives the smallest chunk that can host that list's node header.
//! `PolicyKind` is the runtime tag used by configuration.

use crate::error::PoolError;
use crate::free_list::{AtomicNode, FreeList, FreeNode, LockFreeStack, LockedStack, UnsyncStack};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::str::FromStr;

/// Concurrency policy tag
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Single-threaded, no synchronization
    #[default]
    None = 0,
    /// Compare-and-swap stack
    LockFree = 1,
    /// Mutex-guarded stack
    LockBased = 2,
}

impl PolicyKind {
    /// All policies, in tag order
    pub const ALL: [Self; 3] = [Self::None, Self::LockFree, Self::LockBased];

    /// Canonical name, as accepted by `FromStr` and serde
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LockFree => "lock-free",
            Self::LockBased => "lock-based",
        }
    }

    /// Smallest chunk able to hold this policy's node header
    pub const fn minimum_chunk_size(self) -> usize {
        match self {
            Self::None | Self::LockBased => size_of::<FreeNode>(),
            Self::LockFree => size_of::<AtomicNode>(),
        }
    }

    /// Alignment of this policy's node header
    pub const fn node_align(self) -> usize {
        match self {
            Self::None | Self::LockBased => align_of::<FreeNode>(),
            Self::LockFree => align_of::<AtomicNode>(),
        }
    }

    /// Whether pools under this policy may be shared between threads
    pub const fn is_thread_safe(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "unsync" | "single" => Ok(Self::None),
            "lock-free" | "lockfree" | "lk-free" => Ok(Self::LockFree),
            "lock-based" | "lockbased" | "mutex" | "lk-based" => Ok(Self::LockBased),
            _ => Err(PoolError::UnknownPolicy { name: s.to_string() }),
        }
    }
}

/// Compile-time concurrency policy
///
/// Implemented by the marker types [`Unsynchronized`], [`LockFree`] and
/// [`LockBased`].
pub trait ConcurrencyPolicy {
    /// Free list backing pools under this policy
    type FreeList: FreeList;

    /// Runtime tag of this policy
    const KIND: PolicyKind;

    /// Byte size of the node header; no chunk may be smaller
    #[inline]
    fn minimum_chunk_size() -> usize {
        size_of::<<Self::FreeList as FreeList>::Node>()
    }

    /// Alignment every chunk must satisfy to host the node header
    #[inline]
    fn node_align() -> usize {
        align_of::<<Self::FreeList as FreeList>::Node>()
    }

    /// Pop a free chunk and return it as raw memory
    #[inline]
    fn acquire(list: &Self::FreeList) -> Option<NonNull<u8>> {
        list.pop().map(NonNull::cast)
    }

    /// Write a fresh node header at `ptr` and push it onto `list`
    ///
    /// The chunk's previous contents are overwritten.
    ///
    /// # Safety
    /// - `ptr` must be valid for writes of `minimum_chunk_size()` bytes and
    ///   aligned to `node_align()`
    /// - the memory must stay valid while `list` is in use
    /// - `ptr` must not currently be in `list` (no double release)
    #[inline]
    unsafe fn release(list: &Self::FreeList, ptr: NonNull<u8>) {
        let node = ptr.cast::<<Self::FreeList as FreeList>::Node>();
        // SAFETY: caller guarantees the region fits an aligned node header;
        // from here on the chunk is a free node owned by the list
        unsafe {
            node.as_ptr().write(Default::default());
            list.push(node);
        }
    }
}

/// Single-threaded policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsynchronized;

/// Lock-free policy
#[derive(Debug, Clone, Copy, Default)]
pub struct LockFree;

/// Lock-based policy
#[derive(Debug, Clone, Copy, Default)]
pub struct LockBased;

impl ConcurrencyPolicy for Unsynchronized {
    type FreeList = UnsyncStack;
    const KIND: PolicyKind = PolicyKind::None;
}

impl ConcurrencyPolicy for LockFree {
    type FreeList = LockFreeStack;
    const KIND: PolicyKind = PolicyKind::LockFree;
}

impl ConcurrencyPolicy for LockBased {
    type FreeList = LockedStack;
    const KIND: PolicyKind = PolicyKind::LockBased;
}

/// Chunk stride for a requested chunk size
///
/// `max(requested, minimum)` rounded up to `align`, or `None` on overflow.
#[inline]
pub(crate) fn chunk_stride(requested: usize, minimum: usize, align: usize) -> Option<usize> {
    requested.max(minimum).checked_next_multiple_of(align)
}
