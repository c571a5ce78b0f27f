//! Fixed-chunk pool allocator
//!
//! The pool owns exactly one arena obtained from its upstream resource. At
//! construction the arena is sliced into `chunk_count` chunks of
//! `chunk_size` bytes and every chunk is released onto the free list, front
//! to back. Allocation pops a chunk, deallocation pushes it back, and drop
//! returns the whole arena upstream in one call.
//!
//! # Ownership
//! A chunk is either in the free list (owned by the pool) or handed out
//! (owned by the caller until deallocated), never both. The pool does not
//! track which caller holds which chunk.
//!
//! # Misuse
//! Double free, foreign pointers and use after drop are undefined behaviour.
//! Debug builds assert ownership on deallocate; release builds check nothing.

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::free_list::FreeList;
use crate::policy::{ConcurrencyPolicy, PolicyKind, Unsynchronized, chunk_stride};
use crate::resource::{MemoryResource, SystemResource, dangling};
use serde::Serialize;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::ops::Range;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

/// Arena alignment, matching the platform's max fundamental alignment
pub const ARENA_ALIGN: usize = 16;

/// Fixed-chunk memory pool
///
/// `P` selects the free-list strategy at compile time. The upstream `R` is
/// borrowed for `'a` and must outlive the pool.
pub struct ChunkPool<'a, P = Unsynchronized, R = SystemResource>
where
    P: ConcurrencyPolicy,
    R: MemoryResource + ?Sized,
{
    free_list: P::FreeList,
    upstream: &'a R,
    /// Base of the arena
    arena: NonNull<u8>,
    /// Layout the arena was requested with
    arena_layout: Layout,
    /// Chunk stride in bytes
    chunk_size: usize,
    chunk_count: usize,
    /// Monitoring counter only, eventually consistent
    in_use: AtomicUsize,
    _policy: PhantomData<P>,
}

// SAFETY: the arena is owned by the pool and only reached through the free
// list; moving the pool moves that ownership. The upstream is shared by
// reference, hence `R: Sync`.
unsafe impl<P, R> Send for ChunkPool<'_, P, R>
where
    P: ConcurrencyPolicy,
    P::FreeList: Send,
    R: MemoryResource + Sync + ?Sized,
{
}

// SAFETY: shared access mutates only the free list (synchronized by the
// policy) and the atomic counter.
unsafe impl<P, R> Sync for ChunkPool<'_, P, R>
where
    P: ConcurrencyPolicy,
    P::FreeList: Sync,
    R: MemoryResource + Sync + ?Sized,
{
}

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Free-list policy
    pub policy: PolicyKind,
    /// Total number of chunks
    pub chunk_count: usize,
    /// Effective chunk size in bytes
    pub chunk_size: usize,
    /// Arena size in bytes
    pub capacity: usize,
    /// Chunks currently handed out
    pub in_use: usize,
    /// Chunks currently free
    pub available: usize,
}

impl<'a, P, R> ChunkPool<'a, P, R>
where
    P: ConcurrencyPolicy,
    R: MemoryResource + ?Sized,
{
    /// Create a pool of `chunk_count` chunks of at least `chunk_size` bytes
    ///
    /// The effective chunk size is `max(chunk_size, P::minimum_chunk_size())`,
    /// rounded up to the node header alignment. A pool of zero chunks is
    /// valid and always exhausted.
    ///
    /// # Errors
    /// - `CapacityOverflow` if the arena size does not fit in `usize` or the
    ///   free list cannot address `chunk_count` chunks
    /// - `InvalidLayout` if the arena layout is rejected
    /// - whatever the upstream returns when it cannot supply the arena
    pub fn new(upstream: &'a R, chunk_count: usize, chunk_size: usize) -> Result<Self> {
        let overflow = move || PoolError::CapacityOverflow {
            chunk_count,
            chunk_size,
        };
        if chunk_count > <P::FreeList as FreeList>::MAX_NODES {
            return Err(overflow());
        }
        let stride = chunk_stride(chunk_size, P::minimum_chunk_size(), P::node_align())
            .ok_or_else(overflow)?;
        let capacity = chunk_count.checked_mul(stride).ok_or_else(overflow)?;
        let arena_layout = Layout::from_size_align(capacity, ARENA_ALIGN.max(P::node_align()))?;

        let arena = upstream.allocate(arena_layout)?;
        let free_list = P::FreeList::with_arena(arena, stride);

        for index in 0..chunk_count {
            // SAFETY: index * stride < capacity, so the chunk is inside the
            // arena; the arena is aligned to at least the node alignment and
            // the stride is a multiple of it; nothing else references it yet
            unsafe {
                let chunk = arena.add(index * stride);
                P::release(&free_list, chunk);
            }
        }

        debug!(
            policy = %P::KIND,
            chunk_count,
            chunk_size = stride,
            requested_chunk_size = chunk_size,
            capacity,
            "Chunk pool created"
        );

        Ok(Self {
            free_list,
            upstream,
            arena,
            arena_layout,
            chunk_size: stride,
            chunk_count,
            in_use: AtomicUsize::new(0),
            _policy: PhantomData,
        })
    }

    /// Create a pool from a configuration
    ///
    /// # Errors
    /// `PolicyMismatch` if `config.policy` is not `P::KIND`, otherwise the
    /// errors of [`ChunkPool::new`].
    pub fn from_config(upstream: &'a R, config: &PoolConfig) -> Result<Self> {
        if config.policy != P::KIND {
            return Err(PoolError::PolicyMismatch {
                expected: P::KIND,
                found: config.policy,
            });
        }
        Self::new(upstream, config.chunk_count, config.chunk_size)
    }

    /// Hand out one chunk, or `None` if the pool is exhausted
    ///
    /// The pool always hands out a whole chunk; `layout` must fit in it.
    /// Debug builds assert this, release builds ignore `layout`.
    #[inline]
    pub fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(
            layout.size() <= self.chunk_size,
            "Requested {} bytes from a pool of {}-byte chunks",
            layout.size(),
            self.chunk_size
        );
        debug_assert!(
            layout.align() <= self.chunk_align(),
            "Requested alignment {} exceeds chunk alignment {}",
            layout.align(),
            self.chunk_align()
        );
        self.allocate_chunk()
    }

    /// Hand out one chunk without a size check
    #[inline]
    pub fn allocate_chunk(&self) -> Option<NonNull<u8>> {
        let chunk = P::acquire(&self.free_list);
        if chunk.is_some() {
            self.in_use.fetch_add(1, Ordering::Relaxed);
        } else {
            trace!(policy = %P::KIND, chunk_count = self.chunk_count, "Chunk pool exhausted");
        }
        chunk
    }

    /// Give a chunk back to the pool
    ///
    /// A free-list header is written at `ptr`; the chunk's contents are lost.
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this pool and not been
    /// deallocated since. It must not be used after this call.
    #[inline]
    pub unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        debug_assert!(
            layout.size() <= self.chunk_size,
            "Deallocating {} bytes into a pool of {}-byte chunks",
            layout.size(),
            self.chunk_size
        );
        // SAFETY: forwarded contract
        unsafe { self.deallocate_chunk(ptr) };
    }

    /// Give a chunk back to the pool without a size check
    ///
    /// # Safety
    /// Same contract as [`ChunkPool::deallocate`].
    #[inline]
    pub unsafe fn deallocate_chunk(&self, ptr: NonNull<u8>) {
        debug_assert!(self.owns(ptr), "Pointer {ptr:p} is not a chunk of this pool");
        // SAFETY: `ptr` is one of our chunks (caller contract), so it is
        // inside the arena and aligned for the node header
        unsafe { P::release(&self.free_list, ptr) };
        self.in_use.fetch_sub(1, Ordering::Relaxed);
    }

    /// Whether `ptr` is the start of one of this pool's chunks
    ///
    /// Says nothing about whether the chunk is currently allocated.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        let range = self.arena_range();
        let addr = ptr.as_ptr().addr();
        range.contains(&addr) && (addr - range.start) % self.chunk_size == 0
    }

    /// Address range covered by the arena
    pub fn arena_range(&self) -> Range<usize> {
        let start = self.arena.as_ptr().addr();
        start..start + self.arena_layout.size()
    }

    /// Base address of the arena
    #[inline]
    pub fn arena_base(&self) -> NonNull<u8> {
        self.arena
    }

    /// Effective chunk size (stride) in bytes
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Arena size in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena_layout.size()
    }

    /// Alignment guaranteed for every chunk
    #[inline]
    pub fn chunk_align(&self) -> usize {
        let stride_align = 1usize << self.chunk_size.trailing_zeros();
        stride_align.min(self.arena_layout.align())
    }

    /// Concurrency policy of this pool
    #[inline]
    pub fn policy(&self) -> PolicyKind {
        P::KIND
    }

    /// Number of chunks currently handed out
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Number of chunks currently free
    #[inline]
    pub fn available(&self) -> usize {
        self.chunk_count.saturating_sub(self.in_use())
    }

    /// Whether every chunk is handed out
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.in_use() >= self.chunk_count
    }

    /// Usage snapshot
    pub fn stats(&self) -> PoolStats {
        let in_use = self.in_use();
        PoolStats {
            policy: P::KIND,
            chunk_count: self.chunk_count,
            chunk_size: self.chunk_size,
            capacity: self.capacity(),
            in_use,
            available: self.chunk_count.saturating_sub(in_use),
        }
    }
}

impl<P, R> Drop for ChunkPool<'_, P, R>
where
    P: ConcurrencyPolicy,
    R: MemoryResource + ?Sized,
{
    fn drop(&mut self) {
        let outstanding = *self.in_use.get_mut();
        if outstanding != 0 {
            warn!(
                policy = %P::KIND,
                outstanding,
                "Chunk pool dropped with chunks still allocated"
            );
        }

        // SAFETY: the arena came from `upstream.allocate(arena_layout)` and
        // is returned exactly once, here
        unsafe { self.upstream.deallocate(self.arena, self.arena_layout) };

        debug!(
            policy = %P::KIND,
            capacity = self.arena_layout.size(),
            "Chunk pool arena returned upstream"
        );
    }
}

impl<P, R> MemoryResource for ChunkPool<'_, P, R>
where
    P: ConcurrencyPolicy,
    R: MemoryResource + ?Sized,
{
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>> {
        // Zero-size blocks never consume a chunk
        if layout.size() == 0 {
            return Ok(dangling(layout));
        }
        if layout.size() > self.chunk_size || layout.align() > self.chunk_align() {
            return Err(PoolError::LayoutTooLarge {
                size: layout.size(),
                align: layout.align(),
                chunk_size: self.chunk_size,
            });
        }
        self.allocate_chunk().ok_or(PoolError::PoolExhausted {
            chunk_count: self.chunk_count,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        // SAFETY: forwarded contract
        unsafe { self.deallocate_chunk(ptr) };
    }
}

impl<P, R> std::fmt::Debug for ChunkPool<'_, P, R>
where
    P: ConcurrencyPolicy,
    R: MemoryResource + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPool")
            .field("policy", &P::KIND)
            .field("arena", &self.arena)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_count", &self.chunk_count)
            .field("in_use", &self.in_use())
            .finish()
    }
}
