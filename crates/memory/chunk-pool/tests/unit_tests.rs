//! Pool behaviour tests
//!
//! Covers every policy for:
//! - exhaustion after exactly N allocations
//! - LIFO reuse of released chunks
//! - chunk addresses inside the arena and on stride boundaries
//! - minimum chunk size and zero-chunk pools
//! - arena handed back upstream exactly once

mod common;

use chunk_pool::{
    ChunkPool, ConcurrencyPolicy, LockBased, LockFree, MemoryResource, PolicyKind, PoolConfig,
    PoolError, SystemResource, Unsynchronized,
};
use common::{CountingResource, ExhaustedResource};
use pretty_assertions::assert_eq;
use rstest::*;
use std::alloc::Layout;
use std::collections::HashSet;
use std::ptr::NonNull;

#[fixture]
fn upstream() -> CountingResource {
    CountingResource::default()
}

/// Allocate until exhausted, returning the chunks handed out
fn drain<P: ConcurrencyPolicy, R: MemoryResource + ?Sized>(
    pool: &ChunkPool<'_, P, R>,
) -> Vec<NonNull<u8>> {
    let mut chunks = Vec::new();
    while let Some(chunk) = pool.allocate_chunk() {
        chunks.push(chunk);
        assert!(chunks.len() <= pool.chunk_count(), "pool handed out too many chunks");
    }
    chunks
}

fn release_all<P: ConcurrencyPolicy, R: MemoryResource + ?Sized>(
    pool: &ChunkPool<'_, P, R>,
    chunks: Vec<NonNull<u8>>,
) {
    for chunk in chunks {
        unsafe { pool.deallocate_chunk(chunk) };
    }
}

fn check_exact_capacity<P: ConcurrencyPolicy>(chunk_count: usize, chunk_size: usize) {
    let upstream = SystemResource;
    let pool = ChunkPool::<P>::new(&upstream, chunk_count, chunk_size).unwrap();

    let chunks = drain(&pool);
    assert_eq!(chunks.len(), chunk_count);
    assert!(pool.allocate_chunk().is_none());
    assert!(pool.is_exhausted());
    assert_eq!(pool.in_use(), chunk_count);

    release_all(&pool, chunks);
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.available(), chunk_count);
}

#[rstest]
#[case(0, 8)]
#[case(1, 8)]
#[case(4, 4)]
#[case(16, 64)]
#[case(1000, 24)]
fn test_exactly_n_allocations(#[case] chunk_count: usize, #[case] chunk_size: usize) {
    check_exact_capacity::<Unsynchronized>(chunk_count, chunk_size);
    check_exact_capacity::<LockFree>(chunk_count, chunk_size);
    check_exact_capacity::<LockBased>(chunk_count, chunk_size);
}

fn check_lifo_reuse<P: ConcurrencyPolicy>() {
    let upstream = SystemResource;
    let pool = ChunkPool::<P>::new(&upstream, 4, size_of::<u32>()).unwrap();
    let layout = Layout::new::<u32>();

    let first = pool.allocate(layout).unwrap();
    let second = pool.allocate(layout).unwrap();
    assert_ne!(first, second);

    unsafe { pool.deallocate(first, layout) };
    assert_eq!(pool.allocate(layout), Some(first));

    unsafe {
        pool.deallocate(second, layout);
        pool.deallocate(first, layout);
    }
    assert_eq!(pool.allocate(layout), Some(first));
    assert_eq!(pool.allocate(layout), Some(second));
}

#[test]
fn test_release_then_allocate_returns_same_chunk() {
    check_lifo_reuse::<Unsynchronized>();
    check_lifo_reuse::<LockFree>();
    check_lifo_reuse::<LockBased>();
}

#[test]
fn test_chunks_handed_out_back_to_front() {
    let upstream = SystemResource;
    let pool = ChunkPool::<Unsynchronized>::new(&upstream, 3, 16).unwrap();
    let base = pool.arena_base().as_ptr().addr();

    let order: Vec<usize> = drain(&pool)
        .iter()
        .map(|chunk| (chunk.as_ptr().addr() - base) / pool.chunk_size())
        .collect();
    assert_eq!(order, vec![2, 1, 0]);
}

fn check_addresses_in_arena<P: ConcurrencyPolicy>(chunk_count: usize, chunk_size: usize) {
    let upstream = SystemResource;
    let pool = ChunkPool::<P>::new(&upstream, chunk_count, chunk_size).unwrap();
    let range = pool.arena_range();
    assert_eq!(range.len(), chunk_count * pool.chunk_size());

    let chunks = drain(&pool);
    let mut seen = HashSet::new();
    for chunk in &chunks {
        let addr = chunk.as_ptr().addr();
        assert!(range.contains(&addr));
        assert_eq!((addr - range.start) % pool.chunk_size(), 0);
        assert_eq!(addr % pool.chunk_align(), 0);
        assert!(pool.owns(*chunk));
        assert!(seen.insert(addr), "chunk {addr:#x} handed out twice");
    }
    assert_eq!(seen.len(), chunk_count);

    release_all(&pool, chunks);
}

#[rstest]
#[case(8, 8)]
#[case(32, 48)]
#[case(7, 13)]
#[case(64, 1)]
fn test_addresses_lie_in_arena(#[case] chunk_count: usize, #[case] chunk_size: usize) {
    check_addresses_in_arena::<Unsynchronized>(chunk_count, chunk_size);
    check_addresses_in_arena::<LockFree>(chunk_count, chunk_size);
    check_addresses_in_arena::<LockBased>(chunk_count, chunk_size);
}

#[rstest]
fn test_zero_chunk_pool_is_exhausted(upstream: CountingResource) {
    {
        let pool = ChunkPool::<LockFree, _>::new(&upstream, 0, 64).unwrap();
        assert!(pool.allocate_chunk().is_none());
        assert_eq!(pool.capacity(), 0);
        assert!(pool.is_exhausted());
    }
    assert_eq!(upstream.allocations(), 1);
    assert_eq!(upstream.deallocations(), 1);
}

#[test]
fn test_small_chunk_raised_to_minimum() {
    let upstream = SystemResource;

    let pool = ChunkPool::<Unsynchronized>::new(&upstream, 4, 1).unwrap();
    assert_eq!(pool.chunk_size(), Unsynchronized::minimum_chunk_size());

    let pool = ChunkPool::<LockFree>::new(&upstream, 4, 1).unwrap();
    assert_eq!(pool.chunk_size(), LockFree::minimum_chunk_size());
    assert_eq!(pool.capacity(), 4 * LockFree::minimum_chunk_size());

    let pool = ChunkPool::<LockBased>::new(&upstream, 4, 0).unwrap();
    assert_eq!(pool.chunk_size(), LockBased::minimum_chunk_size());
}

#[test]
fn test_large_chunk_size_kept() {
    let upstream = SystemResource;
    let pool = ChunkPool::<LockBased>::new(&upstream, 4, 256).unwrap();
    assert_eq!(pool.chunk_size(), 256);
    assert_eq!(pool.capacity(), 1024);
}

#[rstest]
fn test_arena_returned_once_on_drop(upstream: CountingResource) {
    {
        let pool = ChunkPool::<LockBased, _>::new(&upstream, 16, 32).unwrap();
        assert_eq!(upstream.allocations(), 1);
        assert_eq!(upstream.last_allocated(), 16 * 32);

        let chunks = drain(&pool);
        release_all(&pool, chunks);
        assert_eq!(upstream.deallocations(), 0);
    }
    assert_eq!(upstream.allocations(), 1);
    assert_eq!(upstream.deallocations(), 1);
    assert_eq!(upstream.last_deallocated(), 16 * 32);
}

#[test]
fn test_upstream_failure_propagates() {
    let upstream = ExhaustedResource::default();
    let result = ChunkPool::<LockFree, _>::new(&upstream, 8, 64);
    assert!(matches!(
        result,
        Err(PoolError::UpstreamExhausted { size: 512, .. })
    ));
    assert_eq!(upstream.deallocations(), 0);
}

#[rstest]
fn test_capacity_overflow_skips_upstream(upstream: CountingResource) {
    let result = ChunkPool::<Unsynchronized, _>::new(&upstream, usize::MAX / 2, 64);
    assert!(matches!(result, Err(PoolError::CapacityOverflow { .. })));
    assert_eq!(upstream.allocations(), 0);
}

#[test]
fn test_from_config() {
    let upstream = SystemResource;
    let config = PoolConfig::new(PolicyKind::LockFree, 8, 12);

    let pool = ChunkPool::<LockFree>::from_config(&upstream, &config).unwrap();
    assert_eq!(pool.policy(), PolicyKind::LockFree);
    assert_eq!(pool.chunk_count(), 8);
    assert_eq!(pool.chunk_size(), config.effective_chunk_size().unwrap());

    let mismatch = ChunkPool::<LockBased>::from_config(&upstream, &config);
    assert!(matches!(
        mismatch,
        Err(PoolError::PolicyMismatch {
            expected: PolicyKind::LockBased,
            found: PolicyKind::LockFree,
        })
    ));
}

#[test]
fn test_chunk_contents_survive_until_release() {
    let upstream = SystemResource;
    let pool = ChunkPool::<Unsynchronized>::new(&upstream, 4, size_of::<i32>()).unwrap();
    let layout = Layout::new::<i32>();

    let a = pool.allocate(layout).unwrap().cast::<i32>();
    let b = pool.allocate(layout).unwrap().cast::<i32>();
    unsafe {
        a.as_ptr().write(333);
        b.as_ptr().write(777);
        assert_eq!(a.as_ptr().read(), 333);
        assert_eq!(b.as_ptr().read(), 777);

        pool.deallocate(a.cast(), layout);
        pool.deallocate(b.cast(), layout);
    }
}

#[test]
fn test_stats_snapshot() {
    let upstream = SystemResource;
    let pool = ChunkPool::<LockFree>::new(&upstream, 10, 32).unwrap();
    let held: Vec<_> = (0..3).filter_map(|_| pool.allocate_chunk()).collect();

    let stats = pool.stats();
    assert_eq!(stats.policy, PolicyKind::LockFree);
    assert_eq!(stats.chunk_count, 10);
    assert_eq!(stats.chunk_size, 32);
    assert_eq!(stats.capacity, 320);
    assert_eq!(stats.in_use, 3);
    assert_eq!(stats.available, 7);

    release_all(&pool, held);
    assert_eq!(pool.stats().in_use, 0);
}

#[test]
fn test_owns_rejects_foreign_pointers() {
    let upstream = SystemResource;
    let pool = ChunkPool::<LockBased>::new(&upstream, 4, 32).unwrap();
    let other = ChunkPool::<LockBased>::new(&upstream, 4, 32).unwrap();

    let ours = pool.allocate_chunk().unwrap();
    let theirs = other.allocate_chunk().unwrap();
    assert!(pool.owns(ours));
    assert!(!pool.owns(theirs));

    let misaligned = unsafe { ours.add(1) };
    assert!(!pool.owns(misaligned));

    unsafe {
        pool.deallocate_chunk(ours);
        other.deallocate_chunk(theirs);
    }
}

#[test]
fn test_pool_as_upstream_of_pool() {
    let heap = SystemResource;
    let outer = ChunkPool::<LockBased>::new(&heap, 2, 256).unwrap();

    {
        let inner = ChunkPool::<Unsynchronized, _>::new(&outer, 8, 32).unwrap();
        assert_eq!(outer.in_use(), 1);

        let chunks = drain(&inner);
        assert_eq!(chunks.len(), 8);
        for chunk in &chunks {
            assert!(outer.arena_range().contains(&chunk.as_ptr().addr()));
        }
        release_all(&inner, chunks);
    }
    assert_eq!(outer.in_use(), 0);

    let too_big = ChunkPool::<Unsynchronized, _>::new(&outer, 16, 32);
    assert!(matches!(too_big, Err(PoolError::LayoutTooLarge { .. })));
}

#[test]
fn test_zero_chunk_pool_over_exhausted_pool() {
    let heap = SystemResource;
    let outer = ChunkPool::<LockBased>::new(&heap, 1, 16).unwrap();
    let held = outer.allocate_chunk().unwrap();

    {
        let inner = ChunkPool::<Unsynchronized, _>::new(&outer, 0, 8).unwrap();
        assert!(inner.allocate(Layout::new::<u8>()).is_none());
        assert!(inner.is_exhausted());
        assert_eq!(outer.in_use(), 1);
    }
    assert_eq!(outer.in_use(), 1);

    unsafe { outer.deallocate_chunk(held) };
    assert_eq!(outer.in_use(), 0);
}

#[test]
fn test_pool_resource_zero_size_skips_chunks() {
    let heap = SystemResource;
    let pool = ChunkPool::<LockFree>::new(&heap, 1, 16).unwrap();
    let empty = Layout::from_size_align(0, 8).unwrap();

    let ptr = MemoryResource::allocate(&pool, empty).unwrap();
    assert_eq!(ptr.as_ptr().addr() % 8, 0);
    assert!(!pool.owns(ptr));
    assert_eq!(pool.in_use(), 0);
    assert_eq!(pool.available(), 1);

    unsafe { MemoryResource::deallocate(&pool, ptr, empty) };
    assert_eq!(pool.in_use(), 0);
    assert!(pool.allocate_chunk().is_some());
}

#[test]
fn test_pool_resource_reports_exhaustion() {
    let heap = SystemResource;
    let pool = ChunkPool::<LockFree>::new(&heap, 1, 16).unwrap();
    let layout = Layout::new::<u64>();

    let chunk = MemoryResource::allocate(&pool, layout).unwrap();
    assert!(matches!(
        MemoryResource::allocate(&pool, layout),
        Err(PoolError::PoolExhausted { chunk_count: 1 })
    ));
    unsafe { MemoryResource::deallocate(&pool, chunk, layout) };
    assert_eq!(pool.in_use(), 0);
}
