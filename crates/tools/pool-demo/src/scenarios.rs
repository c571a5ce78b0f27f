//! Demo scenarios driving the chunk pool

use anyhow::{Context, Result, anyhow, bail, ensure};
use chunk_pool::{
    ChunkPool, ConcurrencyPolicy, LockBased, LockFree, PolicyKind, PoolConfig, PoolStats,
    SystemResource, Unsynchronized,
};
use serde::Serialize;
use std::alloc::Layout;
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;
use tracing::{debug, info, warn};

/// Outcome of the drain scenario
#[derive(Debug, Serialize)]
pub struct DrainReport {
    pub policy: PolicyKind,
    pub threads: usize,
    pub per_thread: usize,
    /// Chunks handed out across all consumers
    pub handed_out: usize,
    /// Addresses handed out more than once
    pub duplicates: usize,
    /// Pool chunks no consumer received
    pub missing: usize,
    /// Pool usage with every consumer still holding its chunks
    pub stats: PoolStats,
}

impl DrainReport {
    /// Every request served and no chunk shared between consumers
    pub fn is_consistent(&self) -> bool {
        self.duplicates == 0
            && self.missing == 0
            && self.handed_out == self.threads * self.per_thread
    }
}

/// Single-threaded walkthrough: allocate, write, free, reuse
pub fn run_basic(config: &PoolConfig) -> Result<()> {
    ensure!(
        config.chunk_count >= 2,
        "Basic scenario needs at least 2 chunks, got {}",
        config.chunk_count
    );

    let upstream = SystemResource;
    let pool = ChunkPool::<Unsynchronized>::new(&upstream, config.chunk_count, config.chunk_size)?;
    let layout = Layout::new::<i32>();

    let first = pool.allocate(layout).context("Pool exhausted on first allocation")?;
    let value = first.cast::<i32>();
    // SAFETY: the chunk fits an aligned i32 and is exclusively ours
    let stored = unsafe {
        value.as_ptr().write(333);
        value.as_ptr().read()
    };
    info!(ptr = ?first, value = stored, "First chunk allocated");

    let second = pool.allocate(layout).context("Pool exhausted on second allocation")?;
    info!(ptr = ?second, "Second chunk allocated");

    // SAFETY: `first` came from this pool and is not touched again
    unsafe { pool.deallocate(first, layout) };
    info!(ptr = ?first, "First chunk released");

    let reused = pool.allocate(layout).context("Pool exhausted after release")?;
    let value = reused.cast::<i32>();
    // SAFETY: as above, `reused` is a fresh exclusive chunk
    let stored = unsafe {
        value.as_ptr().write(777);
        value.as_ptr().read()
    };
    info!(
        ptr = ?reused,
        value = stored,
        same_chunk = reused == first,
        "Chunk allocated after release"
    );

    // SAFETY: both chunks came from this pool and are not used afterwards
    unsafe {
        pool.deallocate(reused, layout);
        pool.deallocate(second, layout);
    }

    info!(stats = ?pool.stats(), "Basic scenario finished");
    Ok(())
}

/// Drain a shared pool from several consumer threads
pub fn run_drain(config: &PoolConfig, threads: usize) -> Result<DrainReport> {
    match config.policy {
        PolicyKind::LockFree => drain::<LockFree>(config, threads),
        PolicyKind::LockBased => drain::<LockBased>(config, threads),
        PolicyKind::None => bail!(
            "Policy `{}` cannot be shared between threads; use lock-free or lock-based",
            config.policy
        ),
    }
}

fn drain<P>(config: &PoolConfig, threads: usize) -> Result<DrainReport>
where
    P: ConcurrencyPolicy,
    P::FreeList: Sync,
{
    ensure!(threads > 0, "Drain scenario needs at least one consumer thread");
    ensure!(
        config.chunk_count % threads == 0,
        "{} chunks cannot be split evenly across {threads} consumers",
        config.chunk_count
    );
    let per_thread = config.chunk_count / threads;

    let upstream = SystemResource;
    let pool = ChunkPool::<P>::from_config(&upstream, config)?;
    let barrier = Barrier::new(threads);

    info!(
        policy = %P::KIND,
        threads,
        per_thread,
        chunk_count = pool.chunk_count(),
        chunk_size = pool.chunk_size(),
        "Starting consumers"
    );

    let logs: Vec<Vec<usize>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|consumer| {
                let pool = &pool;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let mut log = Vec::with_capacity(per_thread);
                    for _ in 0..per_thread {
                        match pool.allocate_chunk() {
                            Some(chunk) => {
                                debug!(consumer, ptr = ?chunk, "Chunk acquired");
                                log.push(chunk.as_ptr().addr());
                            }
                            None => {
                                warn!(consumer, "Pool exhausted");
                                break;
                            }
                        }
                    }
                    log
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("Consumer thread panicked")))
            .collect::<Result<Vec<_>>>()
    })?;

    let stats = pool.stats();
    let handed_out = logs.iter().map(Vec::len).sum();
    let distinct: HashSet<usize> = logs.iter().flatten().copied().collect();
    let owned = distinct
        .iter()
        .filter(|&&addr| pool.arena_range().contains(&addr))
        .count();
    ensure!(
        owned == distinct.len(),
        "Consumers received addresses outside the arena"
    );

    // Give everything back; addresses are rebased on the arena
    let start = pool.arena_range().start;
    for &addr in &distinct {
        // SAFETY: every address was handed out by this pool exactly once
        // (distinct) and no consumer uses it any more
        unsafe {
            let chunk = pool.arena_base().add(addr - start);
            pool.deallocate_chunk(chunk);
        }
    }

    Ok(DrainReport {
        policy: P::KIND,
        threads,
        per_thread,
        handed_out,
        duplicates: handed_out - distinct.len(),
        missing: pool.chunk_count() - distinct.len(),
        stats,
    })
}
