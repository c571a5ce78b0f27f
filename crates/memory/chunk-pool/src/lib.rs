//! Fixed-chunk memory pool
//!
//! A pool obtains one contiguous arena from an upstream allocator, slices it
//! into equally sized chunks and serves allocations by popping chunks off an
//! intrusive free list. The pool never grows: once every chunk is handed out,
//! allocation returns `None` until a chunk is given back.
//!
//! Key Design Principles:
//! - ONE upstream allocation per pool, returned in ONE call on drop
//! - NO per-chunk bookkeeping - free chunks store their own list link
//! - Concurrency strategy chosen at compile time through a policy type
//!
//! Policies (zero-cost, resolved at compile time):
//! - `Unsynchronized`: plain stack, single thread only (`!Sync`)
//! - `LockFree`: CAS-based Treiber stack
//! - `LockBased`: mutex-guarded stack
//!
//! # Example
//! ```
//! use chunk_pool::{ChunkPool, LockFree, SystemResource};
//! use std::alloc::Layout;
//!
//! let upstream = SystemResource;
//! let pool = ChunkPool::<LockFree>::new(&upstream, 4, 32)?;
//!
//! let layout = Layout::new::<u64>();
//! let chunk = pool.allocate(layout).expect("pool has free chunks");
//! // SAFETY: `chunk` came from this pool and is not used afterwards
//! unsafe { pool.deallocate(chunk, layout) };
//! # Ok::<(), chunk_pool::PoolError>(())
//! ```

#![deny(clippy::all)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod free_list;
pub mod policy;
pub mod pool;
pub mod resource;

// Re-exports
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use free_list::{FreeList, LockFreeStack, LockedStack, UnsyncStack};
pub use policy::{ConcurrencyPolicy, LockBased, LockFree, PolicyKind, Unsynchronized};
pub use pool::{ChunkPool, PoolStats};
pub use resource::{MemoryResource, SystemResource};
