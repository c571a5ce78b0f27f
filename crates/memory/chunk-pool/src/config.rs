//! Pool configuration surface

use crate::error::{PoolError, Result};
use crate::policy::{PolicyKind, chunk_stride};
use serde::{Deserialize, Serialize};

/// Default number of chunks per pool
pub const DEFAULT_CHUNK_COUNT: usize = 1024;

/// Default requested chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Pool configuration
///
/// The policy is fixed for the lifetime of a pool built from this config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Free-list concurrency policy
    pub policy: PolicyKind,
    /// Number of chunks carved from the arena
    pub chunk_count: usize,
    /// Requested chunk size; raised to the policy minimum if smaller
    pub chunk_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::None,
            chunk_count: DEFAULT_CHUNK_COUNT,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl PoolConfig {
    /// Create a configuration
    pub const fn new(policy: PolicyKind, chunk_count: usize, chunk_size: usize) -> Self {
        Self {
            policy,
            chunk_count,
            chunk_size,
        }
    }

    /// Chunk stride the pool will actually use
    ///
    /// # Errors
    /// `CapacityOverflow` if rounding the chunk size overflows.
    pub fn effective_chunk_size(&self) -> Result<usize> {
        chunk_stride(
            self.chunk_size,
            self.policy.minimum_chunk_size(),
            self.policy.node_align(),
        )
        .ok_or(PoolError::CapacityOverflow {
            chunk_count: self.chunk_count,
            chunk_size: self.chunk_size,
        })
    }

    /// Total arena size in bytes
    ///
    /// # Errors
    /// `CapacityOverflow` if `chunk_count × effective_chunk_size` overflows.
    pub fn arena_size(&self) -> Result<usize> {
        self.effective_chunk_size()?
            .checked_mul(self.chunk_count)
            .ok_or(PoolError::CapacityOverflow {
                chunk_count: self.chunk_count,
                chunk_size: self.chunk_size,
            })
    }

    /// Check the configuration before building a pool
    ///
    /// # Errors
    /// `InvalidConfig` for a zero chunk size, `CapacityOverflow` if the arena
    /// size does not fit in `usize`.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "chunk_size must be positive".to_string(),
            });
        }
        self.arena_size()?;
        Ok(())
    }
}
