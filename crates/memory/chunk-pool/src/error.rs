//! Chunk pool error types
//!
//! Misuse of the pool (double free, foreign pointers, use after drop) is not
//! represented here: those are documented preconditions, not runtime errors.

use crate::policy::PolicyKind;
use std::alloc::LayoutError;
use thiserror::Error;

/// Chunk pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Upstream allocator could not supply the requested block
    #[error("Upstream allocator exhausted: {size} bytes (align {align})")]
    UpstreamExhausted {
        /// Requested block size in bytes
        size: usize,
        /// Requested block alignment
        align: usize,
    },

    /// Every chunk of the pool is currently allocated
    #[error("Pool exhausted: all {chunk_count} chunks in use")]
    PoolExhausted {
        /// Total chunks in the pool
        chunk_count: usize,
    },

    /// Requested layout does not fit in one chunk
    #[error("Layout of {size} bytes (align {align}) does not fit {chunk_size}-byte chunks")]
    LayoutTooLarge {
        /// Requested size in bytes
        size: usize,
        /// Requested alignment
        align: usize,
        /// Effective chunk size of the pool
        chunk_size: usize,
    },

    /// Arena size does not fit in `usize`
    #[error("Arena size overflow: {chunk_count} chunks of {chunk_size} bytes")]
    CapacityOverflow {
        /// Requested number of chunks
        chunk_count: usize,
        /// Requested chunk size in bytes
        chunk_size: usize,
    },

    /// Arena layout rejected by the allocator API
    #[error("Invalid arena layout: {0}")]
    InvalidLayout(#[from] LayoutError),

    /// Configuration targets a different policy than the pool type
    #[error("Policy mismatch: pool is {expected}, configuration asks for {found}")]
    PolicyMismatch {
        /// Policy of the pool type
        expected: PolicyKind,
        /// Policy named by the configuration
        found: PolicyKind,
    },

    /// Policy name not recognised
    #[error("Unknown concurrency policy: {name}")]
    UnknownPolicy {
        /// Name as given
        name: String,
    },

    /// Configuration values out of range
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the values
        reason: String,
    },
}

/// Result alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;
