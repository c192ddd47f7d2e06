//! Error types.
//!
//! Only [`AllocError`] ever reaches the caller of [`Zone::allocate`].
//! Expected misses inside the allocator (an empty cache, no fitting free block,
//! an unknown address) are modelled as `Option::None`, not as errors.
//!
//! [`Zone::allocate`]: crate::Zone::allocate

use thiserror::Error;

/// Failure to service an allocation request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The region source refused to hand out a new region.
    #[error("out of memory: a new region of {requested} bytes could not be obtained")]
    OutOfMemory { requested: usize },
    /// The request is above the small allocation limit. Large allocations
    /// are not serviced by this allocator.
    #[error("request of {size} bytes exceeds the small allocation limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// A region has no room left at its bump cursor.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("region exhausted")]
pub struct RegionExhausted;

/// Failure of a [`RegionSource`](crate::sources::RegionSource) to provide backing memory.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    #[error("backing store refused a region of {size} bytes (errno {errno:?})")]
    Refused { size: usize, errno: Option<i32> },
    #[error("region size is not representable")]
    Overflow,
}

/// An invalid [`ZoneConfig`](crate::ZoneConfig).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shard count must be a non-zero power of two, got {0}")]
    ShardCount(usize),
    #[error("bin count must be non-zero")]
    NoBins,
    #[error("bin shift {0} is too large")]
    BinShift(u32),
    #[error("{field} ({value} bytes) must be a non-zero multiple of the quantum")]
    Unaligned { field: &'static str, value: usize },
    #[error("{field} ({value} bytes) is smaller than {required} bytes")]
    TooSmall {
        field: &'static str,
        value: usize,
        required: usize,
    },
}
