//! Runtime configuration of a [`Zone`](crate::Zone).

use crate::error::ConfigError;
use crate::quantum::{to_msize, Msize, QUANTUM};

/// Requests up to this many bytes grow tiny regions, larger ones grow small regions.
pub const DEFAULT_TINY_LIMIT: usize = 63 * QUANTUM;
/// Requests above this many bytes are rejected.
pub const DEFAULT_LARGE_THRESHOLD: usize = 127 * 1024;
pub const DEFAULT_TINY_REGION_BYTES: usize = 1 << 20;
pub const DEFAULT_SMALL_REGION_BYTES: usize = 8 << 20;
pub const DEFAULT_SHARDS: usize = 32;
pub const DEFAULT_BINS: usize = 32;
pub const DEFAULT_BIN_SHIFT: u32 = 1;

/// Which size of region a growth request asks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Tiny,
    Small,
}

/// Tunables of the allocator. Every field has a default, see the `DEFAULT_*` constants.
///
/// ```
/// use shard_malloc::ZoneConfig;
///
/// let config = ZoneConfig::default().with_shards(4).with_tiny_region_bytes(64 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneConfig {
    /// Number of independent shards. Must be a power of two.
    pub shards: usize,
    /// Number of free list bins.
    pub bins: usize,
    /// A block of `msize` quanta lives in bin `min(msize >> bin_shift, bins - 1)`.
    pub bin_shift: u32,
    /// Largest request, in bytes, that grows a tiny region.
    pub tiny_limit: usize,
    /// Largest request, in bytes, the allocator services at all.
    pub large_threshold: usize,
    pub tiny_region_bytes: usize,
    pub small_region_bytes: usize,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        ZoneConfig {
            shards: DEFAULT_SHARDS,
            bins: DEFAULT_BINS,
            bin_shift: DEFAULT_BIN_SHIFT,
            tiny_limit: DEFAULT_TINY_LIMIT,
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            tiny_region_bytes: DEFAULT_TINY_REGION_BYTES,
            small_region_bytes: DEFAULT_SMALL_REGION_BYTES,
        }
    }
}

impl ZoneConfig {
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_bins(mut self, bins: usize, bin_shift: u32) -> Self {
        self.bins = bins;
        self.bin_shift = bin_shift;
        self
    }

    pub fn with_tiny_limit(mut self, bytes: usize) -> Self {
        self.tiny_limit = bytes;
        self
    }

    pub fn with_large_threshold(mut self, bytes: usize) -> Self {
        self.large_threshold = bytes;
        self
    }

    pub fn with_tiny_region_bytes(mut self, bytes: usize) -> Self {
        self.tiny_region_bytes = bytes;
        self
    }

    pub fn with_small_region_bytes(mut self, bytes: usize) -> Self {
        self.small_region_bytes = bytes;
        self
    }

    /// Checks that the configuration describes a usable allocator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards == 0 || !self.shards.is_power_of_two() {
            return Err(ConfigError::ShardCount(self.shards));
        }
        if self.bins == 0 {
            return Err(ConfigError::NoBins);
        }
        if self.bin_shift >= usize::BITS {
            return Err(ConfigError::BinShift(self.bin_shift));
        }
        for (field, value) in [
            ("tiny_region_bytes", self.tiny_region_bytes),
            ("small_region_bytes", self.small_region_bytes),
        ] {
            if value == 0 || value % QUANTUM != 0 {
                return Err(ConfigError::Unaligned { field, value });
            }
        }
        let checks = [
            ("large_threshold", self.large_threshold, self.tiny_limit),
            ("tiny_region_bytes", self.tiny_region_bytes, self.tiny_limit),
            ("small_region_bytes", self.small_region_bytes, self.large_threshold),
        ];
        for (field, value, required) in checks {
            if value < required {
                return Err(ConfigError::TooSmall {
                    field,
                    value,
                    required,
                });
            }
        }
        Ok(())
    }

    /// Free list bin for a block of `msize` quanta.
    #[inline]
    pub fn bin_for(&self, msize: Msize) -> usize {
        (msize >> self.bin_shift).min(self.bins - 1)
    }

    /// The region kind grown for a request of `msize` quanta.
    #[inline]
    pub fn region_kind(&self, msize: Msize) -> RegionKind {
        if msize <= to_msize(self.tiny_limit) {
            RegionKind::Tiny
        } else {
            RegionKind::Small
        }
    }

    #[inline]
    pub fn region_bytes(&self, kind: RegionKind) -> usize {
        match kind {
            RegionKind::Tiny => self.tiny_region_bytes,
            RegionKind::Small => self.small_region_bytes,
        }
    }

    /// Maps a raw shard id (e.g. a cpu number) onto a shard index.
    #[inline]
    pub fn shard_index(&self, id: usize) -> usize {
        id & (self.shards - 1)
    }
}
