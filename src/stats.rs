//! Diagnostic snapshots of shard and zone state.
//!
//! A [`ShardStats`] is taken under the shard's lock and is therefore internally
//! consistent. A [`ZoneStats`] visits the shards one at a time, so its totals
//! may mix moments if other threads keep allocating while it is gathered.
//! Do NOT use these values for allocation decisions.

use core::fmt;
use core::ops::AddAssign;

use crate::config::RegionKind;
use crate::quantum::{Msize, QUANTUM};

/// Snapshot of one shard.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardStats {
    /// Regions owned by the shard.
    pub regions: usize,
    /// Bytes spanned by those regions.
    pub region_bytes: usize,
    /// Blocks currently handed out.
    pub objects: usize,
    /// Bytes in blocks currently handed out.
    pub object_bytes: usize,
    /// Bytes never carved from any region (behind the bump cursors).
    pub bytes_free_at_end: usize,
    /// Blocks on the free list.
    pub listed_blocks: usize,
    /// Bytes on the free list.
    pub listed_bytes: usize,
    /// Whether the last-free cache holds a block.
    pub cache_occupied: bool,
    /// Allocations served from the last-free cache.
    pub cache_hits: u64,
    /// Allocations served from the free list.
    pub fit_hits: u64,
    /// Allocations carved at a region's bump cursor.
    pub bump_hits: u64,
    /// Times the region source was asked for memory, failed requests included.
    pub region_requests: u64,
}

impl AddAssign for ShardStats {
    fn add_assign(&mut self, rhs: Self) {
        self.regions += rhs.regions;
        self.region_bytes += rhs.region_bytes;
        self.objects += rhs.objects;
        self.object_bytes += rhs.object_bytes;
        self.bytes_free_at_end += rhs.bytes_free_at_end;
        self.listed_blocks += rhs.listed_blocks;
        self.listed_bytes += rhs.listed_bytes;
        self.cache_occupied |= rhs.cache_occupied;
        self.cache_hits += rhs.cache_hits;
        self.fit_hits += rhs.fit_hits;
        self.bump_hits += rhs.bump_hits;
        self.region_requests += rhs.region_requests;
    }
}

/// Snapshot of a whole zone.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneStats {
    /// Shards that own at least one region.
    pub active_shards: usize,
    /// Per-shard snapshots added together. `cache_occupied` is set if any shard's cache is.
    pub totals: ShardStats,
}

/// Where a carved block currently is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// Handed out to a caller.
    Allocated,
    /// Parked in the shard's last-free cache.
    Cached,
    /// On the shard's free list.
    Listed,
}

impl BlockState {
    #[inline]
    pub fn is_busy(self) -> bool {
        self == BlockState::Allocated
    }
}

/// One block met while walking a region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    pub addr: usize,
    pub msize: Msize,
    pub state: BlockState,
}

/// Block counts of a single region, gathered by walking it from its base
/// to its bump cursor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegionSummary {
    pub base: usize,
    pub kind: RegionKind,
    /// Size of the region in quanta.
    pub total_quanta: usize,
    /// Quanta carved at the bump cursor so far, i.e. covered by blocks.
    pub carved_quanta: usize,
    pub blocks: usize,
    pub busy: usize,
    pub free: usize,
    /// Smallest block in quanta, 0 for a region without blocks.
    pub smallest: Msize,
    /// Largest block in quanta, 0 for a region without blocks.
    pub largest: Msize,
}

impl RegionSummary {
    /// Summarises the blocks of the region starting at `base`.
    pub fn from_blocks(
        base: usize,
        kind: RegionKind,
        total_quanta: usize,
        blocks: &[BlockInfo],
    ) -> Self {
        let busy = blocks.iter().filter(|b| b.state.is_busy()).count();
        RegionSummary {
            base,
            kind,
            total_quanta,
            carved_quanta: blocks.iter().map(|b| b.msize).sum(),
            blocks: blocks.len(),
            busy,
            free: blocks.len() - busy,
            smallest: blocks.iter().map(|b| b.msize).min().unwrap_or(0),
            largest: blocks.iter().map(|b| b.msize).max().unwrap_or(0),
        }
    }
}

impl fmt::Display for RegionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x} {:?} units={}(+{}) total={} free={} busy={} smallest={}(+{}) largest={}(+{})",
            self.base,
            self.kind,
            self.carved_quanta,
            self.carved_quanta * QUANTUM,
            self.blocks,
            self.free,
            self.busy,
            self.smallest,
            self.smallest * QUANTUM,
            self.largest,
            self.largest * QUANTUM,
        )
    }
}
