//! A single shard: the single-threaded core of the allocator.
//!
// For a general view of the allocator's operational semantics see the [`crate`] level documentation.
//
// # Additional implementation notes
// ## Block states
// A block handed out by the shard is recorded in `live` and its slots are set in
// its region's bitmap. On release the bitmap is cleared and the block parks in
// the last-free cache. It reaches the free list only when the cache evicts it,
// at which point it may coalesce with listed neighbours. Blocks never go back
// to being raw region space.
//
// ## Order of attempts
// `allocate` tries the cache, then the free list, then the bump cursors of the
// existing regions (oldest first), and only then asks the source for a new
// region, retrying the bump allocation once against it.

use std::collections::HashMap;

use tracing::{debug, error, info, instrument, Level};

use crate::cache::LastFreeCache;
use crate::config::ZoneConfig;
use crate::error::AllocError;
use crate::freelist::FreeList;
use crate::quantum::{Msize, QUANTUM};
use crate::region::{Block, Region, RegionId};
use crate::registry::RegionRegistry;
use crate::sources::RegionSource;
use crate::stats::{BlockInfo, BlockState, RegionSummary, ShardStats};

/// One independent set of regions, free list and last-free cache.
#[derive(Debug)]
pub(crate) struct Shard {
    id: usize,
    regions: Vec<Region>,
    free_list: FreeList,
    cache: LastFreeCache,
    live: HashMap<usize, Block>,
    cache_hits: u64,
    fit_hits: u64,
    bump_hits: u64,
    region_requests: u64,
}

impl Shard {
    pub fn new(id: usize, config: &ZoneConfig) -> Self {
        Shard {
            id,
            regions: Vec::new(),
            free_list: FreeList::new(config),
            cache: LastFreeCache::new(),
            live: HashMap::new(),
            cache_hits: 0,
            fit_hits: 0,
            bump_hits: 0,
            region_requests: 0,
        }
    }

    /// Allocates a block of `msize` quanta, growing the shard if nothing fits.
    ///
    /// `msize` must not exceed what a single region of the configured sizes can hold.
    #[instrument(
        level = "debug",
        skip(self, source, config, registry),
        fields(shard = self.id),
        ret(level = Level::DEBUG),
        err(level = Level::ERROR)
    )]
    pub fn allocate<S: RegionSource + ?Sized>(
        &mut self,
        msize: Msize,
        source: &S,
        config: &ZoneConfig,
        registry: &RegionRegistry,
    ) -> Result<Block, AllocError> {
        debug_assert!(msize > 0);

        let block = if let Some(block) = self.cache_take(msize) {
            debug!(?block, "Last-free cache hit.");
            self.cache_hits += 1;
            block
        } else if let Some(block) = self.free_list.find_fit(msize) {
            debug!(?block, "Found free block to accomodate object.");
            self.fit_hits += 1;
            self.regions[block.region].mark_allocated(&block);
            block
        } else if let Some(block) = self.bump_alloc(msize) {
            self.bump_hits += 1;
            block
        } else {
            debug!("Couldn't find room for object, requesting a new region.");
            let region = self.grow(msize, source, config, registry)?;
            let block = self.regions[region].bump_alloc(region, msize).map_err(|_| {
                error!(region, "Growth failure, fresh region can't hold the object.");
                AllocError::OutOfMemory {
                    requested: msize * QUANTUM,
                }
            })?;
            self.bump_hits += 1;
            block
        };

        self.live.insert(block.addr, block);
        Ok(block)
    }

    /// Releases the block starting at `addr` into the last-free cache,
    /// evicting the previously cached block into the free list.
    ///
    /// Releasing an address that is not a live block of this shard is a caller
    /// contract violation. It is ignored in release builds.
    #[instrument(level = "debug", skip(self), fields(shard = self.id))]
    pub fn release(&mut self, addr: usize) {
        let Some(block) = self.live.remove(&addr) else {
            debug_assert!(false, "Released {addr:#x} which is not allocated.");
            return;
        };
        let region = &mut self.regions[block.region];
        debug_assert!(region.is_allocated(&block));
        region.mark_free(&block);
        self.cache_offer(block);
    }

    /// Parks `block` in the cache; a resident block moves to the free list.
    fn cache_offer(&mut self, block: Block) {
        if let Some(evicted) = self.cache.offer(block) {
            let listed = self.release_to_freelist(evicted);
            debug!(?evicted, ?listed, "Moved evicted block to the free list.");
        }
    }

    /// Takes the cached block if it is exactly `msize` quanta, marking it allocated.
    fn cache_take(&mut self, msize: Msize) -> Option<Block> {
        let block = self.cache.take(msize)?;
        self.regions[block.region].mark_allocated(&block);
        Some(block)
    }

    fn release_to_freelist(&mut self, block: Block) -> Block {
        self.regions[block.region].release_to_freelist(block, &mut self.free_list)
    }

    /// Tries the bump cursor of every region, oldest first.
    fn bump_alloc(&mut self, msize: Msize) -> Option<Block> {
        self.regions
            .iter_mut()
            .enumerate()
            .find_map(|(id, region)| region.bump_alloc(id, msize).ok())
    }

    /// Requests a new region big enough for `msize` quanta from `source`
    /// and registers it as owned by this shard.
    #[instrument(level = "debug", skip(self, source, config, registry), fields(shard = self.id), err(level = Level::ERROR))]
    fn grow<S: RegionSource + ?Sized>(
        &mut self,
        msize: Msize,
        source: &S,
        config: &ZoneConfig,
        registry: &RegionRegistry,
    ) -> Result<RegionId, AllocError> {
        let kind = config.region_kind(msize);
        let requested = config.region_bytes(kind).max(msize * QUANTUM);
        self.region_requests += 1;

        let (base, len) = source.request_region(requested).map_err(|err| {
            error!(%err, requested, "Growth failure, no memory.");
            AllocError::OutOfMemory { requested }
        })?;
        debug_assert!(len >= requested, "Sources must grant what was requested.");
        debug_assert_eq!(base.as_ptr() as usize % QUANTUM, 0);

        // SAFETY: the source contract guarantees an exclusive, aligned grant of `len`
        // bytes that outlives the source, and the zone owning this shard holds the source.
        let region = unsafe { Region::new(base, len / QUANTUM, kind) };
        registry.register(region.base_addr(), region.total_quanta() * QUANTUM, self.id);
        info!(base = ?base, len, ?kind, "Acquired new region.");

        self.regions.push(region);
        Ok(self.regions.len() - 1)
    }

    /// Pointer to the start of `block`.
    #[inline]
    pub fn ptr_of(&self, block: &Block) -> core::ptr::NonNull<u8> {
        self.regions[block.region].ptr_of(block)
    }

    /// Usable bytes of the live block starting at `addr`.
    pub fn usable_size(&self, addr: usize) -> Option<usize> {
        self.live.get(&addr).map(|block| block.msize * QUANTUM)
    }

    pub fn stats(&self) -> ShardStats {
        debug_assert_eq!(
            self.regions.iter().map(Region::allocated_quanta).sum::<usize>(),
            self.live.values().map(|b| b.msize).sum::<usize>(),
            "Region bitmaps and live blocks should agree."
        );
        ShardStats {
            regions: self.regions.len(),
            region_bytes: self.regions.iter().map(|r| r.total_quanta() * QUANTUM).sum(),
            objects: self.live.len(),
            object_bytes: self.live.values().map(|b| b.msize * QUANTUM).sum(),
            bytes_free_at_end: self.regions.iter().map(|r| r.free_at_end() * QUANTUM).sum(),
            listed_blocks: self.free_list.len(),
            listed_bytes: self.free_list.listed_quanta() * QUANTUM,
            cache_occupied: self.cache.is_occupied(),
            cache_hits: self.cache_hits,
            fit_hits: self.fit_hits,
            bump_hits: self.bump_hits,
            region_requests: self.region_requests,
        }
    }

    /// Walks region `id` block by block from its base up to its bump cursor.
    pub fn region_blocks(&self, id: RegionId) -> Option<Vec<BlockInfo>> {
        let region = self.regions.get(id)?;
        let mut blocks = Vec::new();
        let mut addr = region.base_addr();
        while addr < region.carved_end() {
            let Some(info) = self.block_at(addr) else {
                debug_assert!(false, "Region {id} has no block at {addr:#x}.");
                break;
            };
            debug_assert_eq!(
                info.state.is_busy(),
                region.is_allocated(&Block {
                    addr,
                    msize: info.msize,
                    region: id,
                }),
                "Bitmap disagrees with the state of {addr:#x}."
            );
            addr += info.msize * QUANTUM;
            blocks.push(info);
        }
        Some(blocks)
    }

    pub fn region_summaries(&self) -> Vec<RegionSummary> {
        self.regions
            .iter()
            .enumerate()
            .filter_map(|(id, region)| {
                let blocks = self.region_blocks(id)?;
                Some(RegionSummary::from_blocks(
                    region.base_addr(),
                    region.kind(),
                    region.total_quanta(),
                    &blocks,
                ))
            })
            .collect()
    }

    fn block_at(&self, addr: usize) -> Option<BlockInfo> {
        let (block, state) = if let Some(block) = self.live.get(&addr) {
            (*block, BlockState::Allocated)
        } else if let Some(block) = self.cache.peek().filter(|b| b.addr == addr) {
            (*block, BlockState::Cached)
        } else {
            (self.free_list.get(addr)?, BlockState::Listed)
        };
        Some(BlockInfo {
            addr,
            msize: block.msize,
            state,
        })
    }

    /// Renders the free list, see [`FreeList::dump`].
    pub fn dump(&self) -> String {
        self.free_list.dump()
    }

    #[inline]
    pub fn has_regions(&self) -> bool {
        !self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests;
