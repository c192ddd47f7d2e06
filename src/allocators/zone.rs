//! A multithreaded, sharded allocator.

use core::fmt;
use core::ptr::NonNull;

use parking_lot::Mutex;
use tracing::{debug, instrument, Level};

use crate::allocators::shard::Shard;
use crate::config::ZoneConfig;
use crate::error::{AllocError, ConfigError};
use crate::quantum::to_msize;
use crate::registry::RegionRegistry;
use crate::selector::{CpuSelector, ShardSelector};
use crate::sources::{MmapSource, RegionSource};
use crate::stats::{BlockInfo, RegionSummary, ShardStats, ZoneStats};

/// A multithreaded allocator for small objects.
///
/// The zone is a fixed array of [shards](crate#shards), each behind its own
/// lock. Allocations go to the shard picked by the [`ShardSelector`] at the
/// time of the call, releases always go back to the shard that owns the block.
///
/// Memory is obtained from `S` in regions and never given back while the
/// zone lives.
pub struct Zone<S: RegionSource = MmapSource, C: ShardSelector = CpuSelector> {
    shards: Box<[Mutex<Shard>]>,
    registry: RegionRegistry,
    source: S,
    selector: C,
    config: ZoneConfig,
}

impl Zone {
    /// A zone backed by `mmap` that picks shards by the current cpu.
    pub fn new(config: ZoneConfig) -> Result<Self, ConfigError> {
        Zone::with_parts(config, MmapSource::new(), CpuSelector)
    }
}

impl<S: RegionSource, C: ShardSelector> Zone<S, C> {
    /// A zone drawing its regions from `source` and picking shards with `selector`.
    pub fn with_parts(config: ZoneConfig, source: S, selector: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let shards = (0..config.shards)
            .map(|id| Mutex::new(Shard::new(id, &config)))
            .collect();
        debug!(shards = config.shards, "Created zone.");
        Ok(Zone {
            shards,
            registry: RegionRegistry::new(),
            source,
            selector,
            config,
        })
    }

    /// Allocates at least `size` bytes on the shard of the calling context.
    ///
    /// The returned pointer is aligned to [`QUANTUM`](crate::QUANTUM) and
    /// stays valid until it is passed to [`release`](Self::release).
    #[inline]
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.allocate_on(self.selector.current_shard(), size)
    }

    /// Allocates at least `size` bytes on shard `shard & (shards - 1)`.
    #[instrument(level = "info", skip(self), ret(level = Level::DEBUG), err(level = Level::ERROR))]
    pub fn allocate_on(&self, shard: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
        if size > self.config.large_threshold {
            return Err(AllocError::TooLarge {
                size,
                limit: self.config.large_threshold,
            });
        }
        let mut shard = self.shards[self.config.shard_index(shard)].lock();
        let block = shard.allocate(to_msize(size), &self.source, &self.config, &self.registry)?;
        Ok(shard.ptr_of(&block))
    }

    /// Releases a block obtained from this zone.
    ///
    /// The block is returned to the shard owning its region, which need not be
    /// the shard of the calling context. Pointers the zone never handed out are
    /// ignored in release builds.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`allocate`](Self::allocate) or
    /// [`allocate_on`](Self::allocate_on) of this zone and must not be used
    /// after this call.
    #[instrument(level = "info", skip(self))]
    pub unsafe fn release(&self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        let Some(owner) = self.registry.owner_of(addr) else {
            debug_assert!(false, "Released {addr:#x} which the zone does not own.");
            return;
        };
        self.shards[owner].lock().release(addr);
    }

    /// Usable bytes of the block at `ptr`, or `None` if `ptr` is not currently allocated.
    pub fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        let owner = self.registry.owner_of(addr)?;
        self.shards[owner].lock().usable_size(addr)
    }

    /// Snapshot of a single shard.
    pub fn shard_stats(&self, shard: usize) -> Option<ShardStats> {
        self.shards.get(shard).map(|shard| shard.lock().stats())
    }

    /// Totals over all shards, visiting one shard at a time.
    pub fn stats(&self) -> ZoneStats {
        self.shards.iter().fold(ZoneStats::default(), |mut acc, shard| {
            let shard = shard.lock();
            if shard.has_regions() {
                acc.active_shards += 1;
            }
            acc.totals += shard.stats();
            acc
        })
    }

    /// Renders the free list of a single shard, one line per non-empty bin:
    /// `[bin] 0xADDR [msize] <--> 0xADDR [msize] ...`, head first.
    pub fn free_list_dump(&self, shard: usize) -> Option<String> {
        self.shards.get(shard).map(|shard| shard.lock().dump())
    }

    /// Every block carved from region `region` of shard `shard`, in address order.
    /// The blocks tile the region from its base up to its bump cursor.
    pub fn region_blocks(&self, shard: usize, region: usize) -> Option<Vec<BlockInfo>> {
        self.shards.get(shard)?.lock().region_blocks(region)
    }

    /// One summary per region of shard `shard`, in creation order.
    pub fn region_summaries(&self, shard: usize) -> Option<Vec<RegionSummary>> {
        self.shards.get(shard).map(|shard| shard.lock().region_summaries())
    }

    #[inline]
    pub fn config(&self) -> &ZoneConfig {
        &self.config
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: RegionSource, C: ShardSelector> fmt::Debug for Zone<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("config", &self.config)
            .field("regions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

//---------------impl Allocator for Zone---------------//

#[cfg(feature = "allocator-api")]
mod allocator_api {
    use core::alloc::{AllocError as StdAllocError, Allocator, Layout};
    use core::ptr::NonNull;

    use super::Zone;
    use crate::quantum::{to_msize, QUANTUM};
    use crate::selector::ShardSelector;
    use crate::sources::RegionSource;

    unsafe impl<S: RegionSource, C: ShardSelector> Allocator for Zone<S, C> {
        fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, StdAllocError> {
            if layout.align() > QUANTUM {
                return Err(StdAllocError);
            }
            let ptr = Zone::allocate(self, layout.size()).map_err(|_| StdAllocError)?;
            Ok(NonNull::slice_from_raw_parts(
                ptr,
                to_msize(layout.size()) * QUANTUM,
            ))
        }

        unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
            Zone::release(self, ptr)
        }
    }
}
