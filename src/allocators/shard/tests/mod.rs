use crate::config::{RegionKind, ZoneConfig};
use crate::error::AllocError;
use crate::quantum::{to_msize, QUANTUM};
use crate::region::Block;
use crate::registry::RegionRegistry;
use crate::sources::arena_source::ArenaSource;
use crate::stats::BlockState;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use self::format::init_tracing;

use super::*;


const TINY_REGION: usize = 4096;
const SMALL_REGION: usize = 16384;

fn test_config() -> ZoneConfig {
    ZoneConfig::default()
        .with_shards(1)
        .with_large_threshold(8192)
        .with_tiny_region_bytes(TINY_REGION)
        .with_small_region_bytes(SMALL_REGION)
}

struct Fixture<'a> {
    shard: Shard,
    source: ArenaSource<'a>,
    config: ZoneConfig,
    registry: RegionRegistry,
}

impl<'a> Fixture<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        init_tracing();
        let config = test_config();
        Fixture {
            shard: Shard::new(0, &config),
            source: ArenaSource::new(buf),
            config,
            registry: RegionRegistry::new(),
        }
    }

    fn try_alloc(&mut self, bytes: usize) -> Result<Block, AllocError> {
        self.shard
            .allocate(to_msize(bytes), &self.source, &self.config, &self.registry)
    }

    fn alloc(&mut self, bytes: usize) -> Block {
        self.try_alloc(bytes).unwrap()
    }

    fn free(&mut self, block: Block) {
        self.shard.release(block.addr)
    }

    /// Pushes whatever sits in the last-free cache onto the free list.
    fn flush_cache(&mut self, bytes: usize) {
        let block = self.alloc(bytes);
        self.free(block);
    }
}

#[test]
fn test_free_list_reuse_is_lifo() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let x: Vec<Block> = (0..10).map(|_| f.alloc(16)).collect();
    for i in 0..9 {
        assert_eq!(x[i].end(), x[i + 1].addr);
    }
    for i in [0, 2, 4, 6] {
        f.free(x[i]);
    }

    f.flush_cache(128);
    assert_eq!(f.shard.free_list.head(0), Some(x[6]));
    assert_eq!(f.shard.free_list.iter_bin(0).count(), 4);
    assert_eq!(f.alloc(16), x[6]);
}

#[test]
fn test_cache_survives_other_sizes() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let x = f.alloc(64);
    f.free(x);

    let y = f.alloc(32);
    assert_ne!(x.addr, y.addr, "Should not be served from the cache.");
    assert_eq!(f.shard.cache.peek(), Some(&x));

    let z = f.alloc(512);
    f.free(z);

    assert_eq!(f.alloc(64).addr, x.addr);
}

#[test]
fn test_reuse_same_size() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    for msize in 1..=32 {
        let a = f.alloc(msize * QUANTUM);
        f.free(a);
        let b = f.alloc(msize * QUANTUM);
        assert_eq!(a, b);
    }
    assert_eq!(f.shard.stats().cache_hits, 32);
}

#[test]
fn test_cache_is_exact() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let a = f.alloc(5 * QUANTUM);
    f.free(a);
    let b = f.alloc(4 * QUANTUM);
    assert_ne!(a.addr, b.addr);
    let c = f.alloc(6 * QUANTUM);
    assert_ne!(a.addr, c.addr);
    assert!(f.shard.stats().cache_occupied);
    assert_eq!(f.shard.stats().cache_hits, 0);
}

#[test]
fn test_coalesce_in_either_order() {
    for lower_first in [true, false] {
        let mut buf = vec![0_u8; 64 * 1024];
        let mut f = Fixture::new(&mut buf);

        let a = f.alloc(3 * QUANTUM);
        let b = f.alloc(5 * QUANTUM);
        let _guard = f.alloc(QUANTUM);
        assert_eq!(a.end(), b.addr);

        if lower_first {
            f.free(a);
            f.free(b);
        } else {
            f.free(b);
            f.free(a);
        }
        f.flush_cache(100 * QUANTUM);

        assert_eq!(f.shard.stats().listed_blocks, 1);
        assert_eq!(f.shard.free_list.get(a.addr).map(|b| b.msize), Some(8));
        assert_eq!(f.alloc(8 * QUANTUM).addr, a.addr);
    }
}

#[test]
fn test_first_fit_takes_lowest_bin() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let a = f.alloc(5 * QUANTUM);
    f.alloc(QUANTUM);
    let b = f.alloc(21 * QUANTUM);
    f.alloc(QUANTUM);
    let c = f.alloc(70 * QUANTUM);
    f.alloc(QUANTUM);
    for block in [a, b, c] {
        f.free(block);
    }
    f.flush_cache(100 * QUANTUM);

    assert_eq!(f.shard.free_list.head(2), Some(a));
    assert_eq!(f.shard.free_list.head(10), Some(b));
    assert_eq!(f.shard.free_list.head(31), Some(c));

    let got = f.alloc(4 * QUANTUM);
    assert_eq!(got.addr, a.addr);
    assert_eq!(got.msize, 4);
    assert_eq!(f.alloc(QUANTUM).addr, a.addr + 4 * QUANTUM);
    assert_eq!(f.shard.free_list.head(10), Some(b));
    assert_eq!(f.shard.free_list.head(31), Some(c));
}

#[test]
fn test_growth_when_region_is_full() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let per_region = TINY_REGION / 256;
    let blocks: Vec<Block> = (0..per_region).map(|_| f.alloc(256)).collect();
    let stats = f.shard.stats();
    assert_eq!(stats.regions, 1);
    assert_eq!(stats.region_requests, 1);
    assert_eq!(stats.bytes_free_at_end, 0);

    let extra = f.alloc(256);
    let stats = f.shard.stats();
    assert_eq!(stats.regions, 2);
    assert_eq!(stats.region_requests, 2);
    assert_eq!(extra.region, 1);
    assert!(blocks.iter().all(|b| b.region == 0));
    assert_eq!(f.registry.len(), 2);
    assert_eq!(f.registry.owner_of(extra.addr), Some(0));
}

#[test]
fn test_no_coalesce_across_regions() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let blocks: Vec<Block> = (0..TINY_REGION / 256).map(|_| f.alloc(256)).collect();
    let last = *blocks.last().unwrap();
    let first = f.alloc(256);
    assert_eq!(last.end(), first.addr, "Arena regions should be adjacent.");
    assert_ne!(last.region, first.region);

    f.free(last);
    f.free(first);
    f.flush_cache(100 * QUANTUM);

    assert_eq!(f.shard.stats().listed_blocks, 2);
    assert_ne!(f.alloc(512).addr, last.addr);
}

#[test]
fn test_small_requests_grow_small_regions() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    f.alloc(2000);
    assert_eq!(f.shard.regions[0].kind(), RegionKind::Small);
    assert_eq!(f.shard.stats().region_bytes, SMALL_REGION);

    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);
    f.alloc(1008);
    assert_eq!(f.shard.regions[0].kind(), RegionKind::Tiny);
    assert_eq!(f.shard.stats().region_bytes, TINY_REGION);
}

#[test]
fn test_out_of_memory() {
    let mut buf = vec![0_u8; TINY_REGION + QUANTUM];
    let mut f = Fixture::new(&mut buf);

    let blocks: Vec<Block> = (0..TINY_REGION / 256).map(|_| f.alloc(256)).collect();
    assert_eq!(
        f.try_alloc(256),
        Err(AllocError::OutOfMemory {
            requested: TINY_REGION
        })
    );
    let stats = f.shard.stats();
    assert_eq!(stats.regions, 1);
    assert_eq!(stats.region_requests, 2);

    // The failed growth leaves the shard usable.
    f.free(blocks[3]);
    assert_eq!(f.alloc(256), blocks[3]);
    f.free(blocks[5]);
    f.free(blocks[7]);
    assert_eq!(f.alloc(128).addr, blocks[5].addr);
}

#[test]
fn test_stats_and_usable_size() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let a = f.alloc(100);
    let b = f.alloc(16);
    let c = f.alloc(40);
    assert_eq!(f.shard.usable_size(a.addr), Some(112));
    assert_eq!(f.shard.usable_size(b.addr), Some(16));

    f.free(a);
    f.free(c);
    assert_eq!(f.shard.usable_size(a.addr), None);

    let stats = f.shard.stats();
    assert_eq!(stats.objects, 1);
    assert_eq!(stats.object_bytes, 16);
    assert_eq!(stats.listed_blocks, 1);
    assert_eq!(stats.listed_bytes, 112);
    assert!(stats.cache_occupied);
    assert_eq!(stats.bump_hits, 3);
    assert_eq!(stats.region_bytes, TINY_REGION);
    assert_eq!(stats.bytes_free_at_end, TINY_REGION - 112 - 16 - 48);
    assert_eq!(
        f.shard.dump(),
        format!("[3] {:#x} [7]\n", a.addr),
        "Only the evicted block should be listed."
    );
}

#[test]
fn test_memory_is_writable() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let blocks: Vec<Block> = (1..20).map(|i| f.alloc(i * 24)).collect();
    for (i, block) in blocks.iter().enumerate() {
        let p = f.shard.ptr_of(block);
        unsafe { p.as_ptr().write_bytes(i as u8, block.msize * QUANTUM) };
    }
    for (i, block) in blocks.iter().enumerate() {
        let p = f.shard.ptr_of(block).as_ptr();
        let bytes = unsafe { core::slice::from_raw_parts(p, block.msize * QUANTUM) };
        assert!(bytes.iter().all(|&byte| byte == i as u8));
    }
}

#[test]
fn test_region_walk_tiles_carved_space() {
    let mut buf = vec![0_u8; 2 << 20];
    let mut f = Fixture::new(&mut buf);
    let mut rng = StdRng::seed_from_u64(7);
    let mut live = Vec::new();

    for _ in 0..2_000 {
        if live.is_empty() || (live.len() < 64 && rng.gen_bool(0.6)) {
            live.push(f.alloc(rng.gen_range(1..=2048)));
        } else {
            let block = live.swap_remove(rng.gen_range(0..live.len()));
            f.free(block);
        }
    }
    assert!(f.shard.regions.len() > 1);

    let mut cached = 0;
    let mut listed = 0;
    for (id, region) in f.shard.regions.iter().enumerate() {
        let blocks = f.shard.region_blocks(id).unwrap();
        let mut addr = region.base_addr();
        for info in &blocks {
            assert_eq!(info.addr, addr, "Region {id} has a gap at {addr:#x}.");
            addr += info.msize * QUANTUM;
        }
        assert_eq!(addr, region.carved_end());

        let busy: Vec<_> = blocks.iter().filter(|i| i.state.is_busy()).collect();
        assert_eq!(busy.len(), live.iter().filter(|b| b.region == id).count());
        assert_eq!(
            busy.iter().map(|i| i.msize).sum::<usize>(),
            region.allocated_quanta()
        );
        cached += blocks.iter().filter(|i| i.state == BlockState::Cached).count();
        listed += blocks.iter().filter(|i| i.state == BlockState::Listed).count();
    }
    assert_eq!(cached, usize::from(f.shard.cache.is_occupied()));
    assert_eq!(listed, f.shard.free_list.len());

    let summaries = f.shard.region_summaries();
    assert_eq!(summaries.len(), f.shard.regions.len());
    assert_eq!(summaries.iter().map(|s| s.busy).sum::<usize>(), live.len());
    assert!(summaries.iter().all(|s| s.smallest <= s.largest));
    assert_eq!(f.shard.region_blocks(f.shard.regions.len()), None);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic]
fn test_double_release() {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut f = Fixture::new(&mut buf);

    let a = f.alloc(16);
    f.free(a);
    f.free(a);
}
