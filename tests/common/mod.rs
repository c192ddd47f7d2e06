#![allow(dead_code)]

use shard_malloc::sources::HeapSource;
use shard_malloc::{Zone, ZoneConfig};
use tracing_subscriber::EnvFilter;

pub const TINY_REGION: usize = 4096;
pub const SMALL_REGION: usize = 16384;

/// Installs a subscriber printing through the test harness. Silent unless `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn small_config(shards: usize) -> ZoneConfig {
    ZoneConfig::default()
        .with_shards(shards)
        .with_large_threshold(8192)
        .with_tiny_region_bytes(TINY_REGION)
        .with_small_region_bytes(SMALL_REGION)
}

/// A single-shard zone with small regions carved from the heap.
pub fn heap_zone() -> Zone<HeapSource, fn() -> usize> {
    init_tracing();
    Zone::with_parts(small_config(1), HeapSource::new(), (|| 0) as fn() -> usize).unwrap()
}

/// Allocates and releases a block of `size` bytes, pushing the previously
/// cached block onto the free list.
pub fn flush_cache<C: shard_malloc::selector::ShardSelector>(zone: &Zone<HeapSource, C>, size: usize) {
    let ptr = zone.allocate(size).unwrap();
    unsafe { zone.release(ptr) };
}
