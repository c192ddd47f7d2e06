//! A sharded small-object allocator with per-shard free lists and a last-free cache.
//!
//! # Usage
//! ```toml
//! [dependencies]
//! shard_malloc = "0.1"
//! ```
//!
//! ```
//! use shard_malloc::{Zone, ZoneConfig};
//!
//! let zone = Zone::new(ZoneConfig::default()).unwrap();
//! let ptr = zone.allocate(100).unwrap();
//! assert_eq!(zone.usable_size(ptr), Some(112));
//! unsafe { zone.release(ptr) };
//! ```
//!
//! The zone hands out raw memory and keeps all of its bookkeeping in ordinary
//! Rust collections, so it cannot serve as the `#[global_allocator]` itself.
//! With the `allocator-api` feature (nightly) it implements
//! [`Allocator`](core::alloc::Allocator) and can back individual collections.
//!
//! # Mode of operation
//! Every request is rounded up to a whole number of [quanta](#blocks) and
//! served by one [shard](#shards). Within the shard the allocator tries, in order:
//! - the [last-free cache](#last-free-cache), which only hits on an exact size match,
//! - the [free list](#free-list), searched first-fit starting at the bin of the request,
//! - the bump cursor of every [region](#regions) the shard owns,
//! - a fresh region from the shard's [region source](#region-sources).
//!   Bump allocation is retried once against it. If the source refuses,
//!   the request fails with [`AllocError::OutOfMemory`].
//!
//! On release the block goes into the last-free cache. Whatever block the
//! cache held before is evicted into the free list, merging with free
//! neighbours on the way.
//!
//! ## Blocks
//! A block is a run of [`QUANTUM`]-sized slots inside one region. Its size is
//! kept in quanta (`msize`), `to_msize(bytes) = ceil(max(bytes, MIN_BLOCK) / QUANTUM)`.
//! A block is either allocated, parked in the cache, or listed in the free list.
//!
//! ## Regions
//! A region is a contiguous piece of memory obtained in one go. It carves new
//! blocks off a bump cursor and keeps a bitmap of which slots are allocated.
//! Requests of up to `tiny_limit` bytes grow tiny regions, larger ones grow
//! small regions. Regions are never returned to the source.
//!
//! ## Free list
//! Freed blocks are kept in size bins, `bin = min(msize >> bin_shift, bins - 1)`.
//! Each bin is a LIFO list: the most recently listed block is reused first.
//! A listed block merges with a listed block directly below or above it,
//! as long as both belong to the same region.
//! A block larger than the request is split and the remainder goes back into the list.
//!
//! ## Last-free cache
//! Each shard remembers the last block it was handed back. Freeing and
//! reallocating the same size therefore returns the same address without
//! touching the free list.
//!
//! ## Shards
//! A shard is a private set of regions, a free list and a cache behind a lock.
//! Allocations use the shard reported by the zone's [`ShardSelector`] at the
//! time of the call (by default the current cpu). A block is always released
//! to the shard owning its region, found through a process wide index of
//! region address ranges.
//!
//! ## Region sources
//! A [`RegionSource`] is where regions come from. [`MmapSource`] maps
//! anonymous pages, [`HeapSource`] borrows them from the global allocator and
//! can be capped. Anything implementing the trait can be plugged into
//! [`Zone::with_parts`].
//!
//! # Logging
//! The crate emits [`tracing`] spans and events for every step of the
//! allocation state machine and never installs a subscriber of its own.
//!
//! [`RegionSource`]: sources::RegionSource
//! [`MmapSource`]: sources::MmapSource
//! [`HeapSource`]: sources::HeapSource
//! [`ShardSelector`]: selector::ShardSelector
#![cfg_attr(feature = "allocator-api", feature(allocator_api))]

pub use crate::allocators::Zone;
pub use crate::config::{RegionKind, ZoneConfig};
pub use crate::error::{AllocError, ConfigError, SourceError};
pub use crate::quantum::{msize_bytes, to_msize, Msize, MIN_BLOCK, QUANTUM};
pub use crate::stats::{BlockInfo, BlockState, RegionSummary, ShardStats, ZoneStats};

pub mod allocators;
mod cache;
pub mod config;
pub mod error;
mod freelist;
mod quantum;
mod region;
mod registry;
pub mod selector;
pub mod sources;
mod stats;
mod util;
