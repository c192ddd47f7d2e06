//! The [`Zone`] allocator and the single-threaded shards it is made of.

pub(crate) mod shard;
pub mod zone;

pub use zone::Zone;
