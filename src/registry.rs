//! Process-wide index answering "which shard owns this address?".
//!
//! A block must always be released to the shard whose region it was carved
//! from, whichever shard the releasing thread happens to be running on. The
//! registry is written once per new region and read once per release; its lock
//! is never held while a shard's free structures are being mutated.

use std::collections::BTreeMap;

use parking_lot::RwLock;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Owner {
    end: usize,
    shard: usize,
}

#[derive(Debug, Default)]
pub(crate) struct RegionRegistry {
    regions: RwLock<BTreeMap<usize, Owner>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        RegionRegistry::default()
    }

    /// Records that `[base, base + len)` belongs to `shard`.
    pub fn register(&self, base: usize, len: usize, shard: usize) {
        let end = base + len;
        let mut regions = self.regions.write();
        debug_assert!(
            regions
                .range(..end)
                .next_back()
                .map_or(true, |(_, owner)| owner.end <= base),
            "Regions should never overlap."
        );
        regions.insert(base, Owner { end, shard });
    }

    /// Returns the shard owning the region that contains `addr`.
    pub fn owner_of(&self, addr: usize) -> Option<usize> {
        let regions = self.regions.read();
        let (_, owner) = regions.range(..=addr).next_back()?;
        (addr < owner.end).then_some(owner.shard)
    }

    /// Number of registered regions.
    pub fn len(&self) -> usize {
        self.regions.read().len()
    }
}
