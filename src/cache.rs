//! Defines the [`LastFreeCache`], the single slot in front of a shard's free list.
//!
//! The most recently freed block parks here instead of going to the free list,
//! so the common free-then-allocate-the-same-size pattern never touches the bins.
//! Only an exact size match is served from the slot.

use tracing::debug;

use crate::quantum::Msize;
use crate::region::Block;

#[derive(Debug, Default)]
pub(crate) struct LastFreeCache {
    slot: Option<Block>,
}

impl LastFreeCache {
    pub const fn new() -> Self {
        LastFreeCache { slot: None }
    }

    /// Parks `block` in the slot. Returns the previously parked block, which the
    /// caller must hand to the free list.
    #[inline]
    pub fn offer(&mut self, block: Block) -> Option<Block> {
        let evicted = self.slot.replace(block);
        if let Some(evicted) = &evicted {
            debug!(?evicted, "Evicting cached block.");
        }
        evicted
    }

    /// Takes the parked block if it is exactly `msize` quanta long.
    #[inline]
    pub fn take(&mut self, msize: Msize) -> Option<Block> {
        self.slot.take_if(|block| block.msize == msize)
    }

    #[inline]
    pub fn peek(&self) -> Option<&Block> {
        self.slot.as_ref()
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.peek().is_some()
    }
}
