//! Defines the [`Region`] struct, a contiguous arena carved into quantum-sized slots.
//!
//! A region never changes size once created and is never handed back to its
//! source. Blocks are carved from it by advancing a bump cursor; after that they
//! cycle between the allocated state and the free structures of their shard.
//! The region itself only remembers which slots are covered by an allocated
//! block, everything else about free space lives in the [`FreeList`].

use core::ptr::NonNull;

use fixedbitset::FixedBitSet;
use tracing::debug;

use crate::config::RegionKind;
use crate::error::RegionExhausted;
use crate::freelist::FreeList;
use crate::quantum::{Msize, QUANTUM};

/// Index of a region within its shard (creation order).
pub(crate) type RegionId = usize;

/// The unit of allocation: `msize` quanta starting at `addr` inside region `region`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Block {
    pub addr: usize,
    pub msize: Msize,
    pub region: RegionId,
}

impl Block {
    /// One past the last byte of the block.
    #[inline]
    pub fn end(&self) -> usize {
        self.addr + self.msize * QUANTUM
    }

    /// Splits the block into a `msize`-quanta prefix and the remainder.
    #[inline]
    pub fn split(self, msize: Msize) -> (Block, Block) {
        debug_assert!(msize > 0 && msize < self.msize);
        let head = Block { msize, ..self };
        let rest = Block {
            addr: head.end(),
            msize: self.msize - msize,
            region: self.region,
        };
        (head, rest)
    }
}

#[derive(Debug)]
pub(crate) struct Region {
    base: NonNull<u8>,
    total_quanta: usize,
    cursor: usize,
    kind: RegionKind,
    /// One bit per slot, set while the slot is covered by an allocated block.
    allocated: FixedBitSet,
}

// SAFETY: a region only hands out pointers derived from `base`, the memory
// behind it is not tied to the thread that requested it.
unsafe impl Send for Region {}

impl Region {
    /// Creates a region over `total_quanta` quanta starting at `base`.
    ///
    /// # Safety
    /// `base` must be `QUANTUM`-aligned and valid for reads and writes of
    /// `total_quanta * QUANTUM` bytes for as long as the region lives.
    pub unsafe fn new(base: NonNull<u8>, total_quanta: usize, kind: RegionKind) -> Self {
        debug_assert_eq!(base.as_ptr() as usize % QUANTUM, 0);
        Region {
            base,
            total_quanta,
            cursor: 0,
            kind,
            allocated: FixedBitSet::with_capacity(total_quanta),
        }
    }

    /// Carves a block of `msize` quanta at the bump cursor and marks it allocated.
    pub fn bump_alloc(&mut self, id: RegionId, msize: Msize) -> Result<Block, RegionExhausted> {
        debug_assert!(msize > 0);
        match self.cursor.checked_add(msize) {
            Some(end) if end <= self.total_quanta => {
                let block = Block {
                    addr: self.addr_of(self.cursor),
                    msize,
                    region: id,
                };
                self.cursor = end;
                self.mark_allocated(&block);
                debug!(addr = block.addr, msize, cursor = self.cursor, "Bump allocated block.");
                Ok(block)
            }
            _ => Err(RegionExhausted),
        }
    }

    /// Hands a no longer cached block to the free list of the owning shard.
    pub fn release_to_freelist(&self, block: Block, free_list: &mut FreeList) -> Block {
        debug_assert!(self.contains(block.addr) && block.end() <= self.end());
        debug_assert_eq!(
            self.allocated.count_ones(self.slot_range(&block)),
            0,
            "Listed blocks should not overlap allocated ones."
        );
        free_list.insert(block)
    }

    pub fn mark_allocated(&mut self, block: &Block) {
        let slots = self.slot_range(block);
        debug_assert_eq!(
            self.allocated.count_ones(slots.clone()),
            0,
            "Allocated blocks should never overlap."
        );
        self.allocated.set_range(slots, true);
    }

    pub fn mark_free(&mut self, block: &Block) {
        let slots = self.slot_range(block);
        debug_assert_eq!(
            self.allocated.count_ones(slots.clone()),
            block.msize,
            "Only allocated blocks can be freed."
        );
        self.allocated.set_range(slots, false);
    }

    /// Returns whether the first slot of `block` is covered by an allocated block.
    pub fn is_allocated(&self, block: &Block) -> bool {
        self.allocated.contains(self.slot_of(block.addr))
    }

    /// Pointer to the first byte of `block`.
    pub fn ptr_of(&self, block: &Block) -> NonNull<u8> {
        debug_assert!(self.contains(block.addr));
        // SAFETY: the block lies inside the region so the offset stays in bounds.
        unsafe { self.base.add(block.addr - self.base_addr()) }
    }

    #[inline]
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.base_addr() + self.total_quanta * QUANTUM
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        (self.base_addr()..self.end()).contains(&addr)
    }

    #[inline]
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    #[inline]
    pub fn total_quanta(&self) -> usize {
        self.total_quanta
    }

    /// One past the last byte ever carved at the bump cursor.
    #[inline]
    pub fn carved_end(&self) -> usize {
        self.addr_of(self.cursor)
    }

    /// Quanta that were never carved from the region.
    #[inline]
    pub fn free_at_end(&self) -> usize {
        self.total_quanta - self.cursor
    }

    /// Quanta currently covered by allocated blocks.
    pub fn allocated_quanta(&self) -> usize {
        self.allocated.count_ones(..)
    }

    #[inline]
    fn addr_of(&self, slot: usize) -> usize {
        self.base_addr() + slot * QUANTUM
    }

    #[inline]
    fn slot_of(&self, addr: usize) -> usize {
        (addr - self.base_addr()) / QUANTUM
    }

    #[inline]
    fn slot_range(&self, block: &Block) -> core::ops::Range<usize> {
        let start = self.slot_of(block.addr);
        start..start + block.msize
    }
}
