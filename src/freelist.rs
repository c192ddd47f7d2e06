//! Defines the [`FreeList`] struct: size binned lists of free blocks.
//!
//! Each bin is a doubly linked list threaded through an address ordered index
//! of all listed blocks. The index doubles as the neighbour lookup used for
//! coalescing, so no metadata is ever written into the free memory itself.

use std::collections::BTreeMap;
use std::fmt::Write;

use tracing::{debug, instrument};

use crate::config::ZoneConfig;
use crate::quantum::Msize;
use crate::region::{Block, RegionId};

#[derive(Copy, Clone, Debug)]
struct Node {
    msize: Msize,
    region: RegionId,
    bin: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    #[inline]
    fn block(&self, addr: usize) -> Block {
        Block {
            addr,
            msize: self.msize,
            region: self.region,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FreeList {
    heads: Vec<Option<usize>>,
    nodes: BTreeMap<usize, Node>,
    config: ZoneConfig,
    quanta: usize,
}

impl FreeList {
    /// Creates an empty free list with the bins described by `config`,
    /// see [`ZoneConfig::bin_for`].
    pub fn new(config: &ZoneConfig) -> Self {
        debug_assert!(config.bins > 0);
        FreeList {
            heads: vec![None; config.bins],
            nodes: BTreeMap::new(),
            config: config.clone(),
            quanta: 0,
        }
    }

    #[inline]
    pub fn bin_for(&self, msize: Msize) -> usize {
        self.config.bin_for(msize)
    }

    /// Adds `block` to the free list, first merging it with its free neighbours
    /// in the same region. Returns the block as it was finally listed.
    #[instrument(level = "debug", skip(self), ret)]
    pub fn insert(&mut self, mut block: Block) -> Block {
        debug_assert!(
            !self.nodes.contains_key(&block.addr),
            "Block shouldn't be listed already."
        );

        if let Some(lower) = self.lower_neighbour(&block) {
            self.remove(lower.addr);
            debug!(?lower, "Coalescing with lower neighbour.");
            block = Block {
                addr: lower.addr,
                msize: lower.msize + block.msize,
                region: block.region,
            };
        }
        if let Some(upper) = self.upper_neighbour(&block) {
            self.remove(upper.addr);
            debug!(?upper, "Coalescing with upper neighbour.");
            block.msize += upper.msize;
        }

        self.push_front(block);
        block
    }

    /// Takes the first block, scanning bins upwards from the one `msize` maps to,
    /// that is at least `msize` quanta long. A larger block is split and its tail
    /// put back on the list.
    #[instrument(level = "debug", skip(self), ret)]
    pub fn find_fit(&mut self, msize: Msize) -> Option<Block> {
        let found = (self.bin_for(msize)..self.heads.len())
            .find_map(|bin| self.iter_bin(bin).find(|b| b.msize >= msize))?;
        self.remove(found.addr);

        if found.msize == msize {
            return Some(found);
        }
        let (head, rest) = found.split(msize);
        let rest = self.insert(rest);
        debug!(?found, ?rest, "Split free block, reslotted remainder.");
        Some(head)
    }

    /// Prepends `block` to its bin without attempting to coalesce.
    /// This operation has a time complexity of *O*(log n).
    pub fn push_front(&mut self, block: Block) {
        let bin = self.bin_for(block.msize);
        let next = self.heads[bin];
        if let Some(next) = next.and_then(|addr| self.nodes.get_mut(&addr)) {
            next.prev = Some(block.addr);
        }
        self.nodes.insert(
            block.addr,
            Node {
                msize: block.msize,
                region: block.region,
                bin,
                prev: None,
                next,
            },
        );
        self.heads[bin] = Some(block.addr);
        self.quanta += block.msize;
    }

    /// Unlinks the block starting at `addr`, returning it,
    /// or `None` if no listed block starts there.
    pub fn remove(&mut self, addr: usize) -> Option<Block> {
        let node = self.nodes.remove(&addr)?;
        match node.prev {
            None => self.heads[node.bin] = node.next,
            Some(prev) => {
                if let Some(prev) = self.nodes.get_mut(&prev) {
                    prev.next = node.next;
                }
            }
        }
        if let Some(next) = node.next.and_then(|addr| self.nodes.get_mut(&addr)) {
            next.prev = node.prev;
        }
        self.quanta -= node.msize;
        Some(node.block(addr))
    }

    /// Returns the head of `bin` or `None` if the bin is empty.
    #[cfg(test)]
    pub fn head(&self, bin: usize) -> Option<Block> {
        let addr = self.heads.get(bin).copied().flatten()?;
        self.nodes.get(&addr).map(|node| node.block(addr))
    }

    /// Iterates the blocks of `bin`, head first.
    pub fn iter_bin(&self, bin: usize) -> impl Iterator<Item = Block> + '_ {
        let mut cursor = self.heads.get(bin).copied().flatten();
        core::iter::from_fn(move || {
            let addr = cursor?;
            let node = self.nodes.get(&addr)?;
            cursor = node.next;
            Some(node.block(addr))
        })
    }

    /// Returns the listed block starting at `addr`.
    pub fn get(&self, addr: usize) -> Option<Block> {
        self.nodes.get(&addr).map(|node| node.block(addr))
    }

    #[inline]
    pub fn bins(&self) -> usize {
        self.heads.len()
    }

    /// Number of listed blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Sum of the sizes of all listed blocks, in quanta.
    #[inline]
    pub fn listed_quanta(&self) -> usize {
        self.quanta
    }

    /// Renders every non-empty bin as `[bin] 0xADDR [msize] <--> ...`, one per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for bin in (0..self.bins()).filter(|&bin| self.heads[bin].is_some()) {
            let entries: Vec<String> = self
                .iter_bin(bin)
                .map(|b| format!("{:#x} [{}]", b.addr, b.msize))
                .collect();
            let _ = writeln!(out, "[{bin}] {}", entries.join(" <--> "));
        }
        out
    }

    fn lower_neighbour(&self, block: &Block) -> Option<Block> {
        let (&addr, node) = self.nodes.range(..block.addr).next_back()?;
        let lower = node.block(addr);
        (lower.region == block.region && lower.end() == block.addr).then_some(lower)
    }

    fn upper_neighbour(&self, block: &Block) -> Option<Block> {
        let addr = block.end();
        let node = self.nodes.get(&addr)?;
        (node.region == block.region).then(|| node.block(addr))
    }
}
