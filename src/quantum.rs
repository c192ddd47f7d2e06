//! Quantum sizing: converting byte counts into size classes.
//!
//! Every block handed out by the allocator is a whole number of quanta long.
//! A size expressed in quanta is called an *msize* and is what the free list
//! bins, the last-free cache and the regions all operate on.

use static_assertions::const_assert;

/// The byte granularity all allocation sizes round up to.
pub const QUANTUM: usize = 16;

/// The smallest block the allocator will carve, in bytes.
pub const MIN_BLOCK: usize = 16;

/// A size expressed as a count of quanta.
pub type Msize = usize;

const_assert!(QUANTUM.is_power_of_two());
const_assert!(MIN_BLOCK >= QUANTUM);
const_assert!(MIN_BLOCK % QUANTUM == 0);

/// Converts a requested byte size into its size class,
/// i.e. `ceil(max(bytes, MIN_BLOCK) / QUANTUM)`.
#[inline]
pub const fn to_msize(bytes: usize) -> Msize {
    let bytes = if bytes < MIN_BLOCK { MIN_BLOCK } else { bytes };
    bytes.div_ceil(QUANTUM)
}

/// Returns the number of bytes covered by `msize` quanta
/// or `None` if that number does not fit in a `usize`.
#[inline]
pub const fn msize_bytes(msize: Msize) -> Option<usize> {
    msize.checked_mul(QUANTUM)
}
