//! Utility functions.

/// Returns the smallest multiple of `align` that is greater or equal to `value`
/// or `None` if no such value fits in a `usize`.
///
/// # Panics
/// Panics in debug builds if `align` is not a power-of-two.
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two(), "alignment should be a power of two.");
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Returns the system page size, falling back to 4KiB if it can not be queried.
pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    match usize::try_from(size) {
        Ok(size) if size.is_power_of_two() => size,
        _ => 4096,
    }
}
