//! [`RegionSource`] trait and structures that implement it.
//!
//! A region source is the allocator's only way of obtaining memory: whenever a
//! shard runs out of room it asks its source for a fresh region of a given size.
//! Regions are never handed back while the zone lives, so sources only need to
//! know how to give memory out.

use core::alloc::Layout;
use core::ptr::{null_mut, NonNull};

use parking_lot::Mutex;

use crate::error::SourceError;
use crate::util::{align_up, page_size};

/// A provider of fresh backing memory for regions.
///
/// # Safety
/// * A successful `request_region(size)` must return a `QUANTUM`-aligned pointer
///   together with a granted length of at least `size` bytes, a multiple of
///   `QUANTUM`, valid for reads and writes.
/// * The granted memory must not overlap any other grant and must stay valid
///   for as long as the source itself is alive.
pub unsafe trait RegionSource: Send + Sync {
    /// Obtains at least `size` bytes of fresh memory.
    /// Returns the start of the memory and the granted length.
    fn request_region(&self, size: usize) -> Result<(NonNull<u8>, usize), SourceError>;
}

unsafe impl<T: RegionSource + ?Sized> RegionSource for &T {
    fn request_region(&self, size: usize) -> Result<(NonNull<u8>, usize), SourceError> {
        (**self).request_region(size)
    }
}

/// A source that maps anonymous private pages with [`libc::mmap`].
/// Mappings are never unmapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapSource;

impl MmapSource {
    #[inline(always)]
    pub const fn new() -> Self {
        MmapSource
    }
}

unsafe impl RegionSource for MmapSource {
    fn request_region(&self, size: usize) -> Result<(NonNull<u8>, usize), SourceError> {
        let size = align_up(size.max(1), page_size()).ok_or(SourceError::Overflow)?;
        // SAFETY: an anonymous mapping at a kernel chosen address has no preconditions.
        let ptr = unsafe {
            libc::mmap(
                null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(SourceError::Refused {
                size,
                errno: std::io::Error::last_os_error().raw_os_error(),
            });
        }
        NonNull::new(ptr.cast::<u8>())
            .map(|p| (p, size))
            .ok_or(SourceError::Refused { size, errno: None })
    }
}

const HEAP_SOURCE_ALIGN: usize = 4096;

struct Grant {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: a grant is plain ownership of a heap allocation.
unsafe impl Send for Grant {}

#[derive(Default)]
struct HeapState {
    grants: Vec<Grant>,
    granted: usize,
    requests: usize,
}

/// A source that carves regions out of the Rust global allocator.
///
/// It can be capped at a total number of bytes, after which every request is
/// refused, and it counts the requests it receives. All grants are released
/// when the source is dropped.
pub struct HeapSource {
    limit: Option<usize>,
    state: Mutex<HeapState>,
}

impl HeapSource {
    /// A source without a limit.
    pub fn new() -> Self {
        HeapSource {
            limit: None,
            state: Mutex::new(HeapState::default()),
        }
    }

    /// A source that grants at most `limit` bytes in total.
    pub fn with_limit(limit: usize) -> Self {
        HeapSource {
            limit: Some(limit),
            state: Mutex::new(HeapState::default()),
        }
    }

    /// Number of `request_region` calls received so far, failed ones included.
    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Total number of bytes granted so far.
    pub fn granted(&self) -> usize {
        self.state.lock().granted
    }
}

impl Default for HeapSource {
    fn default() -> Self {
        HeapSource::new()
    }
}

impl std::fmt::Debug for HeapSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HeapSource")
            .field("limit", &self.limit)
            .field("granted", &state.granted)
            .field("requests", &state.requests)
            .finish()
    }
}

unsafe impl RegionSource for HeapSource {
    fn request_region(&self, size: usize) -> Result<(NonNull<u8>, usize), SourceError> {
        let mut state = self.state.lock();
        state.requests += 1;

        let size = align_up(size.max(1), HEAP_SOURCE_ALIGN).ok_or(SourceError::Overflow)?;
        let total = state.granted.checked_add(size).ok_or(SourceError::Overflow)?;
        if self.limit.is_some_and(|limit| total > limit) {
            return Err(SourceError::Refused { size, errno: None });
        }

        let layout =
            Layout::from_size_align(size, HEAP_SOURCE_ALIGN).map_err(|_| SourceError::Overflow)?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = NonNull::new(unsafe { std::alloc::alloc(layout) })
            .ok_or(SourceError::Refused { size, errno: None })?;

        state.grants.push(Grant { ptr, layout });
        state.granted = total;
        Ok((ptr, size))
    }
}

impl Drop for HeapSource {
    fn drop(&mut self) {
        for grant in self.state.get_mut().grants.drain(..) {
            // SAFETY: every grant was allocated with exactly this layout.
            unsafe { std::alloc::dealloc(grant.ptr.as_ptr(), grant.layout) };
        }
    }
}
