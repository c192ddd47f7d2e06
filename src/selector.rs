//! [`ShardSelector`] trait and structures that implement it.
//!
//! The selector is consulted once at the top of every allocation and never
//! cached, so a thread that migrates between cores simply starts using another
//! shard. The raw id it returns is masked down to the shard count by the zone.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Reports which shard the calling execution context should use.
pub trait ShardSelector: Send + Sync {
    /// Returns a raw shard id, typically the current cpu number.
    fn current_shard(&self) -> usize;
}

impl<F> ShardSelector for F
where
    F: Fn() -> usize + Send + Sync,
{
    #[inline]
    fn current_shard(&self) -> usize {
        self()
    }
}

/// Selects shards by the cpu the calling thread currently runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuSelector;

impl ShardSelector for CpuSelector {
    #[inline]
    fn current_shard(&self) -> usize {
        cpu_id()
    }
}

/// Selects shards by a per-thread id. Unlike [`CpuSelector`] a thread always
/// lands on the same shard.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSelector;

impl ShardSelector for ThreadSelector {
    #[inline]
    fn current_shard(&self) -> usize {
        thread_id()
    }
}

#[cfg(target_os = "linux")]
fn cpu_id() -> usize {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).unwrap_or_else(|_| thread_id())
}

#[cfg(not(target_os = "linux"))]
fn cpu_id() -> usize {
    thread_id()
}

// Each thread gets a different id.
fn thread_id() -> usize {
    thread_local! {
        static ID: usize = {
            static NEXT: AtomicUsize = AtomicUsize::new(0);
            NEXT.fetch_add(1, Ordering::Relaxed)
        };
    }
    ID.with(|&id| id)
}
