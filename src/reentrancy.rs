//! Debug-only reentrancy detector for lock-holding sections.
//!
//! Releasing a foreign reference runs foreign code while the store's write
//! lock is held. If that code calls back into the same store on the same
//! thread, the lock would deadlock silently. In debug builds the store
//! records which thread holds its write lock and panics on such a nested
//! entry instead. In release builds this compiles to a zero-cost no-op.

#[cfg(not(debug_assertions))]
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use core::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
fn current_thread_tag() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static TAG: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TAG.with(|t| *t)
}

/// Per-instance tracker. Call [`check`](Self::check) before blocking on the
/// lock and [`enter`](Self::enter) once the write lock is held.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    holder: AtomicU64,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            holder: AtomicU64::new(0),
        }
    }

    /// Panics in debug builds if the calling thread already holds the
    /// guarded lock.
    #[inline]
    pub fn check(&self) {
        #[cfg(debug_assertions)]
        {
            assert!(
                self.holder.load(Ordering::Acquire) != current_thread_tag(),
                "reentrancy detected: handle store re-entered while its lock is held"
            );
        }
    }

    /// Record the calling thread as the lock holder until the guard drops.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let prev = self.holder.swap(current_thread_tag(), Ordering::AcqRel);
            debug_assert_eq!(prev, 0, "write lock holder was not cleared");
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.owner.holder.store(0, Ordering::Release);
        }
    }
}
