use core::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a store's operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Puts that added a new key.
    pub inserted: u64,
    /// Puts that replaced (and released) an existing entry.
    pub replaced: u64,
    /// Puts refused by validation, the capacity gate, or the foreign system.
    pub rejected: u64,
    /// Reads that found their key.
    pub hits: u64,
    /// Reads that did not.
    pub misses: u64,
    /// Entries handed to callers by consuming reads.
    pub taken: u64,
    /// Entries released by `clear`, `clear_all`, or shutdown.
    pub cleared: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StoreCounters {
    inserted: AtomicU64,
    replaced: AtomicU64,
    rejected: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    taken: AtomicU64,
    cleared: AtomicU64,
}

impl StoreCounters {
    pub(crate) fn snapshot(&self) -> StoreStats {
        StoreStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            taken: self.taken.load(Ordering::Relaxed),
            cleared: self.cleared.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_inserted(&self) {
        self.inserted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_replaced(&self) {
        self.replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_taken(&self) {
        self.taken.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_cleared(&self, n: usize) {
        self.cleared.fetch_add(n as u64, Ordering::Relaxed);
    }
}
