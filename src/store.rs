//! HandleStore: the thread-safe façade handed to the boundary adapter.
//!
//! One `RwLock` covers the whole table. Mutations (`put`, consuming `get`,
//! `clear`, `clear_all`, `shutdown`) hold it exclusively; `has`, `len` and
//! peeking reads share it. Every critical section does pointer work plus at
//! most one acquire, alias or release per entry touched.

use crate::admission::{self, AdmissionController};
use crate::config::StoreConfig;
use crate::error::{ConfigError, Result, StoreError};
use crate::foreign::{ForeignRefs, Owned};
use crate::ledger::{Insertion, OwnershipLedger};
use crate::reentrancy::{DebugReentrancy, ReentrancyGuard};
use crate::stats::{StoreCounters, StoreStats};
use core::fmt;
use core::hash::BuildHasher;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::hash_map::RandomState;
use std::sync::Arc;
use tracing::{event, Level};

/// Lifecycle of a store. A [`HandleStore`] is `Ready` from construction;
/// `Uninitialized` is only reported by a
/// [`GlobalStore`](crate::GlobalStore) that has not been touched yet.
/// `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Ready,
    Terminated,
}

struct Inner<R: ForeignRefs, S> {
    admission: AdmissionController<R, S>,
    terminated: bool,
}

// Field order matters: the reentrancy record is cleared before the lock is
// released.
struct WriteLocked<'a, R: ForeignRefs, S> {
    _reentrancy: ReentrancyGuard<'a>,
    inner: RwLockWriteGuard<'a, Inner<R, S>>,
}

/// Bounded, thread-safe table of owned foreign references keyed by string.
pub struct HandleStore<R: ForeignRefs, S = RandomState> {
    inner: RwLock<Inner<R, S>>,
    refs: Arc<R>,
    capacity: usize,
    reentrancy: DebugReentrancy,
    counters: StoreCounters,
}

impl<R: ForeignRefs> HandleStore<R> {
    /// A store with [`StoreConfig::default`].
    pub fn new(refs: Arc<R>) -> Self {
        Self::build(refs, StoreConfig::default().capacity, RandomState::new())
    }

    pub fn with_capacity(refs: Arc<R>, capacity: usize) -> std::result::Result<Self, ConfigError> {
        Self::with_config(refs, StoreConfig::with_capacity(capacity))
    }

    pub fn with_config(refs: Arc<R>, config: StoreConfig) -> std::result::Result<Self, ConfigError> {
        Self::with_config_and_hasher(refs, config, RandomState::new())
    }
}

impl<R, S> HandleStore<R, S>
where
    R: ForeignRefs,
    S: BuildHasher,
{
    pub fn with_config_and_hasher(
        refs: Arc<R>,
        config: StoreConfig,
        hasher: S,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(refs, config.capacity, hasher))
    }

    fn build(refs: Arc<R>, capacity: usize, hasher: S) -> Self {
        let ledger = OwnershipLedger::with_hasher(refs.clone(), hasher);
        event!(Level::DEBUG, capacity, "handle store ready");
        Self {
            inner: RwLock::new(Inner {
                admission: AdmissionController::new(ledger, capacity),
                terminated: false,
            }),
            refs,
            capacity,
            reentrancy: DebugReentrancy::new(),
            counters: StoreCounters::default(),
        }
    }

    fn write(&self) -> WriteLocked<'_, R, S> {
        self.reentrancy.check();
        let inner = self.inner.write();
        WriteLocked {
            _reentrancy: self.reentrancy.enter(),
            inner,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<R, S>> {
        self.reentrancy.check();
        self.inner.read()
    }

    pub fn refs(&self) -> &Arc<R> {
        &self.refs
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.read().admission.ledger().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> StoreState {
        if self.read().terminated {
            StoreState::Terminated
        } else {
            StoreState::Ready
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot()
    }

    fn reject(&self, key: &str, err: StoreError) -> StoreError {
        self.counters.inc_rejected();
        match err {
            StoreError::AcquireFailed => event!(Level::WARN, key, %err, "put rejected"),
            _ => event!(Level::DEBUG, key, %err, "put rejected"),
        }
        err
    }

    /// Acquire a reference to `value` and store it under `key`, releasing
    /// any reference previously stored there.
    ///
    /// On `Err` nothing was acquired and the caller's value is untouched.
    pub fn try_put(&self, key: &str, value: &R::Value) -> Result<Insertion> {
        if let Err(err) = admission::validate(&*self.refs, key, value) {
            return Err(self.reject(key, err));
        }

        let mut locked = self.write();
        if locked.inner.terminated {
            drop(locked);
            return Err(self.reject(key, StoreError::Terminated));
        }
        let result = locked.inner.admission.try_insert(key, value);
        let len = locked.inner.admission.ledger().len();
        drop(locked);

        match result {
            Ok(Insertion::Fresh) => {
                self.counters.inc_inserted();
                event!(Level::TRACE, key, len, "stored");
            }
            Ok(Insertion::Replaced) => {
                self.counters.inc_replaced();
                event!(Level::TRACE, key, len, "replaced");
            }
            Err(err) => return Err(self.reject(key, err)),
        }
        result
    }

    /// `try_put` reduced to whether ownership was transferred.
    pub fn put(&self, key: &str, value: &R::Value) -> bool {
        self.try_put(key, value).is_ok()
    }

    /// Null-safe put: `None` is refused without touching the table.
    pub fn put_opt(&self, key: &str, value: Option<&R::Value>) -> bool {
        match value {
            Some(v) => self.put(key, v),
            None => {
                self.reject(key, StoreError::NullValue);
                false
            }
        }
    }

    /// Look up `key`. With `consume`, the entry is removed and its owning
    /// handle returned; otherwise a fresh alias is returned and the store
    /// keeps its reference.
    pub fn try_get(&self, key: &str, consume: bool) -> Result<Owned<R>> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey);
        }

        let found = if consume {
            let mut locked = self.write();
            if locked.inner.terminated {
                return Err(StoreError::Terminated);
            }
            locked.inner.admission.ledger_mut().take(key)
        } else {
            let inner = self.read();
            if inner.terminated {
                return Err(StoreError::Terminated);
            }
            let peeked = inner.admission.ledger().peek(key);
            drop(inner);
            match peeked {
                Ok(found) => found,
                Err(err) => {
                    event!(Level::WARN, key, %err, "peek failed");
                    return Err(err);
                }
            }
        };

        match found {
            Some(owned) => {
                self.counters.inc_hit();
                if consume {
                    self.counters.inc_taken();
                }
                event!(Level::TRACE, key, consume, "hit");
                Ok(owned)
            }
            None => {
                self.counters.inc_miss();
                event!(Level::TRACE, key, consume, "miss");
                Err(StoreError::KeyNotFound)
            }
        }
    }

    pub fn get(&self, key: &str, consume: bool) -> Option<Owned<R>> {
        self.try_get(key, consume).ok()
    }

    /// Consuming read.
    pub fn take(&self, key: &str) -> Option<Owned<R>> {
        self.get(key, true)
    }

    /// Non-consuming read.
    pub fn peek(&self, key: &str) -> Option<Owned<R>> {
        self.get(key, false)
    }

    /// Run `f` on the stored reference without aliasing it. `f` runs under
    /// the shared lock and must not call back into this store.
    pub fn with_value<T>(&self, key: &str, f: impl FnOnce(&R::Raw) -> T) -> Option<T> {
        let inner = self.read();
        if inner.terminated {
            return None;
        }
        inner.admission.ledger().with_borrowed(key, f)
    }

    pub fn has(&self, key: &str) -> bool {
        let inner = self.read();
        !inner.terminated && inner.admission.ledger().contains(key)
    }

    /// Release the entry under `key`. Returns whether there was one.
    pub fn clear(&self, key: &str) -> bool {
        let mut locked = self.write();
        if locked.inner.terminated {
            return false;
        }
        let removed = locked.inner.admission.ledger_mut().remove(key);
        drop(locked);
        if removed {
            self.counters.add_cleared(1);
            event!(Level::TRACE, key, "cleared");
        }
        removed
    }

    /// Release every entry. Returns how many were released.
    pub fn clear_all(&self) -> usize {
        let mut locked = self.write();
        let released = locked.inner.admission.ledger_mut().remove_all();
        drop(locked);
        self.counters.add_cleared(released);
        event!(Level::DEBUG, released, "cleared all entries");
        released
    }

    /// Release every entry and refuse all further work. Idempotent; later
    /// calls release nothing.
    pub fn shutdown(&self) -> usize {
        let mut locked = self.write();
        let released = locked.inner.admission.ledger_mut().remove_all();
        let first = !locked.inner.terminated;
        locked.inner.terminated = true;
        drop(locked);
        self.counters.add_cleared(released);
        if first {
            event!(Level::INFO, released, "handle store shut down");
        }
        released
    }

    /// Snapshot of the stored keys, most recently inserted first.
    pub fn keys(&self) -> Vec<String> {
        self.read()
            .admission
            .ledger()
            .keys()
            .map(str::to_owned)
            .collect()
    }
}

impl<R: ForeignRefs, S: BuildHasher> fmt::Debug for HandleStore<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("HandleStore");
        d.field("capacity", &self.capacity);
        match self.inner.try_read() {
            Some(inner) => d
                .field("len", &inner.admission.ledger().len())
                .field("terminated", &inner.terminated),
            None => d.field("len", &format_args!("<locked>")),
        };
        d.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign::mock::{CountingRefs, NULL};
    use std::sync::atomic::Ordering;

    fn store(capacity: usize) -> (Arc<CountingRefs>, HandleStore<CountingRefs>) {
        let refs = Arc::new(CountingRefs::new());
        let store = HandleStore::with_capacity(refs.clone(), capacity).unwrap();
        (refs, store)
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        let refs = Arc::new(CountingRefs::new());
        assert!(matches!(
            HandleStore::with_capacity(refs, 0),
            Err(ConfigError::ZeroCapacity)
        ));
    }

    #[test]
    fn default_store_uses_default_capacity() {
        let s = HandleStore::new(Arc::new(CountingRefs::new()));
        assert_eq!(s.capacity(), crate::DEFAULT_CAPACITY);
        assert_eq!(s.state(), StoreState::Ready);
        assert!(s.is_empty());
    }

    /// The capacity-2 walk-through: a third key is refused, an overwrite is
    /// admitted, and the overwritten value is released.
    #[test]
    fn capacity_two_scenario() {
        let (refs, s) = store(2);
        assert!(s.put("a", &1));
        assert!(s.put("b", &2));
        assert!(!s.put("c", &3));
        assert!(!s.has("c"));
        assert!(s.put("a", &9));
        let a = s.get("a", true).expect("a present");
        assert_eq!(a.raw().payload, 9);
        assert_eq!(refs.released_count_of(1), 1);
        assert!(!s.has("a"));
    }

    #[test]
    fn consume_then_has_is_false() {
        let (_refs, s) = store(4);
        s.put("k", &1);
        assert!(s.take("k").is_some());
        assert!(!s.has("k"));
        assert!(s.take("k").is_none());
    }

    #[test]
    fn peek_keeps_entry_for_a_later_consume() {
        let (refs, s) = store(4);
        s.put("k", &1);
        let peeked = s.peek("k").unwrap();
        assert!(s.has("k"));
        let taken = s.take("k").unwrap();
        assert_eq!(peeked.raw().payload, 1);
        assert_eq!(taken.raw().payload, 1);
        assert_ne!(peeked.raw().id, taken.raw().id);
        drop((peeked, taken));
        assert_eq!(refs.live_count(), 0);
    }

    #[test]
    fn try_forms_report_the_error_taxonomy() {
        let (refs, s) = store(1);
        assert_eq!(s.try_put("", &1), Err(StoreError::InvalidKey));
        assert_eq!(s.try_put("k", &NULL), Err(StoreError::NullValue));
        assert_eq!(s.try_put("k", &1), Ok(Insertion::Fresh));
        assert_eq!(
            s.try_put("j", &2),
            Err(StoreError::CapacityExceeded { capacity: 1 })
        );
        assert!(matches!(s.try_get("", true), Err(StoreError::InvalidKey)));
        assert!(matches!(s.try_get("nope", false), Err(StoreError::KeyNotFound)));

        refs.fail_alias.store(true, Ordering::Relaxed);
        assert!(matches!(s.try_get("k", false), Err(StoreError::AliasFailed)));
        assert!(s.has("k"));

        refs.fail_acquire.store(true, Ordering::Relaxed);
        assert_eq!(s.try_put("k", &3), Err(StoreError::AcquireFailed));
        assert_eq!(s.with_value("k", |r| r.payload), Some(1));
    }

    #[test]
    fn put_opt_refuses_none_without_acquire() {
        let (refs, s) = store(2);
        assert!(!s.put_opt("k", None));
        assert_eq!(refs.acquired(), 0);
        assert!(s.put_opt("k", Some(&4)));
        assert!(s.has("k"));
    }

    #[test]
    fn clear_and_clear_all_release() {
        let (refs, s) = store(8);
        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            s.put(k, &(i as i32 + 1));
        }
        assert!(s.clear("b"));
        assert!(!s.clear("b"));
        assert_eq!(s.len(), 2);
        assert_eq!(s.clear_all(), 2);
        assert!(s.is_empty());
        assert_eq!(refs.live_count(), 0);
        assert_eq!(s.stats().cleared, 3);
    }

    #[test]
    fn shutdown_is_terminal() {
        let (refs, s) = store(4);
        s.put("a", &1);
        s.put("b", &2);
        assert_eq!(s.shutdown(), 2);
        assert_eq!(refs.live_count(), 0);
        assert_eq!(s.state(), StoreState::Terminated);

        assert_eq!(s.try_put("c", &3), Err(StoreError::Terminated));
        assert!(!s.put("c", &3));
        assert!(!s.has("c"));
        assert!(s.get("a", true).is_none());
        assert!(matches!(s.try_get("a", false), Err(StoreError::Terminated)));
        assert!(!s.clear("a"));
        assert_eq!(s.shutdown(), 0);
        assert_eq!(refs.acquired(), 2);
    }

    #[test]
    fn stats_count_each_outcome() {
        let (_refs, s) = store(1);
        s.put("a", &1);
        s.put("a", &2);
        s.put("b", &3);
        s.peek("a");
        s.peek("zz");
        s.take("a");
        assert_eq!(
            s.stats(),
            StoreStats {
                inserted: 1,
                replaced: 1,
                rejected: 1,
                hits: 2,
                misses: 1,
                taken: 1,
                cleared: 0,
            }
        );
    }

    #[test]
    fn keys_are_newest_first() {
        let (_refs, s) = store(4);
        s.put("a", &1);
        s.put("b", &2);
        s.put("a", &3);
        assert_eq!(s.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    /// Releasing a reference that calls back into the same store would
    /// deadlock; debug builds turn that into a panic.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrant_release_panics_in_debug() {
        use std::sync::atomic::AtomicBool;
        use std::sync::OnceLock;

        // Calls back only once so the unwind that follows stays quiet.
        struct Reentrant {
            store: OnceLock<std::sync::Weak<HandleStore<Reentrant>>>,
            armed: AtomicBool,
        }
        impl ForeignRefs for Reentrant {
            type Value = i32;
            type Raw = i32;
            fn acquire(&self, v: &i32) -> Option<i32> {
                Some(*v)
            }
            fn alias(&self, r: &i32) -> Option<i32> {
                Some(*r)
            }
            fn release(&self, _raw: i32) {
                if !self.armed.swap(false, Ordering::SeqCst) {
                    return;
                }
                if let Some(s) = self.store.get().and_then(|w| w.upgrade()) {
                    let _ = s.has("anything");
                }
            }
        }

        let refs = Arc::new(Reentrant {
            store: OnceLock::new(),
            armed: AtomicBool::new(true),
        });
        let s = Arc::new(HandleStore::with_capacity(refs.clone(), 4).unwrap());
        let _ = refs.store.set(Arc::downgrade(&s));
        s.put("k", &1);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.put("k", &2);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }
}
