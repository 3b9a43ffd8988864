//! OwnershipLedger: at most one owned foreign reference per key, each
//! acquired once on insertion and released once on removal.
//!
//! Values are stored as [`Owned`] handles, so every path that takes an
//! entry out of the table (overwrite, consume, clear, teardown, or simply
//! dropping the ledger) either releases the reference or hands the owning
//! handle to the caller. There is no third option.

use crate::error::{Result, StoreError};
use crate::foreign::{ForeignRefs, Owned};
use crate::recency_table::RecencyTable;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;
use std::sync::Arc;

/// Outcome of a successful [`OwnershipLedger::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The key was absent; occupancy grew by one.
    Fresh,
    /// The key was present; the previous reference has been released.
    Replaced,
}

pub struct OwnershipLedger<R: ForeignRefs, S = RandomState> {
    refs: Arc<R>,
    table: RecencyTable<String, Owned<R>, S>,
}

impl<R: ForeignRefs> OwnershipLedger<R> {
    pub fn new(refs: Arc<R>) -> Self {
        Self::with_hasher(refs, RandomState::new())
    }
}

impl<R, S> OwnershipLedger<R, S>
where
    R: ForeignRefs,
    S: BuildHasher,
{
    pub fn with_hasher(refs: Arc<R>, hasher: S) -> Self {
        Self {
            refs,
            table: RecencyTable::with_hasher(hasher),
        }
    }

    pub fn refs(&self) -> &Arc<R> {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Store an owned reference to `value` under `key` at the most-recent
    /// position, releasing whatever was stored there before.
    ///
    /// The new reference is acquired first so that a refusal from the
    /// foreign system leaves the ledger untouched. The previous reference
    /// is released before the new one is linked in.
    pub fn insert(&mut self, key: &str, value: &R::Value) -> Result<Insertion> {
        debug_assert!(!self.refs.is_null(value), "null values are rejected upstream");
        let owned = Owned::acquire(&self.refs, value).ok_or(StoreError::AcquireFailed)?;

        let (key, outcome) = match self.table.find(key) {
            Some(h) => {
                let (old_key, old) = self
                    .table
                    .remove(h)
                    .expect("handle found under the same borrow must be live");
                drop(old);
                (old_key, Insertion::Replaced)
            }
            None => (key.to_owned(), Insertion::Fresh),
        };

        if self.table.push_front(key, owned).is_err() {
            panic!("ledger invariant violated: key still indexed after its removal");
        }
        Ok(outcome)
    }

    /// Mint a caller-safe alias of the reference stored under `key`. The
    /// ledger keeps its own reference.
    pub fn peek(&self, key: &str) -> Result<Option<Owned<R>>> {
        let Some(owned) = self.table.find(key).and_then(|h| h.value(&self.table)) else {
            return Ok(None);
        };
        owned.alias().map(Some).ok_or(StoreError::AliasFailed)
    }

    /// Remove the entry under `key` and hand its owning handle out.
    pub fn take(&mut self, key: &str) -> Option<Owned<R>> {
        let h = self.table.find(key)?;
        self.table.remove(h).map(|(_k, owned)| owned)
    }

    /// `take` when `consume` is set, `peek` otherwise.
    pub fn lookup(&mut self, key: &str, consume: bool) -> Result<Option<Owned<R>>> {
        if consume {
            Ok(self.take(key))
        } else {
            self.peek(key)
        }
    }

    /// Run `f` against the stored reference without aliasing it. The
    /// reference is only valid for the duration of the call.
    pub fn with_borrowed<T>(&self, key: &str, f: impl FnOnce(&R::Raw) -> T) -> Option<T> {
        let owned = self.table.find(key).and_then(|h| h.value(&self.table))?;
        Some(f(owned.raw()))
    }

    /// Release the entry under `key`, if any.
    pub fn remove(&mut self, key: &str) -> bool {
        self.take(key).is_some()
    }

    /// Release every stored reference, oldest first. Returns how many were
    /// released.
    pub fn remove_all(&mut self) -> usize {
        let mut released = 0;
        while let Some((_key, owned)) = self.table.pop_oldest() {
            drop(owned);
            released += 1;
        }
        released
    }

    pub fn newest_key(&self) -> Option<&str> {
        self.table
            .newest()
            .and_then(|h| h.key(&self.table))
            .map(String::as_str)
    }

    pub fn oldest_key(&self) -> Option<&str> {
        self.table
            .oldest()
            .and_then(|h| h.key(&self.table))
            .map(String::as_str)
    }

    /// Keys from most to least recently inserted.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.table.iter().map(|(_h, k, _v)| k.as_str())
    }
}
