//! AdmissionController: validation and the capacity gate in front of the
//! ownership ledger.

use crate::error::{Result, StoreError};
use crate::foreign::ForeignRefs;
use crate::ledger::{Insertion, OwnershipLedger};
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;

/// Checks that need no view of the table: a usable key and a non-null
/// value. Safe to run before taking any lock.
pub fn validate<R: ForeignRefs>(refs: &R, key: &str, value: &R::Value) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey);
    }
    if refs.is_null(value) {
        return Err(StoreError::NullValue);
    }
    Ok(())
}

pub struct AdmissionController<R: ForeignRefs, S = RandomState> {
    ledger: OwnershipLedger<R, S>,
    capacity: usize,
}

impl<R, S> AdmissionController<R, S>
where
    R: ForeignRefs,
    S: BuildHasher,
{
    pub fn new(ledger: OwnershipLedger<R, S>, capacity: usize) -> Self {
        debug_assert!(ledger.len() <= capacity);
        Self { ledger, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ledger(&self) -> &OwnershipLedger<R, S> {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut OwnershipLedger<R, S> {
        &mut self.ledger
    }

    /// Whether `key` may be inserted right now. Overwrites never grow the
    /// table and are admitted even when it is full.
    pub fn has_room_for(&self, key: &str) -> bool {
        self.ledger.len() < self.capacity || self.ledger.contains(key)
    }

    /// Insert after validation and the capacity check. Nothing is acquired
    /// and nothing is mutated unless every check passes.
    pub fn try_insert(&mut self, key: &str, value: &R::Value) -> Result<Insertion> {
        validate(&**self.ledger.refs(), key, value)?;
        if !self.has_room_for(key) {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let outcome = self.ledger.insert(key, value)?;
        debug_assert!(self.ledger.len() <= self.capacity);
        Ok(outcome)
    }
}
