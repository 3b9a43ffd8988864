//! handle-store: a bounded, thread-safe table of owned foreign references
//! keyed by string, with exactly-once release.
//!
//! A boundary adapter (JNI, a scripting bridge, an FFI shim) hands the store
//! a foreign value and a key. The store acquires an owned reference of its
//! own, keeps it until the key is overwritten, consumed, or cleared, and
//! then releases it exactly once.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep the release obligation of every acquired reference visible
//!   in the type system, then add admission and locking on top.
//! - Layers:
//!   - RecencyTable<K, V, S>: structural table with stable handles, O(1)
//!     lookup and removal, and newest/oldest ordering through intrusive
//!     links. Knows nothing about foreign references.
//!   - OwnershipLedger<R, S>: stores `Owned<R>` values, so overwrite,
//!     removal, and teardown release the displaced reference by dropping
//!     it. Consuming lookups hand the owning handle out instead.
//!   - AdmissionController<R, S>: key and null validation plus the
//!     capacity gate. Overwrites of present keys never count against
//!     capacity.
//!   - HandleStore<R, S>: one `RwLock` around the controller, lifecycle
//!     state, counters, and `tracing` events.
//!   - GlobalStore<R>: a lazily built process-wide store with explicit
//!     shutdown.
//!
//! Constraints
//! - `ForeignRefs` is the only place foreign code runs. `release` may run
//!   with the write lock held and must not call back into the same store;
//!   debug builds panic on such a nested entry instead of deadlocking.
//! - A failed put acquires nothing and mutates nothing.
//! - Occupancy never exceeds capacity, under any interleaving.
//! - After `shutdown` the store is empty and refuses all further work.
//!
//! Notes
//! - Non-consuming reads alias the stored reference, so the caller's copy
//!   stays valid after a later overwrite or clear. `with_value` gives
//!   borrowed access without aliasing.
//! - No eviction: a full store refuses new keys rather than dropping old
//!   ones. The recency order is exposed through `keys` for diagnostics.

pub mod admission;
mod config;
mod error;
mod foreign;
mod global;
pub mod ledger;
pub mod recency_table;
mod recency_table_proptest;
mod reentrancy;
mod stats;
mod store;

// Public surface
pub use config::{StoreConfig, DEFAULT_CAPACITY};
pub use error::{ConfigError, Result, StoreError};
pub use foreign::{ArcRefs, ForeignRefs, Owned};
pub use global::{GlobalStore, ShutdownGuard};
pub use ledger::Insertion;
pub use reentrancy::{DebugReentrancy, ReentrancyGuard};
pub use stats::StoreStats;
pub use store::{HandleStore, StoreState};
