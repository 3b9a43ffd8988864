//! Process-wide store with lazy initialization and explicit teardown.
//!
//! ```
//! use handle_store::{ArcRefs, GlobalStore, HandleStore, StoreState};
//! use std::sync::Arc;
//!
//! static STORE: GlobalStore<ArcRefs<String>> =
//!     GlobalStore::new(|| HandleStore::new(Arc::new(ArcRefs::new())));
//!
//! assert_eq!(STORE.state(), StoreState::Uninitialized);
//! let _teardown = STORE.shutdown_guard();
//! assert!(STORE.get().put("greeting", &Arc::new("hello".to_string())));
//! assert_eq!(STORE.state(), StoreState::Ready);
//! ```

use crate::foreign::ForeignRefs;
use crate::store::{HandleStore, StoreState};
use core::fmt;
use std::sync::OnceLock;
use tracing::{event, Level};

/// A [`HandleStore`] built on first use by `init`.
///
/// Statics are never dropped, so references still stored at exit would
/// leak unless [`shutdown`](Self::shutdown) runs. Hold a
/// [`ShutdownGuard`] for the lifetime of `main` (or of the library) to make
/// that happen on every exit path, early returns and unwinding included.
pub struct GlobalStore<R: ForeignRefs> {
    cell: OnceLock<HandleStore<R>>,
    init: fn() -> HandleStore<R>,
}

impl<R: ForeignRefs> GlobalStore<R> {
    pub const fn new(init: fn() -> HandleStore<R>) -> Self {
        Self {
            cell: OnceLock::new(),
            init,
        }
    }

    /// The store, initializing it if this is the first access.
    pub fn get(&self) -> &HandleStore<R> {
        self.cell.get_or_init(|| {
            let store = (self.init)();
            event!(Level::DEBUG, capacity = store.capacity(), "global handle store initialized");
            store
        })
    }

    pub fn state(&self) -> StoreState {
        match self.cell.get() {
            Some(store) => store.state(),
            None => StoreState::Uninitialized,
        }
    }

    /// Release everything and terminate. A store that was never used is
    /// initialized first so that termination holds for the rest of the
    /// process either way.
    pub fn shutdown(&self) -> usize {
        self.get().shutdown()
    }

    /// A guard that calls [`shutdown`](Self::shutdown) when dropped.
    pub fn shutdown_guard(&self) -> ShutdownGuard<'_, R> {
        ShutdownGuard { store: self }
    }
}

impl<R: ForeignRefs> fmt::Debug for GlobalStore<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(store) => f.debug_tuple("GlobalStore").field(store).finish(),
            None => f.write_str("GlobalStore(<uninitialized>)"),
        }
    }
}

#[must_use = "dropping the guard shuts the store down immediately"]
pub struct ShutdownGuard<'a, R: ForeignRefs> {
    store: &'a GlobalStore<R>,
}

impl<'a, R: ForeignRefs> Drop for ShutdownGuard<'a, R> {
    fn drop(&mut self) {
        self.store.shutdown();
    }
}
