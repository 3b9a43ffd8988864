use thiserror::Error;

/// Recoverable outcomes reported by the store. None of them leave the table
/// partially mutated; on every insertion error the caller still owns the
/// value it tried to hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },

    #[error("key must not be empty")]
    InvalidKey,

    #[error("refusing to store a null value")]
    NullValue,

    #[error("no entry under the requested key")]
    KeyNotFound,

    /// The foreign reference system could not mint a new owned reference.
    #[error("foreign reference system refused to acquire a reference")]
    AcquireFailed,

    /// A non-consuming read could not mint a caller-safe alias.
    #[error("foreign reference system refused to alias a stored reference")]
    AliasFailed,

    #[error("store has been shut down")]
    Terminated,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("capacity must be at least 1")]
    ZeroCapacity,
}
