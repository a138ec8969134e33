//! Cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced by the cache facade.
///
/// Misses, rejected writes and lock timeouts are not errors: misses are
/// `Ok(None)`, rejected writes are `Ok(false)`, and a lock that never comes
/// degrades `remember` to an unlocked computation.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The configured engine identifier names neither a built-in backend
    /// nor a registered factory.
    #[error("unknown cache engine '{0}'")]
    UnknownEngine(String),

    /// The duration expression in an instance configuration is malformed.
    #[error("invalid duration expression '{0}'")]
    InvalidDuration(String),

    /// The backend failed the operation.
    #[error(transparent)]
    Store(#[from] strata_store::StoreError),

    /// A cached value could not be decoded into the requested type.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
