//! The store adapter capability contract.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::StoreResult;

/// Capability contract every cache backend implements.
///
/// The contract is deliberately dumb: an upsert, a lookup, a delete, an
/// atomic add-if-absent, and a bulk clear. All higher-level behavior
/// (group versioning, stale shadows, advisory locks) is layered on top of
/// these five operations by the cache core, which only ever hands a backend
/// fully derived physical keys.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Unconditional upsert. `ttl` of `None` means the entry does not expire.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<bool>;

    /// Look up a key. A miss is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Remove a key if present. Idempotent.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Write only if the key is absent, atomically. Returns whether the
    /// write happened. This is the sole primitive the stampede lock
    /// depends on.
    async fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<bool>;

    /// Remove every key starting with `prefix`, except keys whose embedded
    /// group segment (`group_<epoch>_` right after the prefix) names a
    /// group listed in `exclude_groups` (group names arrive sanitized).
    ///
    /// Backends without per-key enumeration may implement this as a full
    /// flush; that degraded behavior is accepted.
    async fn clear_by_prefix(&self, prefix: &str, exclude_groups: &[String]) -> StoreResult<()>;
}
