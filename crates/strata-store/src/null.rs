//! Always-miss backend.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{StoreAdapter, StoreResult};

/// Backend that stores nothing.
///
/// Every read misses and every write reports success, so call sites behave
/// as if the cache were simply always cold. The registry binds this store to
/// its reserved disabled instance and substitutes it for unknown instance
/// names and while caching is globally disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl NullStore {
    /// Create a null store.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreAdapter for NullStore {
    async fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> StoreResult<bool> {
        Ok(true)
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Value>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        Ok(true)
    }

    async fn add(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> StoreResult<bool> {
        Ok(true)
    }

    async fn clear_by_prefix(&self, _prefix: &str, _exclude_groups: &[String]) -> StoreResult<()> {
        Ok(())
    }
}
