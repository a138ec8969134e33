//! In-process memory backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::{StoreAdapter, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() >= at)
    }
}

/// Backend storing entries in a process-local map.
///
/// TTLs are honored lazily: expired entries are dropped when touched and
/// skipped during prefix clears. Suitable for single-process deployments
/// and as the backend under test suites; coordination across processes
/// requires a shared backend instead.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        self.lock_entries()
            .map(|map| map.values().filter(|e| !e.is_expired()).count())
            .unwrap_or(0)
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Operation("store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut entries = self.lock_entries()?;
        entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut entries = self.lock_entries()?;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.lock_entries()?;
        Ok(entries.remove(key).is_some())
    }

    async fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut entries = self.lock_entries()?;

        // An expired entry does not block an add.
        if let Some(existing) = entries.get(key) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }

        entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(true)
    }

    async fn clear_by_prefix(&self, prefix: &str, exclude_groups: &[String]) -> StoreResult<()> {
        let mut entries = self.lock_entries()?;
        entries.retain(|key, entry| {
            if entry.is_expired() {
                return false;
            }
            let Some(remainder) = key.strip_prefix(prefix) else {
                return true;
            };
            exclude_groups
                .iter()
                .any(|group| belongs_to_group(remainder, group))
        });
        Ok(())
    }
}

/// Grouped keys embed their group as a leading `group_<epoch>_` segment
/// right after the instance prefix; only that segment identifies the
/// group. A group name appearing later in the key does not count.
fn belongs_to_group(remainder: &str, group: &str) -> bool {
    let Some(rest) = remainder
        .strip_prefix(group)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match rest.split_once('_') {
        Some((epoch, _)) => !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}
