//! A cache instance: one store binding plus one key-versioning state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use strata_store::StoreAdapter;
use tracing::debug;

use crate::key::KeyScheme;
use crate::CacheResult;

/// Logical-key suffix under which the stale shadow copy is stored.
const STALE_SUFFIX: &str = "_stale_data";

/// Fixed lifetime of stale shadow copies, independent of the instance's
/// configured duration.
const STALE_TTL: Duration = Duration::from_secs(300);

/// One named cache instance.
///
/// Owns a store adapter handle and the epoch table for its groups. The
/// epoch table sits behind a process-local mutex that is only held while
/// deriving keys, never across a backend call; cross-process coordination
/// happens entirely through the backend itself.
pub struct CacheInstance {
    name: String,
    store: Arc<dyn StoreAdapter>,
    keys: Mutex<KeyScheme>,
    duration: Duration,
    prevent_clear: Vec<String>,
    namespaces: Vec<String>,
}

impl CacheInstance {
    /// Bind a store adapter and load the persisted epoch table from the
    /// backend's reserved meta-key (absent table: all groups at epoch 0).
    pub async fn bind(
        name: impl Into<String>,
        store: Arc<dyn StoreAdapter>,
        prefix: impl Into<String>,
        duration: Duration,
        groups: &[String],
        prevent_clear: &[String],
        namespaces: &[String],
    ) -> CacheResult<Self> {
        let mut scheme = KeyScheme::new(prefix, groups);

        if let Some(persisted) = store.get(&scheme.meta_key()).await? {
            scheme.restore(&persisted);
        }

        Ok(Self {
            name: name.into(),
            store,
            keys: Mutex::new(scheme),
            duration,
            prevent_clear: prevent_clear.iter().map(|g| KeyScheme::sanitize(g)).collect(),
            namespaces: namespaces.to_vec(),
        })
    }

    /// Build an instance over the null store. Every read misses and every
    /// write succeeds; the registry substitutes this for unknown names and
    /// while caching is disabled.
    pub fn noop(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(strata_store::NullStore::new()),
            keys: Mutex::new(KeyScheme::new("", &[])),
            duration: Duration::ZERO,
            prevent_clear: Vec::new(),
            namespaces: Vec::new(),
        }
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespaces this instance registered at construction.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Default entry time-to-live.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Current epoch of a group, if this instance tracks it.
    pub fn group_epoch(&self, group: &str) -> Option<u32> {
        self.keys().epoch(group)
    }

    fn keys(&self) -> std::sync::MutexGuard<'_, KeyScheme> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn physical(&self, logical: &str, use_stale_epoch: bool) -> String {
        self.keys().physical_key(logical, use_stale_epoch)
    }

    /// Store a value under a logical key, refreshing the stale shadow
    /// first. The shadow is addressed at the current epoch so it becomes
    /// reachable through the stale read path right after the next
    /// `clear_group`.
    pub async fn set(&self, key: &str, value: Value) -> CacheResult<bool> {
        self.store
            .set(
                &self.physical(&stale_key(key), false),
                value.clone(),
                Some(STALE_TTL),
            )
            .await?;

        let written = self
            .store
            .set(&self.physical(key, false), value, Some(self.duration))
            .await?;
        Ok(written)
    }

    /// Look up a logical key.
    ///
    /// On a primary miss with `use_stale` set, falls back to the stale
    /// shadow protocol: a surviving shadow from before the last group
    /// invalidation is returned once and consumed; failing that, the
    /// newest primary value under any older epoch re-seeds the shadow and
    /// the call still reports the miss.
    pub async fn get(&self, key: &str, use_stale: bool) -> CacheResult<Option<Value>> {
        let value = self.store.get(&self.physical(key, false)).await?;

        if value.is_some() || !use_stale {
            return Ok(value);
        }

        if let Some(stale) = self.take_stale(key).await? {
            debug!(instance = %self.name, key, "serving stale cache value");
            return Ok(Some(stale));
        }

        if let Some(last) = self.read_last_cleared(key).await? {
            self.store
                .set(
                    &self.physical(&stale_key(key), true),
                    last,
                    Some(STALE_TTL),
                )
                .await?;
        }

        Ok(None)
    }

    /// Direct primary lookup, bypassing the stale shadow protocol
    /// entirely. The remember flow uses this for its under-lock and
    /// post-timeout re-checks.
    pub async fn get_direct(&self, key: &str) -> CacheResult<Option<Value>> {
        Ok(self.store.get(&self.physical(key, false)).await?)
    }

    /// Delete a logical key along with its stale shadow.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        // The shadow may sit at the current-epoch address (written by set)
        // or the previous-epoch one (re-seeded after an invalidation).
        self.store
            .delete(&self.physical(&stale_key(key), false))
            .await?;
        self.store
            .delete(&self.physical(&stale_key(key), true))
            .await?;

        Ok(self.store.delete(&self.physical(key, false)).await?)
    }

    /// Write only if absent, atomically, with an explicit TTL.
    pub async fn add(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<bool> {
        Ok(self
            .store
            .add(&self.physical(key, false), value, Some(ttl))
            .await?)
    }

    /// Invalidate a group by advancing its epoch and persisting the whole
    /// epoch table back to the backend meta-key. Unknown groups do nothing.
    pub async fn clear_group(&self, group: &str) -> CacheResult<()> {
        let persist = {
            let mut keys = self.keys();
            keys.bump_group(group)
                .then(|| (keys.meta_key(), keys.snapshot()))
        };

        if let Some((meta_key, snapshot)) = persist {
            debug!(instance = %self.name, group, "group epoch advanced");
            self.store.set(&meta_key, snapshot, None).await?;
        }

        Ok(())
    }

    /// Drop every entry of this instance. Groups in the prevent list
    /// survive unless `ignore_prevents` is set.
    pub async fn clear(&self, ignore_prevents: bool) -> CacheResult<()> {
        let prefix = self.keys().prefix().to_string();
        let excludes: &[String] = if ignore_prevents {
            &[]
        } else {
            &self.prevent_clear
        };

        Ok(self.store.clear_by_prefix(&prefix, excludes).await?)
    }

    /// Read and consume the stale shadow addressed at the previous epoch.
    /// Consuming it is what makes the stale-then-miss sequence hold.
    async fn take_stale(&self, key: &str) -> CacheResult<Option<Value>> {
        let shadow_key = self.physical(&stale_key(key), true);

        match self.store.get(&shadow_key).await? {
            Some(value) => {
                self.store.delete(&shadow_key).await?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Scan older epochs, newest first, for the last primary value that
    /// survived previous invalidations of this key's group.
    async fn read_last_cleared(&self, key: &str) -> CacheResult<Option<Value>> {
        let candidates: Vec<String> = {
            let keys = self.keys();
            match keys.epoch_for_key(key) {
                Some(epoch) if epoch > 0 => (0..epoch)
                    .rev()
                    .filter_map(|e| keys.physical_key_at(key, e))
                    .collect(),
                _ => Vec::new(),
            }
        };

        for candidate in candidates {
            if let Some(value) = self.store.get(&candidate).await? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }
}

fn stale_key(key: &str) -> String {
    format!("{key}{STALE_SUFFIX}")
}
