//! The cache registry: named instances, namespace fan-out, and the public
//! operation surface.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_store::{MemoryStore, NullStore, StoreAdapter};
use tracing::{debug, warn};

use crate::config::{CacheConfig, InstanceConfig};
use crate::instance::CacheInstance;
use crate::{lock, CacheError, CacheResult};

/// Name of the instance used when callers do not pick one.
pub const DEFAULT_INSTANCE: &str = "default";

/// Reserved name of the internal disabled instance; configurations using
/// it are skipped.
const DISABLED_INSTANCE: &str = "_strata_null_engine_";

/// TTL applied to `add` when the caller does not pass one.
const ADD_DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Factory for custom engines: receives the instance configuration and
/// yields a store adapter satisfying the capability contract.
pub type EngineFactory =
    Arc<dyn Fn(&InstanceConfig) -> CacheResult<Arc<dyn StoreAdapter>> + Send + Sync>;

/// Owns every cache instance and routes operations to them.
///
/// Misconfiguration never crashes a call site: instances that fail to
/// build, unknown instance names, and a globally disabled registry all
/// resolve to a reserved no-op instance whose reads miss and whose writes
/// report success.
pub struct CacheRegistry {
    global_prefix: String,
    threads: u32,
    enabled: AtomicBool,
    instances: RwLock<HashMap<String, Arc<CacheInstance>>>,
    namespaces: RwLock<HashMap<String, Vec<String>>>,
    engines: RwLock<HashMap<String, EngineFactory>>,
    disabled: Arc<CacheInstance>,
}

impl CacheRegistry {
    /// Build a registry and every instance the configuration names.
    ///
    /// A failing instance build is reported with a single warning and does
    /// not abort the others; the failed name simply resolves to the
    /// disabled instance. An empty instance map gets a memory-backed
    /// `default` instance.
    pub async fn init(config: CacheConfig) -> Self {
        Self::init_with_engines(config, Vec::new()).await
    }

    /// Like [`init`](Self::init), with custom engine factories registered
    /// before any instance is built, so configurations may name them.
    pub async fn init_with_engines(
        config: CacheConfig,
        engines: Vec<(String, EngineFactory)>,
    ) -> Self {
        let registry = Self {
            global_prefix: config.prefix.clone(),
            threads: config.threads.max(1),
            enabled: AtomicBool::new(true),
            instances: RwLock::new(HashMap::new()),
            namespaces: RwLock::new(HashMap::new()),
            engines: RwLock::new(HashMap::new()),
            disabled: Arc::new(CacheInstance::noop(DISABLED_INSTANCE)),
        };

        for (id, factory) in engines {
            registry.register_engine(id, factory);
        }

        let mut instances = config.instances;
        if instances.is_empty() {
            instances.insert(DEFAULT_INSTANCE.to_string(), InstanceConfig::default());
        }

        for (name, instance_config) in instances {
            registry.create(&name, instance_config).await;
        }

        registry
    }

    /// Register a custom engine factory under an identifier usable as the
    /// `engine` field of later instance configurations.
    pub fn register_engine(&self, id: impl Into<String>, factory: EngineFactory) {
        write_guard(&self.engines).insert(id.into().to_lowercase(), factory);
    }

    /// Build and register one instance. Failures degrade: a warning is
    /// logged and the name keeps resolving to the disabled instance.
    pub async fn create(&self, name: &str, config: InstanceConfig) {
        let name = name.to_lowercase();
        if name == DISABLED_INSTANCE {
            return;
        }

        match self.build_instance(&name, &config).await {
            Ok(instance) => {
                for namespace in &config.namespaces {
                    let mut namespaces = write_guard(&self.namespaces);
                    let members = namespaces.entry(namespace.clone()).or_default();
                    if !members.contains(&name) {
                        members.push(name.clone());
                    }
                }

                write_guard(&self.instances).insert(name, Arc::new(instance));
            }
            Err(error) => {
                warn!(instance = %name, %error, "cache instance disabled");
            }
        }
    }

    async fn build_instance(
        &self,
        name: &str,
        config: &InstanceConfig,
    ) -> CacheResult<CacheInstance> {
        let store = self.build_store(config)?;
        let duration = config.resolved_duration()?;
        let prefix = format!("{}{}", self.global_prefix, config.prefix);

        CacheInstance::bind(
            name,
            store,
            prefix,
            duration,
            &config.groups,
            &config.prevent_clear,
            &config.namespaces,
        )
        .await
    }

    fn build_store(&self, config: &InstanceConfig) -> CacheResult<Arc<dyn StoreAdapter>> {
        match config.engine.to_lowercase().as_str() {
            "memory" => Ok(Arc::new(MemoryStore::new())),
            "null" => Ok(Arc::new(NullStore::new())),
            id => match read_guard(&self.engines).get(id) {
                Some(factory) => factory(config),
                None => Err(CacheError::UnknownEngine(config.engine.clone())),
            },
        }
    }

    /// Resolve an instance name. Unknown names and a disabled registry
    /// yield the reserved no-op instance, so every call site always has a
    /// valid target.
    pub fn resolve(&self, name: &str) -> Arc<CacheInstance> {
        let instance = read_guard(&self.instances)
            .get(&name.to_lowercase())
            .cloned();

        match instance {
            Some(_) if !self.is_enabled() => self.disabled.clone(),
            Some(instance) => instance,
            None => {
                warn!(
                    instance = %name,
                    "unknown cache instance, operations degraded to no-op"
                );
                self.disabled.clone()
            }
        }
    }

    /// Turn caching on for every subsequent resolve.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Turn caching off; every resolve yields the no-op instance until
    /// re-enabled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    /// Whether caching is globally enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Store a value under a logical key.
    ///
    /// Empty strings and values that fail serialization are rejected with
    /// `Ok(false)` before anything is written, stale shadow included.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        instance: &str,
    ) -> CacheResult<bool> {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(error) => {
                debug!(key, %error, "rejected unserializable cache value");
                return Ok(false);
            }
        };

        if value.as_str() == Some("") {
            debug!(key, "rejected empty cache value");
            return Ok(false);
        }

        let target = self.resolve(instance);
        let written = target.set(key, value).await?;
        if !written {
            warn!(key, instance = %target.name(), "cache write refused by backend");
        }

        Ok(written)
    }

    /// Fetch a value, with stale fallback.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        instance: &str,
    ) -> CacheResult<Option<T>> {
        self.get_with_stale(key, instance, true).await
    }

    /// Fetch a value, choosing whether a primary miss may fall back to the
    /// stale shadow protocol.
    pub async fn get_with_stale<T: DeserializeOwned>(
        &self,
        key: &str,
        instance: &str,
        use_stale: bool,
    ) -> CacheResult<Option<T>> {
        match self.resolve(instance).get(key, use_stale).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Delete a logical key and its stale shadow.
    pub async fn delete(&self, key: &str, instance: &str) -> CacheResult<bool> {
        self.resolve(instance).delete(key).await
    }

    /// Write only if the key is absent, atomically. `ttl` defaults to five
    /// seconds.
    pub async fn add<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        instance: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<bool> {
        let value = serde_json::to_value(value)?;
        self.resolve(instance)
            .add(key, value, ttl.unwrap_or(ADD_DEFAULT_TTL))
            .await
    }

    /// Read-through: return the cached value or compute, store and return
    /// a fresh one, collapsing concurrent cold-key callers onto the
    /// stampede lock.
    ///
    /// When no lock slot frees up within the retry budget the computation
    /// runs unlocked; two callers may then both compute and both write,
    /// last write wins. That race is accepted and invisible to callers.
    pub async fn remember<T, F, Fut>(&self, key: &str, instance: &str, compute: F) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let target = self.resolve(instance);

        if let Some(value) = target.get(key, true).await? {
            return Ok(serde_json::from_value(value)?);
        }

        let mut slot = lock::acquire(&target, key, lock::LOCK_TTL, self.threads).await?;
        let mut retries = 0;
        while slot.is_none() && retries < lock::MAX_RETRIES {
            tokio::time::sleep(lock::RETRY_PAUSE).await;
            slot = lock::acquire(&target, key, lock::LOCK_TTL, self.threads).await?;
            retries += 1;
        }

        // Whether we hold a slot or gave up, another caller may have
        // finished in the meantime; check the backend directly so the
        // stale path is not re-triggered.
        if let Some(value) = target.get_direct(key).await? {
            if let Some(slot) = slot {
                lock::release(&target, slot, key).await?;
            }
            return Ok(serde_json::from_value(value)?);
        }

        let computed = match compute().await {
            Ok(computed) => computed,
            Err(error) => {
                if let Some(slot) = slot {
                    lock::release(&target, slot, key).await?;
                }
                return Err(error);
            }
        };

        self.set(key, &computed, instance).await?;

        if let Some(slot) = slot {
            lock::release(&target, slot, key).await?;
        } else {
            debug!(key, "lock budget exhausted, value computed unlocked");
        }

        Ok(computed)
    }

    /// Drop every entry of an instance, honoring its prevent list unless
    /// `ignore_prevents` is set.
    pub async fn clear(&self, ignore_prevents: bool, instance: &str) -> CacheResult<()> {
        self.resolve(instance).clear(ignore_prevents).await
    }

    /// Invalidate one group of an instance in O(1) by advancing its epoch.
    pub async fn clear_group(&self, group: &str, instance: &str) -> CacheResult<()> {
        self.resolve(instance).clear_group(group).await
    }

    /// Fan a prevents-ignoring clear out to every instance registered
    /// under the namespace. Unknown namespaces are a no-op.
    pub async fn clear_namespace(&self, namespace: &str) -> CacheResult<()> {
        let members = read_guard(&self.namespaces)
            .get(namespace)
            .cloned()
            .unwrap_or_default();

        for name in members {
            self.resolve(&name).clear(true).await?;
        }

        Ok(())
    }
}

fn read_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_guard<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
