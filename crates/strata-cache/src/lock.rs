//! Advisory stampede-prevention lock.
//!
//! Slot-based and TTL-bounded, built solely on the backend's atomic
//! add-if-absent. The lock reduces duplicate recomputation; it never
//! guarantees exclusion, and the remember flow deliberately degrades to
//! an unlocked computation when no slot frees up within the retry budget.

use std::time::Duration;

use serde_json::json;

use crate::instance::CacheInstance;
use crate::CacheResult;

/// Lifetime of a held lock slot. Caps how long a crashed holder can block
/// the slot.
pub const LOCK_TTL: Duration = Duration::from_secs(5);

/// Retries after the initial acquisition attempt fails.
pub const MAX_RETRIES: u32 = 30;

/// Pause between acquisition attempts.
pub const RETRY_PAUSE: Duration = Duration::from_millis(100);

fn slot_key(key: &str, slot: u32) -> String {
    format!("{key}__lock_thread_{slot}__")
}

/// Try slots `1..=slots` in order; the first successful add-if-absent wins.
/// Returns the held slot number, or `None` when every slot is occupied.
/// Never blocks.
pub(crate) async fn acquire(
    instance: &CacheInstance,
    key: &str,
    ttl: Duration,
    slots: u32,
) -> CacheResult<Option<u32>> {
    for slot in 1..=slots.max(1) {
        if instance.add(&slot_key(key, slot), json!(1), ttl).await? {
            return Ok(Some(slot));
        }
    }

    Ok(None)
}

/// Release a held slot by deleting its lock key.
pub(crate) async fn release(instance: &CacheInstance, slot: u32, key: &str) -> CacheResult<()> {
    instance.delete(&slot_key(key, slot)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_store::MemoryStore;

    async fn instance() -> CacheInstance {
        CacheInstance::bind(
            "default",
            Arc::new(MemoryStore::new()),
            "app_",
            Duration::from_secs(600),
            &["Posts".to_string()],
            &[],
            &[],
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_acquire_takes_first_free_slot() {
        let cache = instance().await;
        assert_eq!(
            acquire(&cache, "Posts.p1", LOCK_TTL, 2).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            acquire(&cache, "Posts.p1", LOCK_TTL, 2).await.unwrap(),
            Some(2)
        );
        assert_eq!(acquire(&cache, "Posts.p1", LOCK_TTL, 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_release_frees_the_slot() {
        let cache = instance().await;
        let slot = acquire(&cache, "Posts.p1", LOCK_TTL, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acquire(&cache, "Posts.p1", LOCK_TTL, 1).await.unwrap(), None);

        release(&cache, slot, "Posts.p1").await.unwrap();
        assert_eq!(
            acquire(&cache, "Posts.p1", LOCK_TTL, 1).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_locks_are_per_key() {
        let cache = instance().await;
        acquire(&cache, "Posts.p1", LOCK_TTL, 1).await.unwrap();
        assert_eq!(
            acquire(&cache, "Posts.p2", LOCK_TTL, 1).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_expired_lock_is_reacquirable() {
        let cache = instance().await;
        acquire(&cache, "Posts.p1", Duration::ZERO, 1).await.unwrap();
        assert_eq!(
            acquire(&cache, "Posts.p1", LOCK_TTL, 1).await.unwrap(),
            Some(1)
        );
    }
}
