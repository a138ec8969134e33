//! End-to-end tour of the cache facade: two instances, group
//! invalidation with stale reads, read-through, and namespace fan-out.

use strata_cache::{CacheConfig, CacheRegistry, CacheResult, InstanceConfig, DEFAULT_INSTANCE};

#[tokio::main]
async fn main() -> CacheResult<()> {
    let config = CacheConfig::new()
        .with_prefix("site_")
        .with_instance(
            DEFAULT_INSTANCE,
            InstanceConfig::new()
                .with_prefix("default_")
                .with_duration("+10 minutes")
                .with_groups(&["Posts", "Comments", "Session"])
                .with_namespaces(&["Posts"])
                .with_prevent_clear(&["Session"]),
        )
        .with_instance(
            "long_cache",
            InstanceConfig::new()
                .with_prefix("long_")
                .with_duration("+10 hours")
                .with_groups(&["Posts"])
                .with_namespaces(&["Posts"]),
        );

    let cache = CacheRegistry::init(config).await;

    cache.set("Posts.post_1", &"first post", DEFAULT_INSTANCE).await?;
    println!(
        "after set:            {:?}",
        cache.get::<String>("Posts.post_1", DEFAULT_INSTANCE).await?
    );

    cache.clear_group("Posts", DEFAULT_INSTANCE).await?;
    println!(
        "after clear_group:    {:?} (stale, served once)",
        cache.get::<String>("Posts.post_1", DEFAULT_INSTANCE).await?
    );
    println!(
        "next read:            {:?}",
        cache.get::<String>("Posts.post_1", DEFAULT_INSTANCE).await?
    );

    let rebuilt: String = cache
        .remember("Posts.post_1", DEFAULT_INSTANCE, || async {
            Ok("rebuilt post".to_string())
        })
        .await?;
    println!("remember rebuilt:     {rebuilt:?}");

    cache.set("Posts.post_9", &"long-lived post", "long_cache").await?;
    cache.clear_namespace("Posts").await?;
    println!(
        "after namespace clear: default={:?} long_cache={:?}",
        cache
            .get_with_stale::<String>("Posts.post_1", DEFAULT_INSTANCE, false)
            .await?,
        cache
            .get_with_stale::<String>("Posts.post_9", "long_cache", false)
            .await?
    );

    Ok(())
}
