//! Group-versioned cache facade.
//!
//! This crate layers three guarantees over any dumb key-value backend
//! implementing the `strata-store` adapter contract:
//! - **Group invalidation in O(1)**: keys carry a per-group epoch; bumping
//!   the epoch orphans every existing key of the group without touching it.
//! - **Stale fallback**: a just-invalidated key serves its previous value
//!   exactly once before reporting a miss, so consumers never see a hole
//!   while recomputation is pending.
//! - **Stampede prevention**: concurrent `remember` calls for the same cold
//!   key collapse onto an advisory, TTL-bounded slot lock.
//!
//! # Example
//!
//! ```ignore
//! use strata_cache::{CacheConfig, CacheRegistry, InstanceConfig, DEFAULT_INSTANCE};
//!
//! let config = CacheConfig::new().with_prefix("site_").with_instance(
//!     DEFAULT_INSTANCE,
//!     InstanceConfig::new()
//!         .with_duration("+10 minutes")
//!         .with_groups(&["Posts", "Comments", "Session"])
//!         .with_prevent_clear(&["Session"]),
//! );
//!
//! let cache = CacheRegistry::init(config).await;
//! cache.set("Posts.p1", &post, DEFAULT_INSTANCE).await?;
//! cache.clear_group("Posts", DEFAULT_INSTANCE).await?;
//! // First read after the invalidation still serves the stale value.
//! let stale: Option<Post> = cache.get("Posts.p1", DEFAULT_INSTANCE).await?;
//! ```

mod config;
mod error;
mod instance;
mod key;
mod lock;
mod registry;

pub use config::*;
pub use error::*;
pub use instance::CacheInstance;
pub use key::{KeyScheme, EPOCH_LIMIT, GROUPS_META_SUFFIX};
pub use registry::*;
