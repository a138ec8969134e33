//! Store adapter layer for the strata cache.
//!
//! This crate defines the minimal capability contract a key-value backend
//! must expose (`StoreAdapter`) and ships the two built-in backends:
//! - `MemoryStore` - in-process map with per-entry expiry
//! - `NullStore` - always-miss backend used when caching is disabled
//!
//! Everything above this contract (key versioning, stale fallback, stampede
//! locks) lives in the `strata-cache` crate; everything below it (eviction,
//! persistence, replication) is the backend's own business.

mod adapter;
mod error;
mod memory;
mod null;

pub use adapter::*;
pub use error::*;
pub use memory::*;
pub use null::*;
