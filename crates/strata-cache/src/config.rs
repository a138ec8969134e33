//! Registry and instance configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CacheError, CacheResult};

/// Top-level cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Global key prefix, prepended to every instance prefix. Must be
    /// unique per deployment sharing a backend.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Number of stampede-lock slots per key.
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Named instances to build at init time.
    #[serde(default)]
    pub instances: HashMap<String, InstanceConfig>,
}

fn default_prefix() -> String {
    "strata_".to_string()
}

fn default_threads() -> u32 {
    1
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            threads: default_threads(),
            instances: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Start from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the stampede-lock slot count.
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Add a named instance.
    pub fn with_instance(mut self, name: impl Into<String>, config: InstanceConfig) -> Self {
        self.instances.insert(name.into(), config);
        self
    }
}

/// Configuration for a single cache instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Backend kind: `"memory"`, `"null"`, or a registered custom
    /// engine identifier.
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Instance key prefix, appended to the global prefix.
    #[serde(default)]
    pub prefix: String,
    /// Default entry time-to-live as a relative-time expression,
    /// e.g. `"+10 minutes"`.
    #[serde(default = "default_duration")]
    pub duration: String,
    /// Groups this instance tracks invalidation epochs for.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Namespaces this instance belongs to.
    #[serde(default)]
    pub namespaces: Vec<String>,
    /// Groups exempt from non-forced clears.
    #[serde(default)]
    pub prevent_clear: Vec<String>,
}

fn default_engine() -> String {
    "memory".to_string()
}

fn default_duration() -> String {
    "+30 minutes".to_string()
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            prefix: String::new(),
            duration: default_duration(),
            groups: Vec::new(),
            namespaces: Vec::new(),
            prevent_clear: Vec::new(),
        }
    }
}

impl InstanceConfig {
    /// Start from defaults (memory engine, 30 minute duration).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend kind.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    /// Set the instance prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the default entry duration.
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    /// Set the tracked groups.
    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Set the namespace memberships.
    pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.namespaces = namespaces.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Set the groups exempt from non-forced clears.
    pub fn with_prevent_clear(mut self, groups: &[&str]) -> Self {
        self.prevent_clear = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Resolve the duration expression to a concrete `Duration`.
    pub fn resolved_duration(&self) -> CacheResult<Duration> {
        parse_duration(&self.duration)
    }
}

/// Parse a relative-time expression (`"+10 minutes"`, `"45 seconds"`) into
/// a duration. The leading `+` is optional; supported units are seconds,
/// minutes, hours, days and weeks, singular or plural.
pub fn parse_duration(expr: &str) -> CacheResult<Duration> {
    let invalid = || CacheError::InvalidDuration(expr.to_string());

    let trimmed = expr.trim().strip_prefix('+').unwrap_or_else(|| expr.trim());
    let mut parts = trimmed.split_whitespace();

    let amount: u64 = parts
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(invalid)?;
    let unit = parts.next().ok_or_else(invalid)?;

    if parts.next().is_some() {
        return Err(invalid());
    }

    let seconds = match unit.to_ascii_lowercase().as_str() {
        "second" | "seconds" | "sec" | "secs" => amount,
        "minute" | "minutes" | "min" | "mins" => amount * 60,
        "hour" | "hours" => amount * 3_600,
        "day" | "days" => amount * 86_400,
        "week" | "weeks" => amount * 604_800,
        _ => return Err(invalid()),
    };

    Ok(Duration::from_secs(seconds))
}
