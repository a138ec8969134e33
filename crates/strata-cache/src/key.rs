//! Key versioning scheme.
//!
//! Logical keys look like `"Group.Rest"`. When the group is one the
//! instance tracks, the physical key embeds the group's current
//! invalidation epoch, so bumping the epoch makes every previously issued
//! physical key for that group unreachable in O(1) - the old entries just
//! age out through their own TTLs.

use std::collections::HashMap;

use serde_json::Value;

/// Suffix of the reserved meta-key that persists an instance's epoch table.
pub const GROUPS_META_SUFFIX: &str = "CacheComponentGroups";

/// Epochs wrap back to zero after this many increments. The wrap bounds
/// physical-key length and key-space churn; post-wrap collisions are
/// accepted.
pub const EPOCH_LIMIT: u32 = 1000;

/// Derives physical keys from logical keys for one instance.
///
/// Pure given the current epoch table: for a fixed prefix and epoch table,
/// the same logical key always maps to the same physical key.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    prefix: String,
    epochs: HashMap<String, u32>,
}

impl KeyScheme {
    /// Create a scheme with every configured group at epoch zero.
    /// Group names are tracked in sanitized form, matching the group
    /// segment of physical keys.
    pub fn new(prefix: impl Into<String>, groups: &[String]) -> Self {
        Self {
            prefix: prefix.into(),
            epochs: groups
                .iter()
                .map(|group| (Self::sanitize(group), 0))
                .collect(),
        }
    }

    /// The instance key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The reserved backend key holding the persisted epoch table.
    pub fn meta_key(&self) -> String {
        format!("{}{}", self.prefix, GROUPS_META_SUFFIX)
    }

    /// Current epoch of a group, if tracked.
    pub fn epoch(&self, group: &str) -> Option<u32> {
        self.epochs.get(&Self::sanitize(group)).copied()
    }

    /// Current epoch of the group a logical key belongs to, if tracked.
    /// Derived through the same sanitization as physical keys, so the raw
    /// and sanitized group names can never disagree between callers.
    pub fn epoch_for_key(&self, logical: &str) -> Option<u32> {
        let sanitized = Self::sanitize(logical);
        let group = Self::group_of(&sanitized)?;
        self.epochs.get(group).copied()
    }

    /// Map every character outside `[a-z0-9._-]` to `_` and lowercase the
    /// rest. Every physical key passes through this exactly once.
    pub fn sanitize(key: &str) -> String {
        key.chars()
            .map(|c| match c {
                'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
                'A'..='Z' => c.to_ascii_lowercase(),
                _ => '_',
            })
            .collect()
    }

    /// Group of a sanitized key: the text before the first `.`, or `None`
    /// when the key is ungrouped.
    fn group_of(sanitized: &str) -> Option<&str> {
        sanitized.split_once('.').map(|(group, _)| group)
    }

    /// Derive the backend-visible key for a logical key.
    ///
    /// With `use_stale_epoch` the group's previous epoch
    /// (`max(0, epoch - 1)`) is substituted; only the stale-shadow read
    /// path asks for that.
    pub fn physical_key(&self, logical: &str, use_stale_epoch: bool) -> String {
        let sanitized = Self::sanitize(logical);

        if let Some(group) = Self::group_of(&sanitized) {
            if let Some(epoch) = self.epochs.get(group) {
                let epoch = if use_stale_epoch {
                    epoch.saturating_sub(1)
                } else {
                    *epoch
                };
                return format!("{}{}_{}_{}", self.prefix, group, epoch, sanitized);
            }
        }

        format!("{}{}", self.prefix, sanitized)
    }

    /// Derive the physical key a logical key had under an explicit epoch.
    /// `None` for ungrouped keys, which carry no epoch at all.
    pub fn physical_key_at(&self, logical: &str, epoch: u32) -> Option<String> {
        let sanitized = Self::sanitize(logical);
        let group = Self::group_of(&sanitized)?;

        if !self.epochs.contains_key(group) {
            return None;
        }

        Some(format!("{}{}_{}_{}", self.prefix, group, epoch, sanitized))
    }

    /// Advance a group's epoch, wrapping past `EPOCH_LIMIT - 1`. Returns
    /// whether the group was tracked; unknown groups are a silent no-op.
    pub fn bump_group(&mut self, group: &str) -> bool {
        match self.epochs.get_mut(&Self::sanitize(group)) {
            Some(epoch) => {
                *epoch = (*epoch + 1) % EPOCH_LIMIT;
                true
            }
            None => false,
        }
    }

    /// Replace epochs with persisted values for the groups this scheme
    /// tracks. Groups added to the configuration since the table was
    /// persisted keep their fresh zero epoch.
    pub fn restore(&mut self, persisted: &Value) {
        let Some(table) = persisted.as_object() else {
            return;
        };

        for (group, epoch) in table {
            if let (Some(slot), Some(epoch)) =
                (self.epochs.get_mut(group.as_str()), epoch.as_u64())
            {
                *slot = (epoch as u32) % EPOCH_LIMIT;
            }
        }
    }

    /// The epoch table as the JSON object persisted under the meta-key.
    pub fn snapshot(&self) -> Value {
        Value::Object(
            self.epochs
                .iter()
                .map(|(group, epoch)| (group.clone(), Value::from(*epoch)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> KeyScheme {
        KeyScheme::new("app_", &["Posts".to_string(), "Session".to_string()])
    }

    #[test]
    fn test_sanitize_replaces_invalid_chars() {
        assert_eq!(KeyScheme::sanitize("Posts.p/1 x"), "posts.p_1_x");
        assert_eq!(KeyScheme::sanitize("ok-key_1.a"), "ok-key_1.a");
        assert_eq!(KeyScheme::sanitize("Ação!"), "a__o_");
    }

    #[test]
    fn test_grouped_key_embeds_epoch() {
        let keys = scheme();
        assert_eq!(keys.physical_key("Posts.p1", false), "app_posts_0_posts.p1");
    }

    #[test]
    fn test_ungrouped_key_is_prefix_plus_sanitized() {
        let keys = scheme();
        assert_eq!(keys.physical_key("Comments.c1", false), "app_comments.c1");
        assert_eq!(keys.physical_key("plainkey", false), "app_plainkey");
    }

    #[test]
    fn test_stale_epoch_is_previous_and_clamped() {
        let mut keys = scheme();
        // At epoch zero the previous epoch clamps to zero.
        assert_eq!(keys.physical_key("Posts.p1", true), "app_posts_0_posts.p1");

        keys.bump_group("Posts");
        assert_eq!(keys.physical_key("Posts.p1", false), "app_posts_1_posts.p1");
        assert_eq!(keys.physical_key("Posts.p1", true), "app_posts_0_posts.p1");
    }

    #[test]
    fn test_bump_wraps_at_limit() {
        let mut keys = scheme();
        for _ in 0..999 {
            keys.bump_group("Posts");
        }
        assert_eq!(keys.epoch("Posts"), Some(999));
        keys.bump_group("Posts");
        assert_eq!(keys.epoch("Posts"), Some(0));
    }

    #[test]
    fn test_bump_unknown_group_is_noop() {
        let mut keys = scheme();
        assert!(!keys.bump_group("Nope"));
        assert_eq!(keys.physical_key("Nope.k", false), "app_nope.k");
    }

    #[test]
    fn test_group_names_match_case_insensitively() {
        let mut keys = scheme();
        assert!(keys.bump_group("POSTS"));
        assert_eq!(keys.epoch("posts"), Some(1));
    }

    #[test]
    fn test_group_names_are_sanitized_like_keys() {
        let mut keys = KeyScheme::new("app_", &["Blog Posts".to_string()]);
        assert!(keys.bump_group("Blog Posts"));
        assert_eq!(keys.epoch("blog_posts"), Some(1));
        assert_eq!(
            keys.physical_key("Blog Posts.p1", false),
            "app_blog_posts_1_blog_posts.p1"
        );
        assert_eq!(keys.epoch_for_key("Blog Posts.p1"), Some(1));
        assert_eq!(keys.epoch_for_key("Comments.c1"), None);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut keys = scheme();
        keys.bump_group("Posts");
        keys.bump_group("Posts");

        let mut restored = scheme();
        restored.restore(&keys.snapshot());
        assert_eq!(restored.epoch("Posts"), Some(2));
        assert_eq!(restored.epoch("Session"), Some(0));
    }

    #[test]
    fn test_restore_ignores_untracked_groups() {
        let mut keys = scheme();
        keys.restore(&serde_json::json!({ "ghosts": 7, "posts": 3 }));
        assert_eq!(keys.epoch("Posts"), Some(3));
        assert_eq!(keys.epoch("ghosts"), None);
    }

    #[test]
    fn test_physical_key_at_explicit_epoch() {
        let keys = scheme();
        assert_eq!(
            keys.physical_key_at("Posts.p1", 7).as_deref(),
            Some("app_posts_7_posts.p1")
        );
        assert_eq!(keys.physical_key_at("nogroup", 7), None);
    }

    #[test]
    fn test_meta_key_is_prefixed() {
        assert_eq!(scheme().meta_key(), "app_CacheComponentGroups");
    }
}
