//! Scope key to "next allowed" timestamp map with bounded size.

use std::collections::HashMap;

/// Map from a scope key to the unix-millisecond instant it may act again.
#[derive(Debug, Default)]
pub struct ExpiryMap {
    entries: HashMap<String, u64>,
}

impl ExpiryMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Next allowed instant for `key`, `0` when unknown
    pub fn get(&self, key: &str) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// Record the next allowed instant for `key`
    pub fn set(&mut self, key: &str, next_allowed: u64) {
        self.entries.insert(key.to_string(), next_allowed);
    }

    /// True when `key` is still cooling down at `now`
    pub fn is_blocked(&self, key: &str, now: u64) -> bool {
        now < self.get(key)
    }

    /// Drop entries whose instant passed more than `stale_after_ms` ago
    pub fn prune_stale(&mut self, now: u64, stale_after_ms: u64) {
        self.entries
            .retain(|_, next_allowed| now <= next_allowed.saturating_add(stale_after_ms));
    }

    /// Evict earliest-expiring entries until at most `max` remain
    pub fn trim_by_earliest(&mut self, max: usize) {
        if self.entries.len() <= max {
            return;
        }
        let mut by_expiry: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(key, at)| (*at, key.clone()))
            .collect();
        by_expiry.sort_unstable();
        let excess = self.entries.len() - max;
        for (_, key) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_stale() {
        let mut map = ExpiryMap::new();
        map.set("old", 1_000);
        map.set("fresh", 9_000);
        map.prune_stale(10_000, 5_000);
        assert_eq!(map.get("old"), 0);
        assert_eq!(map.get("fresh"), 9_000);
    }

    #[test]
    fn test_trim_evicts_earliest_first() {
        let mut map = ExpiryMap::new();
        map.set("a", 300);
        map.set("b", 100);
        map.set("c", 200);
        map.trim_by_earliest(2);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("b"), 0);
        assert!(map.is_blocked("a", 250));
        assert!(!map.is_blocked("c", 250));
    }
}
