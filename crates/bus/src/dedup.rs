// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event dedup cache (spec §4.3 "Dedup cache").
//!
//! Backed by an [`IndexMap`] so "oldest by insertion" eviction is O(1)
//! amortized: entries are removed from the front once capacity is
//! exceeded, and a hit re-inserts (moving it to the back) to refresh LRU
//! order without a second data structure.

use indexmap::IndexMap;

pub const DEFAULT_CAPACITY: usize = 10_000;
pub const DEFAULT_TTL_MS: i64 = 60_000;

pub struct DedupCache {
    capacity: usize,
    ttl_ms: i64,
    entries: IndexMap<String, i64>,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl_ms: i64) -> Self {
        Self { capacity, ttl_ms, entries: IndexMap::new() }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL_MS)
    }

    /// Returns `true` if `key` was seen within the TTL window as of `now_ms`
    /// (a duplicate). Always touches the key, refreshing it to `now_ms`
    /// whether it was a hit or a miss (spec: "Always touch the key on
    /// consult").
    pub fn check_and_touch(&mut self, key: &str, now_ms: i64) -> bool {
        let is_duplicate = match self.entries.get(key) {
            Some(&last_seen) => now_ms - last_seen < self.ttl_ms,
            None => false,
        };

        // Re-inserting an existing key moves it to the back (most-recent),
        // which is what `shift_remove` + `insert` would do too, but a plain
        // `insert` on an IndexMap already refreshes the value in place
        // without reordering — so do an explicit move-to-back on hit.
        if self.entries.contains_key(key) {
            self.entries.shift_remove(key);
        }
        self.entries.insert(key.to_string(), now_ms);

        self.prune(now_ms);
        self.evict_oldest();

        is_duplicate
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.ttl_ms;
        while let Some((_, &last_seen)) = self.entries.first() {
            if last_seen < cutoff {
                self.entries.shift_remove_index(0);
            } else {
                break;
            }
        }
    }

    fn evict_oldest(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_within_ttl() {
        let mut cache = DedupCache::new(10, 60_000);
        assert!(!cache.check_and_touch("a", 0));
        assert!(cache.check_and_touch("a", 30_000));
    }

    #[test]
    fn hit_outside_ttl_is_a_miss() {
        let mut cache = DedupCache::new(10, 60_000);
        assert!(!cache.check_and_touch("a", 0));
        assert!(!cache.check_and_touch("a", 60_001));
    }

    #[test]
    fn consult_refreshes_key_to_now() {
        let mut cache = DedupCache::new(10, 60_000);
        cache.check_and_touch("a", 0);
        cache.check_and_touch("a", 50_000); // refreshes to 50_000, still a hit
        // Without the refresh this would be a miss at 60_001 (60_001 - 0 >= 60_000).
        assert!(cache.check_and_touch("a", 60_001));
    }

    #[test]
    fn evicts_oldest_by_insertion_over_capacity() {
        let mut cache = DedupCache::new(2, 60_000);
        cache.check_and_touch("a", 0);
        cache.check_and_touch("b", 1);
        cache.check_and_touch("c", 2);
        assert_eq!(cache.len(), 2);
        // "a" was evicted, so a fresh insert reports a miss rather than a hit.
        assert!(!cache.check_and_touch("a", 3));
    }

    #[test]
    fn prunes_stale_entries_before_checking_capacity() {
        let mut cache = DedupCache::new(100, 1_000);
        cache.check_and_touch("a", 0);
        cache.check_and_touch("b", 2_000); // "a" is now stale (age 2000 >= ttl 1000)
        assert_eq!(cache.len(), 1);
    }
}
