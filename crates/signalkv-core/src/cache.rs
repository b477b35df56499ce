//! In-memory key-value cache with logical commit-time gating
//!
//! The cache maps keys to tagged values (a single string, a string set, or a
//! u32 set), each stamped with the 64-bit logical commit time of the
//! mutation that produced it. Mutations with a commit time not strictly
//! greater than the stored one are no-ops, which makes replayed or
//! out-of-order update streams safe to apply.
//!
//! Deletes leave a tombstone carrying their commit time so a late update
//! with an older time cannot resurrect the key. `remove_deleted_keys`
//! garbage-collects tombstones up to a cutoff and raises a watermark below
//! which all mutations are ignored.
//!
//! Readers and writers coexist under a reader-writer lock; lookups never
//! fail, absent keys are simply missing from the returned map.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

/// A cached value, tagged with its variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Value(String),
    StringSet(HashSet<String>),
    UintSet(HashSet<u32>),
}

#[derive(Debug)]
struct CacheEntry {
    /// `None` marks a tombstone left behind by a delete.
    value: Option<CacheValue>,
    last_logical_commit_time: i64,
}

#[derive(Debug, Default)]
struct CacheState {
    map: HashMap<String, CacheEntry>,
    /// Tombstoned keys ordered by commit time, for cleanup.
    deleted_nodes: BTreeMap<i64, Vec<String>>,
    /// Mutations at or below this commit time are ignored.
    max_cleanup_logical_commit_time: i64,
}

/// Thread-safe in-memory cache for one shard's slice of the key space.
#[derive(Debug, Default)]
pub struct KeyValueCache {
    state: RwLock<CacheState>,
}

impl KeyValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-value reads. Keys that are absent, deleted, or hold a set
    /// variant are missing from the returned map.
    pub fn get_key_values<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, String> {
        let state = self.state.read().expect("cache lock poisoned");
        let mut kv_pairs = HashMap::new();
        for key in keys {
            if let Some(CacheValue::Value(value)) = state.map.get(key).and_then(|e| e.value.as_ref())
            {
                kv_pairs.insert(key.to_string(), value.clone());
            }
        }
        kv_pairs
    }

    /// String-set reads, same missing-is-absent contract.
    pub fn get_key_value_sets<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, HashSet<String>> {
        let state = self.state.read().expect("cache lock poisoned");
        let mut key_sets = HashMap::new();
        for key in keys {
            if let Some(CacheValue::StringSet(set)) =
                state.map.get(key).and_then(|e| e.value.as_ref())
            {
                key_sets.insert(key.to_string(), set.clone());
            }
        }
        key_sets
    }

    /// u32-set reads, same missing-is-absent contract.
    pub fn get_uint32_value_sets<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, HashSet<u32>> {
        let state = self.state.read().expect("cache lock poisoned");
        let mut key_sets = HashMap::new();
        for key in keys {
            if let Some(CacheValue::UintSet(set)) =
                state.map.get(key).and_then(|e| e.value.as_ref())
            {
                key_sets.insert(key.to_string(), set.clone());
            }
        }
        key_sets
    }

    /// Insert or replace `key` unless a mutation with an equal or newer
    /// commit time has already been applied.
    pub fn update(&self, key: &str, value: CacheValue, logical_commit_time: i64) {
        let mut state = self.state.write().expect("cache lock poisoned");
        if logical_commit_time <= state.max_cleanup_logical_commit_time {
            return;
        }
        let prior = state
            .map
            .get(key)
            .map(|entry| (entry.last_logical_commit_time, entry.value.is_none()));
        if let Some((prior_time, is_tombstone)) = prior {
            if prior_time >= logical_commit_time {
                return;
            }
            if is_tombstone {
                // Overwriting a tombstone; drop its cleanup record.
                if let Some(keys) = state.deleted_nodes.get_mut(&prior_time) {
                    keys.retain(|k| k != key);
                    if keys.is_empty() {
                        state.deleted_nodes.remove(&prior_time);
                    }
                }
            }
        }
        state.map.insert(
            key.to_string(),
            CacheEntry {
                value: Some(value),
                last_logical_commit_time: logical_commit_time,
            },
        );
    }

    /// Tombstone `key` unless a mutation with an equal or newer commit time
    /// has already been applied. Deleting an unknown key is a no-op.
    pub fn delete(&self, key: &str, logical_commit_time: i64) {
        let mut state = self.state.write().expect("cache lock poisoned");
        if logical_commit_time <= state.max_cleanup_logical_commit_time {
            return;
        }
        let Some(prior_time) = state.map.get(key).map(|e| e.last_logical_commit_time) else {
            return;
        };
        if prior_time >= logical_commit_time {
            return;
        }
        state.map.insert(
            key.to_string(),
            CacheEntry {
                value: None,
                last_logical_commit_time: logical_commit_time,
            },
        );
        state
            .deleted_nodes
            .entry(logical_commit_time)
            .or_default()
            .push(key.to_string());
    }

    /// Drop tombstones with commit time <= `logical_commit_time` and raise
    /// the cleanup watermark to it.
    pub fn remove_deleted_keys(&self, logical_commit_time: i64) {
        let mut state = self.state.write().expect("cache lock poisoned");
        let remaining = state.deleted_nodes.split_off(&(logical_commit_time + 1));
        let expired = std::mem::replace(&mut state.deleted_nodes, remaining);
        for (_, keys) in expired {
            for key in keys {
                if let Some(entry) = state.map.get(&key) {
                    if entry.value.is_none()
                        && entry.last_logical_commit_time <= logical_commit_time
                    {
                        state.map.remove(&key);
                    }
                }
            }
        }
        state.max_cleanup_logical_commit_time =
            state.max_cleanup_logical_commit_time.max(logical_commit_time);
    }

    /// Number of live (non-tombstoned) entries.
    pub fn len(&self) -> usize {
        let state = self.state.read().expect("cache lock poisoned");
        state.map.values().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_set(values: &[&str]) -> CacheValue {
        CacheValue::StringSet(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_get_key_values_missing_is_absent() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("value1".into()), 1);
        let kv_pairs = cache.get_key_values(["key1", "key2"]);
        assert_eq!(kv_pairs.get("key1").unwrap(), "value1");
        assert!(!kv_pairs.contains_key("key2"));
    }

    #[test]
    fn test_variant_mismatch_is_absent() {
        let cache = KeyValueCache::new();
        cache.update("set1", string_set(&["a", "b"]), 1);
        assert!(cache.get_key_values(["set1"]).is_empty());
        assert_eq!(cache.get_key_value_sets(["set1"]).len(), 1);
        assert!(cache.get_uint32_value_sets(["set1"]).is_empty());
    }

    #[test]
    fn test_uint32_sets() {
        let cache = KeyValueCache::new();
        cache.update("bits", CacheValue::UintSet([1, 2, 3].into_iter().collect()), 1);
        let sets = cache.get_uint32_value_sets(["bits"]);
        assert_eq!(sets["bits"], [1, 2, 3].into_iter().collect());
    }

    #[test]
    fn test_update_is_gated_by_commit_time() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("new".into()), 5);
        cache.update("key1", CacheValue::Value("stale".into()), 5);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "new");
        cache.update("key1", CacheValue::Value("older".into()), 4);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "new");
        cache.update("key1", CacheValue::Value("newer".into()), 6);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "newer");
    }

    #[test]
    fn test_update_is_idempotent() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("v".into()), 3);
        cache.update("key1", CacheValue::Value("v".into()), 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "v");
    }

    #[test]
    fn test_delete_tombstones_and_blocks_stale_updates() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("v".into()), 1);
        cache.delete("key1", 3);
        assert!(cache.get_key_values(["key1"]).is_empty());
        // A late update from before the delete must not resurrect the key.
        cache.update("key1", CacheValue::Value("late".into()), 2);
        assert!(cache.get_key_values(["key1"]).is_empty());
        // A genuinely newer update wins.
        cache.update("key1", CacheValue::Value("fresh".into()), 4);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "fresh");
    }

    #[test]
    fn test_delete_of_unknown_key_is_noop() {
        let cache = KeyValueCache::new();
        cache.delete("ghost", 10);
        assert!(cache.is_empty());
        // The no-op delete left no tombstone, so an older update applies.
        cache.update("ghost", CacheValue::Value("v".into()), 5);
        assert_eq!(cache.get_key_values(["ghost"]).len(), 1);
    }

    #[test]
    fn test_delete_is_gated_by_commit_time() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("v".into()), 5);
        cache.delete("key1", 5);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "v");
        cache.delete("key1", 6);
        assert!(cache.get_key_values(["key1"]).is_empty());
    }

    #[test]
    fn test_remove_deleted_keys_sets_watermark() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("v".into()), 1);
        cache.delete("key1", 2);
        cache.remove_deleted_keys(2);
        // Tombstone is gone, and mutations at or below the watermark are
        // ignored entirely.
        cache.update("key1", CacheValue::Value("stale".into()), 2);
        assert!(cache.get_key_values(["key1"]).is_empty());
        cache.update("key1", CacheValue::Value("fresh".into()), 3);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "fresh");
    }

    #[test]
    fn test_update_over_tombstone_clears_cleanup_record() {
        let cache = KeyValueCache::new();
        cache.update("key1", CacheValue::Value("v".into()), 1);
        cache.delete("key1", 2);
        cache.update("key1", CacheValue::Value("back".into()), 3);
        // Cleanup up to the delete time must not drop the resurrected key.
        cache.remove_deleted_keys(2);
        assert_eq!(cache.get_key_values(["key1"])["key1"], "back");
    }
}
