//! Privacy-safe lookup metrics
//!
//! Plain process-wide counters; only counts are recorded, never keys or
//! values. Counters are updated with relaxed atomics on the hot path and
//! snapshotted for the debug endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Keys routed to each shard across all fan-outs, indexed by shard.
    keys_by_shard: Vec<AtomicU64>,
    pub empty_query: AtomicU64,
    pub query_parse_failure: AtomicU64,
    pub missing_key_set: AtomicU64,
    pub key_collision: AtomicU64,
    pub keyset_not_found: AtomicU64,
    pub shard_failure: AtomicU64,
    pub lookup_client_missing: AtomicU64,
    pub udf_failure: AtomicU64,
    pub secure_lookup_decryption_error: AtomicU64,
    pub secure_lookup_unpadding_error: AtomicU64,
    pub secure_lookup_deserialization_error: AtomicU64,
    pub secure_lookup_encryption_error: AtomicU64,
}

impl Metrics {
    pub fn new(num_shards: usize) -> Self {
        Self {
            keys_by_shard: (0..num_shards).map(|_| AtomicU64::new(0)).collect(),
            ..Default::default()
        }
    }

    pub fn add_keys_for_shard(&self, shard_num: usize, count: u64) {
        if let Some(counter) = self.keys_by_shard.get(shard_num) {
            counter.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            keys_by_shard: self
                .keys_by_shard
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
            empty_query: self.empty_query.load(Ordering::Relaxed),
            query_parse_failure: self.query_parse_failure.load(Ordering::Relaxed),
            missing_key_set: self.missing_key_set.load(Ordering::Relaxed),
            key_collision: self.key_collision.load(Ordering::Relaxed),
            keyset_not_found: self.keyset_not_found.load(Ordering::Relaxed),
            shard_failure: self.shard_failure.load(Ordering::Relaxed),
            lookup_client_missing: self.lookup_client_missing.load(Ordering::Relaxed),
            udf_failure: self.udf_failure.load(Ordering::Relaxed),
            secure_lookup_decryption_error: self
                .secure_lookup_decryption_error
                .load(Ordering::Relaxed),
            secure_lookup_unpadding_error: self
                .secure_lookup_unpadding_error
                .load(Ordering::Relaxed),
            secure_lookup_deserialization_error: self
                .secure_lookup_deserialization_error
                .load(Ordering::Relaxed),
            secure_lookup_encryption_error: self
                .secure_lookup_encryption_error
                .load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub keys_by_shard: Vec<u64>,
    pub empty_query: u64,
    pub query_parse_failure: u64,
    pub missing_key_set: u64,
    pub key_collision: u64,
    pub keyset_not_found: u64,
    pub shard_failure: u64,
    pub lookup_client_missing: u64,
    pub udf_failure: u64,
    pub secure_lookup_decryption_error: u64,
    pub secure_lookup_unpadding_error: u64,
    pub secure_lookup_deserialization_error: u64,
    pub secure_lookup_encryption_error: u64,
}
