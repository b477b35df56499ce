//! Peer shard client table
//!
//! Holds the remote lookup clients for every shard, with replica selection
//! hidden behind `get`. The table is immutable after construction; a
//! reconfiguration builds a new manager and swaps the `Arc` holding it, so
//! lookups never take a lock.

use std::sync::Arc;

use rand::Rng;

use signalkv_client::RemoteLookupClient;

pub struct ShardManager {
    /// Clients per shard, one per reachable replica. The slot for the
    /// process's own shard is typically empty.
    replicas: Vec<Vec<Arc<dyn RemoteLookupClient>>>,
}

impl ShardManager {
    pub fn new(replicas: Vec<Vec<Arc<dyn RemoteLookupClient>>>) -> Self {
        Self { replicas }
    }

    pub fn num_shards(&self) -> usize {
        self.replicas.len()
    }

    /// A client for `shard_num`, or `None` when the shard has no reachable
    /// replica. Replica choice is random per call.
    pub fn get(&self, shard_num: usize) -> Option<Arc<dyn RemoteLookupClient>> {
        let replicas = self.replicas.get(shard_num)?;
        match replicas.len() {
            0 => None,
            1 => Some(replicas[0].clone()),
            n => Some(replicas[rand::thread_rng().gen_range(0..n)].clone()),
        }
    }
}
