//! Shared server state wiring
//!
//! Builds the whole object graph from a [`ServerConfig`]: cache, metrics,
//! key fetcher, local lookup, the sharded engine when `num_shards > 1`, the
//! built-in UDF, and the request handler.

use std::sync::Arc;
use std::time::Duration;

use signalkv_client::{HttpRemoteLookupClient, RemoteLookupClient};
use signalkv_core::ohttp::KeyFetcher;
use signalkv_core::{KeySharder, KeyValueCache, Metrics};

use crate::config::ServerConfig;
use crate::handler::GetValuesHandler;
use crate::local::LocalLookup;
use crate::lookup::Lookup;
use crate::shard_manager::ShardManager;
use crate::sharded::ShardedLookup;
use crate::udf::{LookupUdf, UdfClient};

pub struct AppState {
    pub handler: GetValuesHandler,
    /// Lookup surface served to UDFs: the sharded engine when sharding is
    /// enabled, the local cache reader otherwise.
    pub lookup: Arc<dyn Lookup>,
    /// Always the local reader; peers fan out to it through the secure
    /// lookup endpoint.
    pub local_lookup: Arc<dyn Lookup>,
    pub cache: Arc<KeyValueCache>,
    pub key_fetcher: Arc<dyn KeyFetcher>,
    pub metrics: Arc<Metrics>,
    pub num_shards: usize,
    pub current_shard_num: usize,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Arc<Self>> {
        let metrics = Arc::new(Metrics::new(config.num_shards));
        let cache = Arc::new(KeyValueCache::new());
        let key_fetcher: Arc<dyn KeyFetcher> = Arc::new(config.key_fetcher()?);

        let local_lookup: Arc<LocalLookup> = Arc::new(
            LocalLookup::new(cache.clone(), metrics.clone())
                .with_set_queries_enabled(!config.disable_set_queries),
        );

        let lookup: Arc<dyn Lookup> = if config.num_shards > 1 {
            let key_sharder = match &config.sharding_key_regex {
                Some(pattern) => KeySharder::with_pattern(pattern)?,
                None => KeySharder::new(),
            };
            let mut replicas: Vec<Vec<Arc<dyn RemoteLookupClient>>> = Vec::new();
            for (shard_num, addresses) in config.shard_replicas().into_iter().enumerate() {
                if shard_num == config.current_shard_num {
                    replicas.push(Vec::new());
                    continue;
                }
                replicas.push(
                    addresses
                        .into_iter()
                        .map(|address| {
                            Arc::new(HttpRemoteLookupClient::new(address, key_fetcher.clone()))
                                as Arc<dyn RemoteLookupClient>
                        })
                        .collect(),
                );
            }
            Arc::new(ShardedLookup::new(
                local_lookup.clone(),
                config.num_shards,
                config.current_shard_num,
                Arc::new(ShardManager::new(replicas)),
                key_sharder,
                metrics.clone(),
                Duration::from_millis(config.remote_lookup_deadline_ms),
            )?)
        } else {
            local_lookup.clone()
        };

        let udf_client: Arc<dyn UdfClient> = Arc::new(LookupUdf::new(lookup.clone()));
        let handler = GetValuesHandler::new(udf_client, key_fetcher.clone(), metrics.clone());

        Ok(Arc::new(Self {
            handler,
            lookup,
            local_lookup,
            cache,
            key_fetcher,
            metrics,
            num_shards: config.num_shards,
            current_shard_num: config.current_shard_num,
        }))
    }
}
