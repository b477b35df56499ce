//! End-to-end fan-out across two real servers
//!
//! Boots two shard servers on ephemeral ports with shared OHTTP key
//! material, then drives shard 0's engine so that its sub-request for
//! shard 1 travels the real path: engine -> remote client -> OHTTP
//! envelope -> secure lookup route -> peer cache.

use std::collections::HashSet;
use std::future::IntoFuture;

use signalkv_core::messages::{codes, RequestContext, SingleLookupResult, UdfArgument};
use signalkv_core::messages::{GetValuesRequest, RequestPartition};
use signalkv_core::ohttp::generate_key_pair;
use signalkv_core::CacheValue;
use signalkv_server::routes::create_router;
use signalkv_server::{AppState, ServerConfig};

struct Cluster {
    shard0: std::sync::Arc<AppState>,
    shard1: std::sync::Arc<AppState>,
}

async fn start_cluster() -> Cluster {
    let (private_key, public_key) = generate_key_pair();
    let private_hex = hex::encode(private_key);
    let public_hex = hex::encode(public_key);

    let listener0 = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listener1 = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url0 = format!("http://{}", listener0.local_addr().unwrap());
    let url1 = format!("http://{}", listener1.local_addr().unwrap());

    let config = |current: usize, addrs: Vec<String>| ServerConfig {
        listen_addr: "127.0.0.1:0".into(),
        num_shards: 2,
        current_shard_num: current,
        shard_addrs: addrs,
        sharding_key_regex: None,
        disable_set_queries: false,
        remote_lookup_deadline_ms: 1000,
        ohttp_key_id: 1,
        ohttp_public_key_hex: Some(public_hex.clone()),
        ohttp_private_key_hex: Some(private_hex.clone()),
    };

    let config0 = config(0, vec!["-".into(), url1.clone()]);
    let config1 = config(1, vec![url0.clone(), "-".into()]);
    config0.validate().unwrap();
    config1.validate().unwrap();

    let shard0 = AppState::from_config(&config0).unwrap();
    let shard1 = AppState::from_config(&config1).unwrap();

    tokio::spawn(axum::serve(listener0, create_router(shard0.clone())).into_future());
    tokio::spawn(axum::serve(listener1, create_router(shard1.clone())).into_future());

    Cluster { shard0, shard1 }
}

fn keys(names: &[&str]) -> HashSet<String> {
    names.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_cross_shard_value_lookup() {
    let cluster = start_cluster().await;
    // With the deployed hash, "key1" belongs to shard 1 and "key4" to
    // shard 0.
    cluster
        .shard1
        .cache
        .update("key1", CacheValue::Value("value1".into()), 1);
    cluster
        .shard0
        .cache
        .update("key4", CacheValue::Value("value4".into()), 1);

    let response = cluster
        .shard0
        .lookup
        .get_key_values(&RequestContext::default(), &keys(&["key1", "key4"]))
        .await
        .unwrap();
    assert_eq!(response.kv_pairs.len(), 2);
    assert_eq!(response.kv_pairs["key1"], SingleLookupResult::value("value1"));
    assert_eq!(response.kv_pairs["key4"], SingleLookupResult::value("value4"));
}

#[tokio::test]
async fn test_cross_shard_miss_is_not_found() {
    let cluster = start_cluster().await;
    cluster
        .shard0
        .cache
        .update("key4", CacheValue::Value("value4".into()), 1);

    let response = cluster
        .shard0
        .lookup
        .get_key_values(&RequestContext::default(), &keys(&["key4", "key5"]))
        .await
        .unwrap();
    assert_eq!(response.kv_pairs["key4"], SingleLookupResult::value("value4"));
    let status = response.kv_pairs["key5"].error_status().unwrap();
    assert_eq!(status.code, codes::NOT_FOUND);
    assert_eq!(status.message, "Key not found: key5");
}

#[tokio::test]
async fn test_cross_shard_set_query() {
    let cluster = start_cluster().await;
    let set = |values: &[&str]| {
        CacheValue::StringSet(values.iter().map(|v| v.to_string()).collect())
    };
    // "A" and "C" hash to shard 0, "B" to shard 1.
    cluster.shard0.cache.update("A", set(&["1", "2", "3"]), 1);
    cluster.shard0.cache.update("C", set(&["3"]), 1);
    cluster.shard1.cache.update("B", set(&["2", "3", "4"]), 1);

    let response = cluster
        .shard0
        .lookup
        .run_query(&RequestContext::default(), "(A & B) - C")
        .await
        .unwrap();
    assert_eq!(response.elements, vec!["2".to_string()]);
}

#[tokio::test]
async fn test_udf_dispatch_over_sharded_lookup() {
    let cluster = start_cluster().await;
    cluster
        .shard1
        .cache
        .update("key1", CacheValue::Value("value1".into()), 1);

    let request = GetValuesRequest {
        partitions: vec![RequestPartition {
            id: 0,
            compression_group_id: 0,
            arguments: vec![UdfArgument {
                tags: vec!["custom".into(), "keys".into()],
                data: "[\"key1\"]".into(),
            }],
            metadata: Default::default(),
        }],
        ..Default::default()
    };
    let response = cluster.shard0.handler.get_values(request).await.unwrap();
    let output = response.single_partition.unwrap().string_output;
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(
        parsed["keyGroupOutputs"][0]["output"]["kvPairs"]["key1"]["value"],
        "value1"
    );
}
