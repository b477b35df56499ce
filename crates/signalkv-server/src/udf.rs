//! UDF invocation contract and lookup hooks
//!
//! The UDF sandbox itself is an external collaborator; this module pins the
//! invocation contract ([`UdfClient`]) and provides the hooks a UDF calls
//! back through to read key-values and run set queries. The built-in
//! [`LookupUdf`] resolves its arguments directly through the hooks, which
//! is enough for deployments whose UDF is the default pass-through and for
//! exercising the full request path in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use signalkv_core::messages::{single_lookup_result::Variant, RequestContext, UdfArgument};
use signalkv_core::Error;

use crate::lookup::Lookup;

/// Metadata passed to every UDF execution.
#[derive(Debug, Clone, Default)]
pub struct UdfExecutionMetadata {
    pub request_metadata: HashMap<String, String>,
    pub partition_metadata: HashMap<String, String>,
}

/// The UDF sandbox invocation contract: one call per partition, returning
/// the partition's serialized output.
#[async_trait]
pub trait UdfClient: Send + Sync {
    async fn execute_code(
        &self,
        ctx: &RequestContext,
        metadata: UdfExecutionMetadata,
        arguments: &[UdfArgument],
    ) -> Result<String, Error>;
}

/// Lookup callbacks exposed to UDF implementations.
pub struct LookupHooks {
    lookup: Arc<dyn Lookup>,
}

impl LookupHooks {
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        Self { lookup }
    }

    /// Single-value lookup hook. Returns a JSON object mapping every
    /// requested key to `{"value": ...}` or `{"status": {...}}`.
    pub async fn get_values(
        &self,
        ctx: &RequestContext,
        keys: &[String],
    ) -> Result<serde_json::Value, Error> {
        let key_set = keys.iter().cloned().collect();
        let response = self.lookup.get_key_values(ctx, &key_set).await?;
        let mut kv_pairs = serde_json::Map::new();
        for (key, result) in response.kv_pairs {
            let entry = match result.variant {
                Some(Variant::Value(value)) => json!({ "value": value }),
                Some(Variant::Status(status)) => {
                    json!({ "status": { "code": status.code, "message": status.message } })
                }
                _ => json!({}),
            };
            kv_pairs.insert(key, entry);
        }
        Ok(json!({ "kvPairs": kv_pairs }))
    }

    /// Set-query hook. Returns `{"elements": [...]}`.
    pub async fn run_query(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<serde_json::Value, Error> {
        let response = self.lookup.run_query(ctx, query).await?;
        Ok(json!({ "elements": response.elements }))
    }
}

/// Argument tag that marks a key-value lookup argument.
pub const KEYS_TAG: &str = "keys";
/// Argument tag that marks a set-query argument.
pub const RUN_QUERY_TAG: &str = "runQuery";

/// Built-in pass-through UDF: answers each tagged argument with the
/// matching hook and emits one key-group output per argument.
pub struct LookupUdf {
    hooks: LookupHooks,
}

impl LookupUdf {
    pub fn new(lookup: Arc<dyn Lookup>) -> Self {
        Self {
            hooks: LookupHooks::new(lookup),
        }
    }

    fn argument_keys(argument: &UdfArgument) -> Vec<String> {
        match serde_json::from_str::<Vec<String>>(&argument.data) {
            Ok(keys) => keys,
            Err(_) => vec![argument.data.clone()],
        }
    }
}

#[async_trait]
impl UdfClient for LookupUdf {
    async fn execute_code(
        &self,
        ctx: &RequestContext,
        _metadata: UdfExecutionMetadata,
        arguments: &[UdfArgument],
    ) -> Result<String, Error> {
        let mut key_group_outputs = Vec::new();
        for argument in arguments {
            if argument.tags.iter().any(|t| t == RUN_QUERY_TAG) {
                let result = self.hooks.run_query(ctx, argument.data.trim()).await?;
                key_group_outputs.push(json!({ "tags": argument.tags, "output": result }));
            } else if argument.tags.iter().any(|t| t == KEYS_TAG) {
                let keys = Self::argument_keys(argument);
                let result = self.hooks.get_values(ctx, &keys).await?;
                key_group_outputs.push(json!({ "tags": argument.tags, "output": result }));
            } else {
                return Err(Error::UdfExecution(format!(
                    "no handler for argument tags {:?}",
                    argument.tags
                )));
            }
        }
        serde_json::to_string(&json!({ "keyGroupOutputs": key_group_outputs }))
            .map_err(|e| Error::UdfExecution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalkv_core::{CacheValue, KeyValueCache, Metrics};

    use crate::local::LocalLookup;

    fn udf() -> LookupUdf {
        let cache = Arc::new(KeyValueCache::new());
        cache.update("key1", CacheValue::Value("value1".into()), 1);
        cache.update(
            "ad_sets",
            CacheValue::StringSet(["a", "b"].map(String::from).into_iter().collect()),
            1,
        );
        let metrics = Arc::new(Metrics::new(1));
        LookupUdf::new(Arc::new(LocalLookup::new(cache, metrics)))
    }

    fn argument(tags: &[&str], data: &str) -> UdfArgument {
        UdfArgument {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            data: data.to_string(),
        }
    }

    #[tokio::test]
    async fn test_keys_argument() {
        let udf = udf();
        let output = udf
            .execute_code(
                &RequestContext::default(),
                UdfExecutionMetadata::default(),
                &[argument(&["custom", "keys"], r#"["key1","nope"]"#)],
            )
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let kv_pairs = &parsed["keyGroupOutputs"][0]["output"]["kvPairs"];
        assert_eq!(kv_pairs["key1"]["value"], "value1");
        assert_eq!(kv_pairs["nope"]["status"]["code"], 5);
    }

    #[tokio::test]
    async fn test_run_query_argument() {
        let udf = udf();
        let output = udf
            .execute_code(
                &RequestContext::default(),
                UdfExecutionMetadata::default(),
                &[argument(&[RUN_QUERY_TAG], "ad_sets")],
            )
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        let elements = parsed["keyGroupOutputs"][0]["output"]["elements"]
            .as_array()
            .unwrap();
        assert_eq!(elements.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_tags_fail_execution() {
        let udf = udf();
        let err = udf
            .execute_code(
                &RequestContext::default(),
                UdfExecutionMetadata::default(),
                &[argument(&["mystery"], "x")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UdfExecution(_)));
    }
}
