//! Sharded lookup engine
//!
//! Fans a lookup out across all shards and merges the partial answers:
//!
//! 1. bucket the keys by shard
//! 2. serialize one sub-request per shard (every shard gets one, empty
//!    buckets included, so the fan-out shape itself leaks nothing)
//! 3. pad every sub-request to the longest one's length
//! 4. dispatch: the engine's own shard reads the local cache, every other
//!    shard goes through its remote client, all concurrently and
//!    deadline-bounded
//! 5. join all tasks, then aggregate: a failed shard marks the keys that
//!    were assigned to it, it never fails the merge
//!
//! The one request-level failure is a shard with no reachable replica,
//! detected before anything is dispatched.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use prost::Message;

use signalkv_client::RemoteLookupClient;
use signalkv_core::messages::{
    codes, single_lookup_result::Variant, InternalLookupRequest, InternalLookupResponse,
    InternalRunQueryResponse, InternalRunSetQueryUint32Response, RequestContext,
    SingleLookupResult,
};
use signalkv_core::{query, Error, KeySharder, Metrics};

use crate::lookup::Lookup;
use crate::shard_manager::ShardManager;

const DATA_LOOKUP_FAILED: &str = "Data lookup failed";

/// Keys assigned to one shard plus the serialized sub-request and the
/// padding that equalizes it with its siblings.
#[derive(Debug, Default, Clone)]
struct ShardLookupInput {
    keys: Vec<String>,
    serialized_request: Vec<u8>,
    padding: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupVariant {
    Value,
    StringSet,
    UintSet,
}

/// Set element types the engine can collect across shards; monomorphizes
/// the string-set and u32-set fan-out paths.
trait SetElement: Eq + Hash + Sized {
    const VARIANT: LookupVariant;
    fn extract(result: SingleLookupResult) -> Option<Vec<Self>>;
    fn into_result(values: HashSet<Self>) -> SingleLookupResult;
}

impl SetElement for String {
    const VARIANT: LookupVariant = LookupVariant::StringSet;

    fn extract(result: SingleLookupResult) -> Option<Vec<Self>> {
        match result.variant {
            Some(Variant::KeysetValues(keyset)) => Some(keyset.values),
            _ => None,
        }
    }

    fn into_result(values: HashSet<Self>) -> SingleLookupResult {
        SingleLookupResult::keyset_values(values)
    }
}

impl SetElement for u32 {
    const VARIANT: LookupVariant = LookupVariant::UintSet;

    fn extract(result: SingleLookupResult) -> Option<Vec<Self>> {
        match result.variant {
            Some(Variant::UintsetValues(uintset)) => Some(uintset.values),
            _ => None,
        }
    }

    fn into_result(values: HashSet<Self>) -> SingleLookupResult {
        SingleLookupResult::uintset_values(values)
    }
}

pub struct ShardedLookup {
    local_lookup: Arc<dyn Lookup>,
    num_shards: usize,
    current_shard_num: usize,
    shard_manager: Arc<ShardManager>,
    key_sharder: KeySharder,
    metrics: Arc<Metrics>,
    remote_deadline: Duration,
}

impl ShardedLookup {
    pub fn new(
        local_lookup: Arc<dyn Lookup>,
        num_shards: usize,
        current_shard_num: usize,
        shard_manager: Arc<ShardManager>,
        key_sharder: KeySharder,
        metrics: Arc<Metrics>,
        remote_deadline: Duration,
    ) -> Result<Self, Error> {
        if num_shards <= 1 {
            return Err(Error::InvalidArgument(
                "num_shards for a sharded lookup must be > 1".to_string(),
            ));
        }
        if current_shard_num >= num_shards {
            return Err(Error::InvalidArgument(format!(
                "current_shard_num {current_shard_num} out of range for {num_shards} shards"
            )));
        }
        Ok(Self {
            local_lookup,
            num_shards,
            current_shard_num,
            shard_manager,
            key_sharder,
            metrics,
            remote_deadline,
        })
    }

    fn bucket_keys(&self, keys: &HashSet<String>) -> Vec<ShardLookupInput> {
        let mut lookup_inputs = vec![ShardLookupInput::default(); self.num_shards];
        for key in keys {
            let assignment = self.key_sharder.shard_of(key, self.num_shards);
            tracing::trace!(
                shard_num = assignment.shard_num,
                sharding_key = %assignment.sharding_key,
                "Bucketed key"
            );
            lookup_inputs[assignment.shard_num].keys.push(key.clone());
        }
        lookup_inputs
    }

    /// Bucket, serialize, and pad: after this every input's
    /// `serialized_request.len() + padding` is the same.
    fn shard_keys(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
        lookup_sets: bool,
    ) -> Vec<ShardLookupInput> {
        let mut lookup_inputs = self.bucket_keys(keys);
        for input in &mut lookup_inputs {
            let request = InternalLookupRequest::new(input.keys.clone(), lookup_sets, ctx);
            input.serialized_request = request.encode_to_vec();
        }
        let max_length = lookup_inputs
            .iter()
            .map(|input| input.serialized_request.len())
            .max()
            .unwrap_or(0);
        for input in &mut lookup_inputs {
            input.padding = max_length - input.serialized_request.len();
        }
        lookup_inputs
    }

    /// Dispatch one task per shard and join them all. Fails only when a
    /// shard has no reachable client; per-shard errors are returned in
    /// place so the caller can mark that shard's keys.
    async fn fan_out(
        &self,
        ctx: &RequestContext,
        inputs: &[ShardLookupInput],
        variant: LookupVariant,
    ) -> Result<Vec<Result<InternalLookupResponse, Error>>, Error> {
        // Resolve every remote client before dispatching anything, so an
        // unreachable shard fails the request with no work in flight.
        let mut clients: Vec<Option<Arc<dyn RemoteLookupClient>>> =
            Vec::with_capacity(self.num_shards);
        for shard_num in 0..self.num_shards {
            if shard_num == self.current_shard_num {
                clients.push(None);
            } else {
                match self.shard_manager.get(shard_num) {
                    Some(client) => clients.push(Some(client)),
                    None => {
                        Metrics::incr(&self.metrics.lookup_client_missing);
                        return Err(Error::LookupClientMissing);
                    }
                }
            }
        }

        let mut handles = Vec::with_capacity(self.num_shards);
        for (shard_num, input) in inputs.iter().enumerate() {
            self.metrics
                .add_keys_for_shard(shard_num, input.keys.len() as u64);
            if shard_num == self.current_shard_num {
                let local = self.local_lookup.clone();
                let ctx = ctx.clone();
                let keys: HashSet<String> = input.keys.iter().cloned().collect();
                handles.push(tokio::spawn(async move {
                    if keys.is_empty() {
                        return Ok(InternalLookupResponse::default());
                    }
                    match variant {
                        LookupVariant::Value => local.get_key_values(&ctx, &keys).await,
                        LookupVariant::StringSet => local.get_key_value_sets(&ctx, &keys).await,
                        LookupVariant::UintSet => local.get_uint32_value_sets(&ctx, &keys).await,
                    }
                }));
            } else {
                let client = clients[shard_num].take().expect("resolved above");
                let serialized_request = input.serialized_request.clone();
                let padding = input.padding;
                let deadline = self.remote_deadline;
                handles.push(tokio::spawn(async move {
                    match tokio::time::timeout(
                        deadline,
                        client.get_values(&serialized_request, padding),
                    )
                    .await
                    {
                        Ok(Ok(response)) => Ok(response),
                        Ok(Err(e)) => Err(Error::ShardFailure(e.to_string())),
                        Err(_) => Err(Error::ShardFailure("deadline exceeded".to_string())),
                    }
                }));
            }
        }

        let joined = join_all(handles).await;
        Ok(joined
            .into_iter()
            .map(|join_result| match join_result {
                Ok(result) => result,
                Err(e) => Err(Error::ShardFailure(format!("shard task failed: {e}"))),
            })
            .collect())
    }

    /// Merge one shard's successful reply into the aggregate, filling a
    /// bare `NotFound` for any assigned key the shard did not report.
    fn update_response(
        key_list: &[String],
        mut shard_response: InternalLookupResponse,
        response: &mut InternalLookupResponse,
    ) {
        for key in key_list {
            let result = shard_response
                .kv_pairs
                .remove(key)
                .unwrap_or_else(|| SingleLookupResult::status(codes::NOT_FOUND, ""));
            response.kv_pairs.insert(key.clone(), result);
        }
    }

    /// Mark every key assigned to a failed shard.
    fn set_request_failed(key_list: &[String], response: &mut InternalLookupResponse) {
        for key in key_list {
            response.kv_pairs.insert(
                key.clone(),
                SingleLookupResult::status(codes::INTERNAL, DATA_LOOKUP_FAILED),
            );
        }
    }

    /// Merge set-valued results from one shard. A key reported by two
    /// shards is a data-placement bug; it is counted and logged, and the
    /// later shard wins.
    fn collect_key_sets<T: SetElement>(
        &self,
        key_sets: &mut HashMap<String, HashSet<T>>,
        shard_response: InternalLookupResponse,
    ) {
        for (key, result) in shard_response.kv_pairs {
            let Some(values) = T::extract(result) else {
                continue;
            };
            if values.is_empty() {
                continue;
            }
            if key_sets
                .insert(key.clone(), values.into_iter().collect())
                .is_some()
            {
                Metrics::incr(&self.metrics.key_collision);
                tracing::error!(%key, "Key collision when collecting results from shards");
            }
        }
    }

    /// Fetch the sets for `keys` across all shards. Returns the collected
    /// sets plus the keys whose shard failed.
    async fn sharded_key_sets<T: SetElement>(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<(HashMap<String, HashSet<T>>, Vec<String>), Error> {
        let inputs = self.shard_keys(ctx, keys, true);
        let results = self.fan_out(ctx, &inputs, T::VARIANT).await?;
        let mut key_sets = HashMap::new();
        let mut failed_keys = Vec::new();
        for (input, result) in inputs.iter().zip(results) {
            match result {
                Ok(shard_response) => self.collect_key_sets::<T>(&mut key_sets, shard_response),
                Err(e) => {
                    Metrics::incr(&self.metrics.shard_failure);
                    tracing::error!(error = %e, "Sharded key-set lookup failed for one shard");
                    failed_keys.extend(input.keys.iter().cloned());
                }
            }
        }
        Ok((key_sets, failed_keys))
    }

    async fn get_key_value_sets_impl<T: SetElement>(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        let mut response = InternalLookupResponse::default();
        if keys.is_empty() {
            return Ok(response);
        }
        let (mut key_sets, failed_keys) = self.sharded_key_sets::<T>(ctx, keys).await?;
        for key in failed_keys {
            response.kv_pairs.insert(
                key,
                SingleLookupResult::status(codes::INTERNAL, DATA_LOOKUP_FAILED),
            );
        }
        for key in keys {
            if response.kv_pairs.contains_key(key) {
                continue;
            }
            let result = match key_sets.remove(key) {
                Some(values) => T::into_result(values),
                None => {
                    Metrics::incr(&self.metrics.keyset_not_found);
                    SingleLookupResult::status(codes::NOT_FOUND, "")
                }
            };
            response.kv_pairs.insert(key.clone(), result);
        }
        Ok(response)
    }
}

#[async_trait]
impl Lookup for ShardedLookup {
    async fn get_key_values(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        let mut response = InternalLookupResponse::default();
        if keys.is_empty() {
            return Ok(response);
        }
        let inputs = self.shard_keys(ctx, keys, false);
        let results = self.fan_out(ctx, &inputs, LookupVariant::Value).await?;
        for (input, result) in inputs.iter().zip(results) {
            match result {
                Ok(shard_response) => {
                    Self::update_response(&input.keys, shard_response, &mut response);
                }
                Err(e) => {
                    Metrics::incr(&self.metrics.shard_failure);
                    tracing::error!(error = %e, "Sharded lookup failed for one shard");
                    Self::set_request_failed(&input.keys, &mut response);
                }
            }
        }
        Ok(response)
    }

    async fn get_key_value_sets(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        self.get_key_value_sets_impl::<String>(ctx, keys).await
    }

    async fn get_uint32_value_sets(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        self.get_key_value_sets_impl::<u32>(ctx, keys).await
    }

    async fn run_query(
        &self,
        ctx: &RequestContext,
        query_text: &str,
    ) -> Result<InternalRunQueryResponse, Error> {
        let mut response = InternalRunQueryResponse::default();
        if query_text.is_empty() {
            Metrics::incr(&self.metrics.empty_query);
            return Ok(response);
        }
        let ast = query::parse(query_text).inspect_err(|_| {
            Metrics::incr(&self.metrics.query_parse_failure);
        })?;
        let key_names: HashSet<String> = ast.keys().into_iter().map(String::from).collect();
        let (key_sets, failed_keys) = self.sharded_key_sets::<String>(ctx, &key_names).await?;
        if !failed_keys.is_empty() {
            // Evaluating against a partially fetched universe would produce
            // a silently wrong result set.
            return Err(Error::ShardFailure("key set retrieval failed".to_string()));
        }
        let result = query::eval(&ast, |name| match key_sets.get(name) {
            Some(set) => set.clone(),
            None => {
                Metrics::incr(&self.metrics.missing_key_set);
                tracing::debug!(key_set = %name, "Key set not found, substituting empty set");
                HashSet::new()
            }
        });
        response.elements = result.into_iter().collect();
        Ok(response)
    }

    async fn run_set_query_uint32(
        &self,
        _ctx: &RequestContext,
        _query: &str,
    ) -> Result<InternalRunSetQueryUint32Response, Error> {
        Err(Error::Unimplemented(
            "set query over uint32 sets is not implemented for sharded lookups".to_string(),
        ))
    }
}
