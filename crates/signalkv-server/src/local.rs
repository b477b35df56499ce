//! Lookup over the process-local cache
//!
//! Serves the shard this process owns. Missing keys become per-key
//! `NotFound` statuses (an empty set is a miss too, matching the set-query
//! semantics where absence and emptiness are indistinguishable).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use signalkv_core::messages::{
    codes, InternalLookupResponse, InternalRunQueryResponse, InternalRunSetQueryUint32Response,
    RequestContext, SingleLookupResult,
};
use signalkv_core::query;
use signalkv_core::{Error, KeyValueCache, Metrics};

use crate::Lookup;

pub struct LocalLookup {
    cache: Arc<KeyValueCache>,
    metrics: Arc<Metrics>,
    enable_set_queries: bool,
}

impl LocalLookup {
    pub fn new(cache: Arc<KeyValueCache>, metrics: Arc<Metrics>) -> Self {
        Self {
            cache,
            metrics,
            enable_set_queries: true,
        }
    }

    pub fn with_set_queries_enabled(mut self, enabled: bool) -> Self {
        self.enable_set_queries = enabled;
        self
    }

    fn not_found(key: &str) -> SingleLookupResult {
        SingleLookupResult::status(codes::NOT_FOUND, format!("Key not found: {key}"))
    }

    fn check_query_enabled(&self) -> Result<(), Error> {
        if self.enable_set_queries {
            Ok(())
        } else {
            Err(Error::InvalidArgument(
                "set queries are disabled on this server".to_string(),
            ))
        }
    }
}

#[async_trait]
impl Lookup for LocalLookup {
    async fn get_key_values(
        &self,
        _ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        let mut response = InternalLookupResponse::default();
        if keys.is_empty() {
            return Ok(response);
        }
        let mut kv_pairs = self.cache.get_key_values(keys.iter().map(String::as_str));
        for key in keys {
            let result = match kv_pairs.remove(key) {
                Some(value) => SingleLookupResult::value(value),
                None => Self::not_found(key),
            };
            response.kv_pairs.insert(key.clone(), result);
        }
        Ok(response)
    }

    async fn get_key_value_sets(
        &self,
        _ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        let mut response = InternalLookupResponse::default();
        if keys.is_empty() {
            return Ok(response);
        }
        let mut key_sets = self
            .cache
            .get_key_value_sets(keys.iter().map(String::as_str));
        for key in keys {
            let result = match key_sets.remove(key).filter(|set| !set.is_empty()) {
                Some(set) => SingleLookupResult::keyset_values(set),
                None => {
                    Metrics::incr(&self.metrics.keyset_not_found);
                    Self::not_found(key)
                }
            };
            response.kv_pairs.insert(key.clone(), result);
        }
        Ok(response)
    }

    async fn get_uint32_value_sets(
        &self,
        _ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error> {
        let mut response = InternalLookupResponse::default();
        if keys.is_empty() {
            return Ok(response);
        }
        let mut key_sets = self
            .cache
            .get_uint32_value_sets(keys.iter().map(String::as_str));
        for key in keys {
            let result = match key_sets.remove(key).filter(|set| !set.is_empty()) {
                Some(set) => SingleLookupResult::uintset_values(set),
                None => {
                    Metrics::incr(&self.metrics.keyset_not_found);
                    Self::not_found(key)
                }
            };
            response.kv_pairs.insert(key.clone(), result);
        }
        Ok(response)
    }

    async fn run_query(
        &self,
        _ctx: &RequestContext,
        query: &str,
    ) -> Result<InternalRunQueryResponse, Error> {
        self.check_query_enabled()?;
        let mut response = InternalRunQueryResponse::default();
        if query.is_empty() {
            Metrics::incr(&self.metrics.empty_query);
            return Ok(response);
        }
        let ast = query::parse(query).inspect_err(|_| {
            Metrics::incr(&self.metrics.query_parse_failure);
        })?;
        let key_sets = self
            .cache
            .get_key_value_sets(ast.keys().into_iter());
        let result = query::eval(&ast, |name| match key_sets.get(name) {
            Some(set) => set.clone(),
            None => {
                Metrics::incr(&self.metrics.missing_key_set);
                HashSet::new()
            }
        });
        response.elements = result.into_iter().collect();
        Ok(response)
    }

    async fn run_set_query_uint32(
        &self,
        _ctx: &RequestContext,
        query: &str,
    ) -> Result<InternalRunSetQueryUint32Response, Error> {
        self.check_query_enabled()?;
        let mut response = InternalRunSetQueryUint32Response::default();
        if query.is_empty() {
            Metrics::incr(&self.metrics.empty_query);
            return Ok(response);
        }
        let ast = query::parse(query).inspect_err(|_| {
            Metrics::incr(&self.metrics.query_parse_failure);
        })?;
        let key_sets = self
            .cache
            .get_uint32_value_sets(ast.keys().into_iter());
        let result = query::eval(&ast, |name| match key_sets.get(name) {
            Some(set) => set.clone(),
            None => {
                Metrics::incr(&self.metrics.missing_key_set);
                HashSet::new()
            }
        });
        response.elements = result.into_iter().collect();
        Ok(response)
    }
}
