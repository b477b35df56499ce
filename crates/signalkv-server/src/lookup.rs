//! The lookup interface served to UDFs
//!
//! Both the local cache reader and the sharded fan-out engine implement
//! this trait, so UDF hooks and the secure lookup endpoint are agnostic to
//! whether the process is running sharded.

use std::collections::HashSet;

use async_trait::async_trait;

use signalkv_core::messages::{
    InternalLookupResponse, InternalRunQueryResponse, InternalRunSetQueryUint32Response,
    RequestContext,
};
use signalkv_core::Error;

#[async_trait]
pub trait Lookup: Send + Sync {
    /// Single-value lookup. Every requested key appears in the response,
    /// as a value or a per-key status.
    async fn get_key_values(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error>;

    /// String-set lookup.
    async fn get_key_value_sets(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error>;

    /// u32-set lookup.
    async fn get_uint32_value_sets(
        &self,
        ctx: &RequestContext,
        keys: &HashSet<String>,
    ) -> Result<InternalLookupResponse, Error>;

    /// Evaluate a set query over string key-sets.
    async fn run_query(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<InternalRunQueryResponse, Error>;

    /// Evaluate a set query over u32 key-sets.
    async fn run_set_query_uint32(
        &self,
        ctx: &RequestContext,
        query: &str,
    ) -> Result<InternalRunSetQueryUint32Response, Error>;
}
