//! UDF-dispatch request handler
//!
//! Translates a client-visible `GetValuesRequest` into one UDF invocation
//! per partition and composes the outputs into compression groups. Partial
//! failure is the norm: a failed partition is dropped from its group, a
//! group with no surviving partition is dropped from the response, and only
//! a request where every partition failed becomes a request-level error.
//!
//! The same handler also serves the OHTTP-wrapped twin of the API, where
//! the inner request bytes ride inside the envelope.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use futures_util::future::join_all;
use prost::Message;
use serde_json::json;

use signalkv_core::messages::{
    codes, CompressionGroup, GetValuesRequest, GetValuesResponse, LookupStatus, RequestContext,
    RequestPartition, ResponsePartition,
};
use signalkv_core::ohttp::{KeyFetcher, ServerEncryptor};
use signalkv_core::{Error, Metrics};

use crate::udf::{UdfClient, UdfExecutionMetadata};

/// Header that selects the request/response content encoding.
pub const KV_CONTENT_TYPE_HEADER: &str = "kv-content-type";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_PROTO: &str = "application/protobuf";

/// Content type of OHTTP-wrapped responses.
pub const OHTTP_RESPONSE_CONTENT_TYPE: &str = "message/ad-auction-trusted-signals-response";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Proto,
}

impl ContentType {
    /// Resolve the encoding from the `kv-content-type` header; JSON is the
    /// default.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers.get(KV_CONTENT_TYPE_HEADER).and_then(|v| v.to_str().ok()) {
            Some(value) if value.eq_ignore_ascii_case(CONTENT_TYPE_PROTO) => ContentType::Proto,
            _ => ContentType::Json,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ContentType::Json => CONTENT_TYPE_JSON,
            ContentType::Proto => CONTENT_TYPE_PROTO,
        }
    }
}

pub struct GetValuesHandler {
    udf_client: Arc<dyn UdfClient>,
    key_fetcher: Arc<dyn KeyFetcher>,
    metrics: Arc<Metrics>,
}

impl GetValuesHandler {
    pub fn new(
        udf_client: Arc<dyn UdfClient>,
        key_fetcher: Arc<dyn KeyFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            udf_client,
            key_fetcher,
            metrics,
        }
    }

    /// Decode, process, and re-encode in the requested content encoding.
    pub async fn get_values_http(
        &self,
        content_type: ContentType,
        body: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let request: GetValuesRequest = match content_type {
            ContentType::Json => serde_json::from_slice(body).map_err(|e| {
                Error::InvalidArgument(format!("cannot parse request as JSON: {e}"))
            })?,
            ContentType::Proto => GetValuesRequest::decode(body).map_err(|_| {
                Error::InvalidArgument(
                    "cannot parse request as a valid serialized proto object".to_string(),
                )
            })?,
        };
        let response = self.get_values(request).await?;
        match content_type {
            ContentType::Json => serde_json::to_vec(&response)
                .map_err(|e| Error::Internal(format!("cannot serialize the response: {e}"))),
            ContentType::Proto => Ok(response.encode_to_vec()),
        }
    }

    /// OHTTP twin: decrypt the inner request, process it, and encrypt the
    /// reply under the request's context.
    pub async fn oblivious_get_values(
        &self,
        content_type: ContentType,
        body: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut encryptor = ServerEncryptor::new(self.key_fetcher.clone());
        let plaintext = encryptor.decrypt_request(body).inspect_err(|_| {
            Metrics::incr(&self.metrics.secure_lookup_decryption_error);
        })?;
        let response = self.get_values_http(content_type, &plaintext).await?;
        encryptor.encrypt_response(&response).inspect_err(|_| {
            Metrics::incr(&self.metrics.secure_lookup_encryption_error);
        })
    }

    /// Dispatch every partition to the UDF and compose the response.
    pub async fn get_values(&self, request: GetValuesRequest) -> Result<GetValuesResponse, Error> {
        let ctx = request.request_context();
        if request.partitions.is_empty() {
            return Err(Error::Internal(
                "At least 1 partition is required".to_string(),
            ));
        }
        if request.partitions.len() == 1 {
            return self
                .single_partition(&ctx, &request.metadata, &request.partitions[0])
                .await;
        }

        let invocations = request
            .partitions
            .iter()
            .map(|partition| self.process_partition(&ctx, &request.metadata, partition));
        let outcomes = join_all(invocations).await;

        let mut groups: BTreeMap<u32, Vec<serde_json::Value>> = BTreeMap::new();
        let mut any_succeeded = false;
        for (partition, outcome) in request.partitions.iter().zip(outcomes) {
            match outcome {
                Ok(output) => {
                    any_succeeded = true;
                    groups
                        .entry(partition.compression_group_id)
                        .or_default()
                        .push(json!({
                            "id": partition.id,
                            "output": parse_output(output),
                        }));
                }
                Err(e) => {
                    Metrics::incr(&self.metrics.udf_failure);
                    tracing::warn!(
                        partition_id = partition.id,
                        error = %e,
                        "UDF execution failed for partition"
                    );
                }
            }
        }
        if !any_succeeded {
            return Err(Error::Internal("all partitions failed".to_string()));
        }

        let mut compression_groups = Vec::with_capacity(groups.len());
        for (compression_group_id, outputs) in groups {
            let content = serde_json::to_string(&outputs)
                .map_err(|e| Error::Internal(format!("cannot serialize group content: {e}")))?;
            compression_groups.push(CompressionGroup {
                compression_group_id,
                content,
            });
        }
        Ok(GetValuesResponse {
            single_partition: None,
            compression_groups,
        })
    }

    /// Legacy single-partition path: the partition's output, or its
    /// failure as an embedded status, is the whole response. A UDF failure
    /// here is still a well-formed reply, never a request-level error.
    async fn single_partition(
        &self,
        ctx: &RequestContext,
        request_metadata: &std::collections::HashMap<String, String>,
        partition: &RequestPartition,
    ) -> Result<GetValuesResponse, Error> {
        let (string_output, status) = match self
            .process_partition(ctx, request_metadata, partition)
            .await
        {
            Ok(output) => (output, None),
            Err(e) => {
                Metrics::incr(&self.metrics.udf_failure);
                tracing::warn!(
                    partition_id = partition.id,
                    error = %e,
                    "UDF execution failed for partition"
                );
                (
                    String::new(),
                    Some(LookupStatus {
                        code: codes::INTERNAL,
                        message: e.to_string(),
                    }),
                )
            }
        };
        Ok(GetValuesResponse {
            single_partition: Some(ResponsePartition {
                id: partition.id,
                string_output,
                status,
            }),
            compression_groups: Vec::new(),
        })
    }

    async fn process_partition(
        &self,
        ctx: &RequestContext,
        request_metadata: &std::collections::HashMap<String, String>,
        partition: &RequestPartition,
    ) -> Result<String, Error> {
        let metadata = UdfExecutionMetadata {
            request_metadata: request_metadata.clone(),
            partition_metadata: partition.metadata.clone(),
        };
        self.udf_client
            .execute_code(ctx, metadata, &partition.arguments)
            .await
            .map_err(|e| Error::UdfExecution(e.to_string()))
    }
}

/// UDF outputs are JSON by convention; keep raw text for outputs that are
/// not.
fn parse_output(output: String) -> serde_json::Value {
    serde_json::from_str(&output).unwrap_or(serde_json::Value::String(output))
}
