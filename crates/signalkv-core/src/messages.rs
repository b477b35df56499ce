//! Wire messages for the lookup path
//!
//! Two families live here:
//! - the internal fan-out payload (`InternalLookupRequest` /
//!   `InternalLookupResponse`), exchanged between shards inside the OHTTP
//!   envelope and encoded with protobuf
//! - the public `GetValuesRequest` / `GetValuesResponse` API, which is
//!   encoded as either protobuf or JSON depending on the `kv-content-type`
//!   header, so those types additionally derive serde
//!
//! `SingleLookupResult` is the per-key result: exactly one of a single
//! value, a string set, a u32 set, or an embedded status.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical status codes embedded in per-key and per-partition statuses.
pub mod codes {
    pub const OK: i32 = 0;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const NOT_FOUND: i32 = 5;
    pub const UNIMPLEMENTED: i32 = 12;
    pub const INTERNAL: i32 = 13;
}

/// Per-request logging context propagated to peer shards.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogContext {
    #[prost(string, tag = "1")]
    pub generation_id: String,
    #[prost(string, tag = "2")]
    pub adtech_debug_id: String,
}

/// Consented debugging configuration propagated to peer shards.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsentedDebugConfig {
    #[prost(bool, tag = "1")]
    pub is_consented: bool,
    #[prost(string, tag = "2")]
    pub token: String,
}

/// Request-scoped context threaded through every lookup operation.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub log_context: Option<LogContext>,
    pub consented_debug_config: Option<ConsentedDebugConfig>,
}

/// Status embedded in a `SingleLookupResult` or response partition.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupStatus {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeysetValues {
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UintsetValues {
    #[prost(uint32, repeated, tag = "1")]
    pub values: Vec<u32>,
}

/// Result for one requested key. Exactly one variant is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SingleLookupResult {
    #[prost(oneof = "single_lookup_result::Variant", tags = "1, 2, 3, 4")]
    pub variant: Option<single_lookup_result::Variant>,
}

pub mod single_lookup_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Variant {
        #[prost(string, tag = "1")]
        Value(String),
        #[prost(message, tag = "2")]
        KeysetValues(super::KeysetValues),
        #[prost(message, tag = "3")]
        UintsetValues(super::UintsetValues),
        #[prost(message, tag = "4")]
        Status(super::LookupStatus),
    }
}

impl SingleLookupResult {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            variant: Some(single_lookup_result::Variant::Value(value.into())),
        }
    }

    pub fn keyset_values(values: impl IntoIterator<Item = String>) -> Self {
        Self {
            variant: Some(single_lookup_result::Variant::KeysetValues(KeysetValues {
                values: values.into_iter().collect(),
            })),
        }
    }

    pub fn uintset_values(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            variant: Some(single_lookup_result::Variant::UintsetValues(UintsetValues {
                values: values.into_iter().collect(),
            })),
        }
    }

    pub fn status(code: i32, message: impl Into<String>) -> Self {
        Self {
            variant: Some(single_lookup_result::Variant::Status(LookupStatus {
                code,
                message: message.into(),
            })),
        }
    }

    /// The embedded status, if this result carries one.
    pub fn error_status(&self) -> Option<&LookupStatus> {
        match &self.variant {
            Some(single_lookup_result::Variant::Status(status)) => Some(status),
            _ => None,
        }
    }
}

/// Sub-request dispatched to one shard during fan-out.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalLookupRequest {
    #[prost(string, repeated, tag = "1")]
    pub keys: Vec<String>,
    #[prost(bool, tag = "2")]
    pub lookup_sets: bool,
    #[prost(message, optional, tag = "3")]
    pub log_context: Option<LogContext>,
    #[prost(message, optional, tag = "4")]
    pub consented_debug_config: Option<ConsentedDebugConfig>,
}

impl InternalLookupRequest {
    pub fn new(keys: Vec<String>, lookup_sets: bool, ctx: &RequestContext) -> Self {
        Self {
            keys,
            lookup_sets,
            log_context: ctx.log_context.clone(),
            consented_debug_config: ctx.consented_debug_config.clone(),
        }
    }
}

/// Reply for one shard's sub-request: every requested key maps to exactly
/// one `SingleLookupResult`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalLookupResponse {
    #[prost(map = "string, message", tag = "1")]
    pub kv_pairs: HashMap<String, SingleLookupResult>,
}

/// Reply for a set query: the flat result set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalRunQueryResponse {
    #[prost(string, repeated, tag = "1")]
    pub elements: Vec<String>,
}

/// Reply for a u32 set query.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalRunSetQueryUint32Response {
    #[prost(uint32, repeated, tag = "1")]
    pub elements: Vec<u32>,
}

/// One argument of a UDF partition. `data` holds an arbitrary JSON value,
/// kept serialized so the protobuf and JSON encodings agree.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UdfArgument {
    #[prost(string, repeated, tag = "1")]
    pub tags: Vec<String>,
    #[prost(string, tag = "2")]
    #[serde(with = "json_value_string")]
    pub data: String,
}

/// One logical partition of a client request.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestPartition {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(uint32, tag = "2")]
    pub compression_group_id: u32,
    #[prost(message, repeated, tag = "3")]
    pub arguments: Vec<UdfArgument>,
    #[prost(map = "string, string", tag = "4")]
    pub metadata: HashMap<String, String>,
}

/// Top-level client request for the UDF-dispatch path.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GetValuesRequest {
    #[prost(map = "string, string", tag = "1")]
    pub metadata: HashMap<String, String>,
    #[prost(message, repeated, tag = "2")]
    pub partitions: Vec<RequestPartition>,
    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_context: Option<LogContext>,
    #[prost(message, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consented_debug_config: Option<ConsentedDebugConfig>,
}

impl GetValuesRequest {
    pub fn request_context(&self) -> RequestContext {
        RequestContext {
            log_context: self.log_context.clone(),
            consented_debug_config: self.consented_debug_config.clone(),
        }
    }
}

/// Response for one partition on the legacy single-partition path.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponsePartition {
    #[prost(int32, tag = "1")]
    pub id: i32,
    #[prost(string, tag = "2")]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub string_output: String,
    #[prost(message, optional, tag = "3")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LookupStatus>,
}

/// UDF outputs for one compression group. `content` is a JSON array of the
/// surviving per-partition outputs.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressionGroup {
    #[prost(uint32, tag = "1")]
    pub compression_group_id: u32,
    #[prost(string, tag = "2")]
    pub content: String,
}

/// Top-level client response.
#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GetValuesResponse {
    #[prost(message, optional, tag = "1")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_partition: Option<ResponsePartition>,
    #[prost(message, repeated, tag = "2")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compression_groups: Vec<CompressionGroup>,
}

/// Serde adapter that accepts any JSON value for a field and stores it as
/// its serialized text, so the protobuf encoding can carry it as a string.
mod json_value_string {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &str, serializer: S) -> Result<S::Ok, S::Error> {
        match serde_json::from_str::<serde_json::Value>(data) {
            Ok(value) => value.serialize(serializer),
            Err(_) => serializer.serialize_str(data),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_internal_request_roundtrip() {
        let ctx = RequestContext {
            log_context: Some(LogContext {
                generation_id: "gen-1".into(),
                adtech_debug_id: "debug".into(),
            }),
            consented_debug_config: None,
        };
        let request =
            InternalLookupRequest::new(vec!["key1".into(), "key2".into()], true, &ctx);
        let bytes = request.encode_to_vec();
        let decoded = InternalLookupRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, request);
        assert!(decoded.lookup_sets);
    }

    #[test]
    fn test_empty_internal_request_encodes_empty() {
        // An empty bucket's sub-request carries no bytes of its own; the
        // padding frame is what equalizes it with its siblings.
        let request = InternalLookupRequest::default();
        assert!(request.encode_to_vec().is_empty());
    }

    #[test]
    fn test_single_lookup_result_status() {
        let result = SingleLookupResult::status(codes::NOT_FOUND, "Key not found: k");
        let status = result.error_status().unwrap();
        assert_eq!(status.code, codes::NOT_FOUND);
        assert!(SingleLookupResult::value("v").error_status().is_none());
    }

    #[test]
    fn test_get_values_request_json_with_typed_argument_data() {
        let json = r#"{
            "metadata": {"hostname": "example.com"},
            "partitions": [{
                "id": 0,
                "compressionGroupId": 1,
                "arguments": [{"tags": ["custom", "keys"], "data": ["key1", "key2"]}]
            }]
        }"#;
        let request: GetValuesRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.partitions.len(), 1);
        let arg = &request.partitions[0].arguments[0];
        assert_eq!(arg.tags, vec!["custom".to_string(), "keys".to_string()]);
        let data: Vec<String> = serde_json::from_str(&arg.data).unwrap();
        assert_eq!(data, vec!["key1".to_string(), "key2".to_string()]);
    }

    #[test]
    fn test_get_values_response_proto_roundtrip() {
        let response = GetValuesResponse {
            single_partition: None,
            compression_groups: vec![CompressionGroup {
                compression_group_id: 7,
                content: "[{\"id\":0}]".into(),
            }],
        };
        let bytes = response.encode_to_vec();
        assert_eq!(GetValuesResponse::decode(bytes.as_slice()).unwrap(), response);
    }
}
