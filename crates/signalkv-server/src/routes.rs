//! HTTP surface of the data server
//!
//! - `POST /v2/getvalues` — plaintext UDF-dispatch API
//! - `POST /v2/oblivious_getvalues` — OHTTP-wrapped twin
//! - `POST /internal/secure_lookup` — peer fan-out endpoint, serving this
//!   process's shard out of the local cache
//! - `GET /healthz`, `GET /metricz` — liveness and counter snapshot

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use prost::Message;
use serde_json::json;

use signalkv_client::SECURE_LOOKUP_PATH;
use signalkv_core::framing;
use signalkv_core::messages::{InternalLookupRequest, RequestContext};
use signalkv_core::ohttp::ServerEncryptor;
use signalkv_core::{Error, Metrics};

use crate::error::ServerError;
use crate::handler::{ContentType, OHTTP_RESPONSE_CONTENT_TYPE};
use crate::state::AppState;

const OHTTP_RES_CONTENT_TYPE: &str = "message/ohttp-res";

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metricz", get(metrics_handler))
        .route("/v2/getvalues", post(get_values_handler))
        .route("/v2/oblivious_getvalues", post(oblivious_get_values_handler))
        .route(SECURE_LOOKUP_PATH, post(secure_lookup_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "num_shards": state.num_shards,
        "current_shard_num": state.current_shard_num,
        "cached_entries": state.cache.len(),
    }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<signalkv_core::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn get_values_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let content_type = ContentType::from_headers(&headers);
    let response = state.handler.get_values_http(content_type, &body).await?;
    Ok(([(header::CONTENT_TYPE, content_type.mime())], response).into_response())
}

async fn oblivious_get_values_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ServerError> {
    let content_type = ContentType::from_headers(&headers);
    let response = state
        .handler
        .oblivious_get_values(content_type, &body)
        .await?;
    Ok((
        [(header::CONTENT_TYPE, OHTTP_RESPONSE_CONTENT_TYPE)],
        response,
    )
        .into_response())
}

/// Serves one peer sub-request out of the local cache: decrypt, unpad,
/// decode, look up, encode, encrypt.
async fn secure_lookup_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ServerError> {
    let mut encryptor = ServerEncryptor::new(state.key_fetcher.clone());
    let padded = encryptor.decrypt_request(&body).inspect_err(|_| {
        Metrics::incr(&state.metrics.secure_lookup_decryption_error);
    })?;
    let serialized = framing::unpad(&padded).inspect_err(|_| {
        Metrics::incr(&state.metrics.secure_lookup_unpadding_error);
    })?;
    let request = InternalLookupRequest::decode(serialized).map_err(|_| {
        Metrics::incr(&state.metrics.secure_lookup_deserialization_error);
        ServerError::from(Error::Internal("Failed parsing incoming request".to_string()))
    })?;

    let ctx = RequestContext {
        log_context: request.log_context.clone(),
        consented_debug_config: request.consented_debug_config.clone(),
    };
    let keys: HashSet<String> = request.keys.iter().cloned().collect();
    let response = if request.lookup_sets {
        lookup_value_sets(&state, &ctx, &keys).await?
    } else {
        state.local_lookup.get_key_values(&ctx, &keys).await?
    };

    let payload = response.encode_to_vec();
    let encrypted = encryptor.encrypt_response(&payload).inspect_err(|_| {
        Metrics::incr(&state.metrics.secure_lookup_encryption_error);
    })?;
    Ok(([(header::CONTENT_TYPE, OHTTP_RES_CONTENT_TYPE)], encrypted).into_response())
}

/// A set sub-request does not say which element type the caller wants; a
/// key holds exactly one variant, so answer string sets first and fill the
/// misses from the u32 sets.
async fn lookup_value_sets(
    state: &AppState,
    ctx: &RequestContext,
    keys: &HashSet<String>,
) -> Result<signalkv_core::messages::InternalLookupResponse, Error> {
    let mut response = state.local_lookup.get_key_value_sets(ctx, keys).await?;
    let missing: HashSet<String> = response
        .kv_pairs
        .iter()
        .filter(|(_, result)| result.error_status().is_some())
        .map(|(key, _)| key.clone())
        .collect();
    if !missing.is_empty() {
        let uint_response = state.local_lookup.get_uint32_value_sets(ctx, &missing).await?;
        for (key, result) in uint_response.kv_pairs {
            if result.error_status().is_none() {
                response.kv_pairs.insert(key, result);
            }
        }
    }
    Ok(response)
}
