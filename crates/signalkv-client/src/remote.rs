//! Remote lookup client

use std::sync::Arc;

use async_trait::async_trait;
use prost::Message;

use signalkv_core::framing;
use signalkv_core::messages::InternalLookupResponse;
use signalkv_core::ohttp::{ClientEncryptor, KeyFetcher};

use crate::error::ClientError;

/// Path of the peer's secure lookup endpoint.
pub const SECURE_LOOKUP_PATH: &str = "/internal/secure_lookup";

const OHTTP_REQUEST_CONTENT_TYPE: &str = "message/ohttp-req";

/// One peer shard's lookup interface, as seen by the fan-out engine. The
/// engine pre-serializes the sub-request and chooses the padding so every
/// peer in one fan-out receives the same number of bytes.
#[async_trait]
pub trait RemoteLookupClient: Send + Sync {
    async fn get_values(
        &self,
        serialized_request: &[u8],
        padding: usize,
    ) -> Result<InternalLookupResponse, ClientError>;

    /// Peer address, for logs.
    fn endpoint(&self) -> &str;
}

/// HTTP implementation: OHTTP-encrypts the padded sub-request and POSTs it
/// to the peer's secure lookup endpoint.
pub struct HttpRemoteLookupClient {
    endpoint: String,
    url: String,
    http: reqwest::Client,
    key_fetcher: Arc<dyn KeyFetcher>,
}

impl HttpRemoteLookupClient {
    pub fn new(endpoint: impl Into<String>, key_fetcher: Arc<dyn KeyFetcher>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let url = format!("{endpoint}{SECURE_LOOKUP_PATH}");
        Self {
            endpoint,
            url,
            http: reqwest::Client::new(),
            key_fetcher,
        }
    }
}

#[async_trait]
impl RemoteLookupClient for HttpRemoteLookupClient {
    async fn get_values(
        &self,
        serialized_request: &[u8],
        padding: usize,
    ) -> Result<InternalLookupResponse, ClientError> {
        let padded = framing::pad(serialized_request, padding);
        let mut encryptor = ClientEncryptor::new(self.key_fetcher.clone());
        let encrypted = encryptor.encrypt_request(&padded)?;

        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, OHTTP_REQUEST_CONTENT_TYPE)
            .body(encrypted)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(endpoint = %self.endpoint, %status, "Secure lookup failed");
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.bytes().await?;
        if body.is_empty() {
            // The peer had nothing to return for this sub-request.
            return Ok(InternalLookupResponse::default());
        }
        let plaintext = encryptor.decrypt_response(&body)?;
        InternalLookupResponse::decode(plaintext.as_slice())
            .map_err(|e| ClientError::Deserialization(e.to_string()))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalkv_core::ohttp::StaticKeyFetcher;

    #[test]
    fn test_endpoint_normalization() {
        let fetcher = Arc::new(StaticKeyFetcher::new(1, vec![0u8; 32], None));
        let client = HttpRemoteLookupClient::new("http://shard-1:50051/", fetcher);
        assert_eq!(client.endpoint(), "http://shard-1:50051");
        assert_eq!(client.url, "http://shard-1:50051/internal/secure_lookup");
    }
}
