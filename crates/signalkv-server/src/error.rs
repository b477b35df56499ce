//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Structured error response for API clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Lookup(#[from] signalkv_core::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ServerError {
    /// Get the stable machine code for structured responses
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Lookup(inner) => inner.kind(),
            ServerError::InvalidRequest(_) => "INVALID_ARGUMENT",
        }
    }

    /// Get the HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Lookup(inner) => match inner {
                signalkv_core::Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                signalkv_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
                signalkv_core::Error::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid: ServerError = signalkv_core::Error::InvalidArgument("bad".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        let internal: ServerError = signalkv_core::Error::ShardFailure("down".into()).into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.code(), "SHARD_FAILURE");
    }
}
