//! Error taxonomy shared across the lookup path
//!
//! Every failure the engine can surface has a stable kind (used as a metric
//! label) and a canonical status code that maps onto the per-key and
//! per-partition statuses embedded in responses.

use thiserror::Error;

use crate::messages::codes;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal lookup client is unavailable")]
    LookupClientMissing,

    #[error("Shard lookup failed: {0}")]
    ShardFailure(String),

    #[error("UDF execution failed: {0}")]
    UdfExecution(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine code, used as a metric label and in structured
    /// error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::LookupClientMissing => "LOOKUP_CLIENT_MISSING",
            Error::ShardFailure(_) => "SHARD_FAILURE",
            Error::UdfExecution(_) => "UDF_EXECUTION_ERROR",
            Error::Encryption(_) => "ENCRYPTION_ERROR",
            Error::Decryption(_) => "DECRYPTION_ERROR",
            Error::Deserialization(_) => "DESERIALIZATION_ERROR",
            Error::Unimplemented(_) => "UNIMPLEMENTED",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Canonical status code carried in embedded `LookupStatus` messages.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => codes::INVALID_ARGUMENT,
            Error::NotFound(_) => codes::NOT_FOUND,
            Error::Unimplemented(_) => codes::UNIMPLEMENTED,
            _ => codes::INTERNAL,
        }
    }
}
