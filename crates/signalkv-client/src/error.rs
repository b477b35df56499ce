//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Request encryption or response decryption failed.
    #[error(transparent)]
    Envelope(#[from] signalkv_core::Error),

    /// The secure lookup call itself failed (connect, send, or read).
    #[error("Secure lookup transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The peer answered with a non-success status.
    #[error("Secure lookup failed: {status} - {message}")]
    Server { status: u16, message: String },

    /// The decrypted reply did not decode as a lookup response.
    #[error("Failed parsing the response: {0}")]
    Deserialization(String),
}
