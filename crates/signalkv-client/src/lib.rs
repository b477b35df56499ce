//! signalkv-client: remote shard lookup over the OHTTP envelope
//!
//! The sharded lookup engine hands this client an already-serialized
//! sub-request plus a padding count; the client frames and encrypts it,
//! POSTs it to the peer shard's secure lookup endpoint, and decrypts and
//! decodes the reply.

pub mod error;
mod remote;

pub use error::ClientError;
pub use remote::{HttpRemoteLookupClient, RemoteLookupClient, SECURE_LOOKUP_PATH};

pub type Result<T> = std::result::Result<T, ClientError>;
