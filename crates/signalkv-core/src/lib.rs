//! signalkv-core: shared building blocks for the signalkv lookup service
//!
//! A signalkv deployment is a set of `num_shards` data servers, each owning
//! one shard of the key space in an in-memory cache. Queries for keys a
//! server does not own are fanned out to peer shards as encrypted,
//! length-equalized sub-requests and the partial answers are merged into a
//! single response.
//!
//! This crate holds everything both the server and the remote-lookup client
//! need:
//! - the error taxonomy ([`Error`]) with stable machine codes
//! - the key sharder ([`sharder::KeySharder`])
//! - the in-memory commit-time-gated cache ([`cache::KeyValueCache`])
//! - the internal wire messages ([`messages`]) and padding frame
//!   ([`framing`])
//! - the OHTTP request/response envelope ([`ohttp`])
//! - the set-query DSL ([`query`])
//! - process-wide lookup metrics ([`metrics::Metrics`])

pub mod cache;
pub mod error;
pub mod framing;
pub mod messages;
pub mod metrics;
pub mod ohttp;
pub mod query;
pub mod sharder;

pub use cache::{CacheValue, KeyValueCache};
pub use error::Error;
pub use messages::RequestContext;
pub use metrics::Metrics;
pub use sharder::{KeySharder, ShardAssignment};

pub type Result<T> = std::result::Result<T, Error>;
