//! signalkv-server: sharded data server for ad-auction bidding signals
//!
//! Each server owns one shard of the key space in an in-memory cache and
//! exposes:
//! - the public UDF-dispatch API (`get_values` plus its OHTTP-wrapped
//!   `oblivious_get_values` twin)
//! - the internal secure lookup endpoint that peer shards fan out to
//!
//! Lookups flow through the [`lookup::Lookup`] trait: [`local::LocalLookup`]
//! reads the cache directly, and [`sharded::ShardedLookup`] buckets keys by
//! shard, dispatches length-equalized encrypted sub-requests to peers, and
//! merges the partial answers.

pub mod config;
pub mod error;
pub mod handler;
pub mod local;
pub mod lookup;
pub mod routes;
pub mod shard_manager;
pub mod sharded;
pub mod state;
pub mod udf;

pub use config::ServerConfig;
pub use error::ServerError;
pub use lookup::Lookup;
pub use state::AppState;
