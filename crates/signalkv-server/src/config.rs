//! Server configuration

use clap::Parser;

use signalkv_core::ohttp::{generate_key_pair, StaticKeyFetcher};

/// Sharded key-value data server for ad-auction bidding signals.
#[derive(Parser, Debug, Clone)]
#[command(name = "signalkv-server", version)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0:50051")]
    pub listen_addr: String,

    /// Total number of shards in the deployment; 1 disables fan-out.
    #[arg(long, default_value_t = 1)]
    pub num_shards: usize,

    /// This server's shard index, in `[0, num_shards)`.
    #[arg(long, default_value_t = 0)]
    pub current_shard_num: usize,

    /// Base URL per shard, comma-separated and indexed by shard number;
    /// replicas of one shard are separated with `|`. The entry for this
    /// server's own shard is ignored (use `-`).
    #[arg(long, value_delimiter = ',')]
    pub shard_addrs: Vec<String>,

    /// Optional regex whose first match in a key is hashed for shard
    /// assignment instead of the whole key.
    #[arg(long)]
    pub sharding_key_regex: Option<String>,

    /// Disable the set-query DSL endpoints.
    #[arg(long, default_value_t = false)]
    pub disable_set_queries: bool,

    /// Deadline for each peer-shard lookup, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub remote_lookup_deadline_ms: u64,

    /// OHTTP key id published to peers.
    #[arg(long, default_value_t = 1)]
    pub ohttp_key_id: u8,

    /// Hex-encoded X25519 public key for the OHTTP envelope. When omitted
    /// (together with the private key), an ephemeral dev keypair is
    /// generated.
    #[arg(long)]
    pub ohttp_public_key_hex: Option<String>,

    /// Hex-encoded X25519 private key for the OHTTP envelope.
    #[arg(long)]
    pub ohttp_private_key_hex: Option<String>,
}

impl ServerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_shards == 0 {
            anyhow::bail!("num_shards must be at least 1");
        }
        if self.current_shard_num >= self.num_shards {
            anyhow::bail!(
                "current_shard_num {} out of range for {} shards",
                self.current_shard_num,
                self.num_shards
            );
        }
        if self.num_shards > 1 && self.shard_addrs.len() != self.num_shards {
            anyhow::bail!(
                "expected {} shard addresses, got {}",
                self.num_shards,
                self.shard_addrs.len()
            );
        }
        if self.ohttp_public_key_hex.is_some() != self.ohttp_private_key_hex.is_some() {
            anyhow::bail!("ohttp public and private keys must be configured together");
        }
        Ok(())
    }

    /// Replica addresses per shard. Placeholder (`-`) and empty entries
    /// yield no replicas.
    pub fn shard_replicas(&self) -> Vec<Vec<String>> {
        self.shard_addrs
            .iter()
            .map(|entry| {
                entry
                    .split('|')
                    .map(str::trim)
                    .filter(|addr| !addr.is_empty() && *addr != "-")
                    .map(str::to_string)
                    .collect()
            })
            .collect()
    }

    /// Build the key fetcher from the configured key material, or generate
    /// an ephemeral dev keypair when none is configured.
    pub fn key_fetcher(&self) -> anyhow::Result<StaticKeyFetcher> {
        match (&self.ohttp_public_key_hex, &self.ohttp_private_key_hex) {
            (Some(public_hex), Some(private_hex)) => {
                let public_key = hex::decode(public_hex)?;
                let private_key = hex::decode(private_hex)?;
                Ok(StaticKeyFetcher::new(
                    self.ohttp_key_id,
                    public_key,
                    Some(private_key),
                ))
            }
            _ => {
                tracing::warn!(
                    "no OHTTP key material configured, generating an ephemeral dev keypair"
                );
                let (private_key, public_key) = generate_key_pair();
                Ok(StaticKeyFetcher::new(
                    self.ohttp_key_id,
                    public_key,
                    Some(private_key),
                ))
            }
        }
    }
}
