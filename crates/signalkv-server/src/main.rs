//! signalkv data server CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use signalkv_server::routes::create_router;
use signalkv_server::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::parse();
    config.validate()?;

    let state = AppState::from_config(&config)?;
    let app = create_router(state);

    tracing::info!(
        addr = %config.listen_addr,
        num_shards = config.num_shards,
        current_shard_num = config.current_shard_num,
        "Starting signalkv server"
    );
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
