// SPDX-License-Identifier: Apache-2.0
//! Storage server binary: joins its controller, then serves shard-scoped
//! key-value requests until shut down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shardkv_server::{serve, KvServer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shardkv-server", about = "Shard-scoped key-value storage server")]
struct Args {
    /// TCP listener for controller and client traffic (e.g. 0.0.0.0:9100)
    #[arg(long, env = "SHARDKV_LISTEN", default_value = "0.0.0.0:9100")]
    listen: SocketAddr,

    /// Shardcontroller address to join against.
    #[arg(long, env = "SHARDKV_CONTROLLER", default_value = "127.0.0.1:9000")]
    controller: String,

    /// Per-request deadline for controller and peer-server calls.
    #[arg(long, env = "SHARDKV_TIMEOUT_MS", default_value_t = 400)]
    timeout_ms: u64,

    /// Base delay for the exponential backoff retrying `Join` on startup.
    #[arg(long, env = "SHARDKV_JOIN_BACKOFF_MS", default_value_t = 100)]
    join_backoff_ms: u64,

    /// How often to poll the controller's configuration for newly assigned
    /// shards that arrived with no peer hand-off (e.g. a `Move` of a
    /// previously unowned range).
    #[arg(long, env = "SHARDKV_CONFIG_SYNC_MS", default_value_t = 2000)]
    config_sync_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let self_addr = args.listen.to_string();
    let request_timeout = Duration::from_millis(args.timeout_ms);

    let server = Arc::new(KvServer::new(self_addr, args.controller.clone(), request_timeout));
    server
        .start(Duration::from_millis(args.join_backoff_ms))
        .await
        .map_err(|err| anyhow::anyhow!(err.to_string()))
        .context("failed to join shardcontroller on startup")?;

    let shutdown_server = Arc::clone(&server);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down, leaving controller");
            shutdown_server.stop().await;
            std::process::exit(0);
        }
    });

    let sync_server = Arc::clone(&server);
    let config_sync_period = Duration::from_millis(args.config_sync_ms);
    tokio::spawn(async move {
        sync_server.run_config_sync_loop(config_sync_period).await;
    });

    serve(args.listen, server, request_timeout)
        .await
        .context("storage server accept loop failed")?;

    Ok(())
}
