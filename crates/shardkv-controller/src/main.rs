// SPDX-License-Identifier: Apache-2.0
//! Shardcontroller binary: binds a listener and serves `Join`/`Leave`/`Move`/`Query`.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shardkv_controller::{serve, ControllerState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Command-line flags, with environment-variable fallbacks (CLI wins).
/// Mirrors `echo-session-ws-gateway::Args`'s `default_value` pattern.
#[derive(Parser, Debug)]
#[command(name = "shardkv-controller", about = "Authoritative shard placement controller")]
struct Args {
    /// TCP listener for servers and clients (e.g. 0.0.0.0:9000)
    #[arg(long, env = "SHARDKV_LISTEN", default_value = "0.0.0.0:9000")]
    listen: SocketAddr,

    /// Per-request deadline used when the controller drives the move
    /// protocol against storage servers.
    #[arg(long, env = "SHARDKV_TIMEOUT_MS", default_value_t = 400)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();
    let state = Arc::new(ControllerState::new(Duration::from_millis(args.timeout_ms)));

    serve(args.listen, state, Duration::from_millis(args.timeout_ms))
        .await
        .context("shardcontroller accept loop failed")?;

    Ok(())
}
