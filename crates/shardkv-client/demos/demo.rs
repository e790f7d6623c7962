// SPDX-License-Identifier: Apache-2.0
//! Minimal CLI for exercising a running shardcontroller + server cluster.
//!
//! Connects to a controller, waits for its configuration to cover at least
//! one server, then puts and gets a handful of keys spread across whatever
//! shards are currently owned.
//!
//! Usage: demo <controller_addr> [key_prefix] [count]

use std::time::Duration;

use anyhow::{Context, Result};
use shardkv_client::ShardKvClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let controller_addr = args
        .next()
        .unwrap_or_else(|| "127.0.0.1:9000".to_string());
    let key_prefix = args.next().unwrap_or_else(|| "demo".to_string());
    let count: u32 = args
        .next()
        .as_deref()
        .unwrap_or("10")
        .parse()
        .context("parse count")?;

    let client = ShardKvClient::new(controller_addr, Duration::from_millis(400));
    client.refresh().await.context("initial configuration fetch")?;

    for i in 0..count {
        let key = format!("{key_prefix}{i}");
        let value = format!("value-{i}").into_bytes();
        client.put(&key, value.clone()).await.with_context(|| format!("put {key}"))?;
        println!("put {key}");
    }

    for i in 0..count {
        let key = format!("{key_prefix}{i}");
        match client.get(&key).await.with_context(|| format!("get {key}"))? {
            Some(value) => println!("get {key} -> {}", String::from_utf8_lossy(&value)),
            None => println!("get {key} -> (absent)"),
        }
    }

    let keys: Vec<String> = (0..count).map(|i| format!("{key_prefix}{i}")).collect();
    let slots = client.multi_get(&keys).await.context("multi_get")?;
    println!("multi_get returned {} values", slots.len());

    Ok(())
}
