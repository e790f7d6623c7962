// SPDX-License-Identifier: Apache-2.0
//! Shard-aware client router for shardkv.
//!
//! Caches the shardcontroller's configuration, routes single-key operations
//! to the server that owns them, and fans batched operations out across
//! every server a batch spans.

pub mod client;
pub mod error;

pub use client::ShardKvClient;
pub use error::ClientError;
