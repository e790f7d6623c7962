// SPDX-License-Identifier: Apache-2.0
//! Wire schema, shard arithmetic and the frame codec shared by every
//! `shardkv` component: controller, storage server, and client router.

pub mod config;
pub mod error;
pub mod message;
pub mod shard;
pub mod wire;

pub use config::{Configuration, ConfigurationEpoch};
pub use error::ProtoError;
pub use message::{KeyValue, Message, ValueSlot};
pub use shard::Shard;
