// SPDX-License-Identifier: Apache-2.0
//! The storage server: a shard-scoped key-value map that joins a
//! shardcontroller on startup and participates in the live-migration
//! protocol.

pub mod backoff;
pub mod error;
pub mod serve;
pub mod server;
pub mod store;

pub use error::ServerError;
pub use serve::serve;
pub use server::KvServer;
pub use store::KvStore;
