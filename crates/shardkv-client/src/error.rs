// SPDX-License-Identifier: Apache-2.0
//! Client-facing error type.

use shardkv_proto::ProtoError;
use shardkv_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// No server in the latest known configuration covers the requested key.
    #[error("no server owns this key")]
    NoOwner,

    /// The server rejected the request as outside its owned shards even
    /// after one configuration refresh and retry.
    #[error("server does not own the requested shard (after refresh)")]
    WrongShard,

    /// Request shape was invalid, e.g. `MultiPut` key/value length mismatch.
    #[error("bad arguments: {0}")]
    BadArgs(String),

    /// A server-reported failure not otherwise classified.
    #[error("server error: {0}")]
    Server(String),

    /// Transport-level failure (timeout, closed connection, malformed frame).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Translate an `ErrorResponse`'s wire message into a typed error.
    #[must_use]
    pub fn from_wire_message(message: &str) -> Self {
        match ProtoError::from_wire_message(message) {
            ProtoError::NoOwner => Self::NoOwner,
            ProtoError::WrongShard => Self::WrongShard,
            ProtoError::BadArgs(reason) => Self::BadArgs(reason),
            other => Self::Server(other.to_string()),
        }
    }
}
