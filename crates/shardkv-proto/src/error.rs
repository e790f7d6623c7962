// SPDX-License-Identifier: Apache-2.0
//! Error kinds shared by every layer that speaks the wire protocol.

use thiserror::Error;

/// A protocol-level failure: either malformed bytes on the wire, or a
/// domain-level rejection reported in an `ErrorResponse`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Frame bytes did not decode to a known message: truncated payload,
    /// trailing bytes, or an unrecognized tag.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// No server in the addressed configuration owns the requested key.
    #[error("no server owns this key")]
    NoOwner,

    /// The server that received the request does not currently own the shard
    /// covering the key.
    #[error("server does not own the requested shard")]
    WrongShard,

    /// `Get` on a key that is not present (distinct from `WrongShard`).
    #[error("key not found")]
    NotFound,

    /// Request shape was invalid independent of routing, e.g. mismatched
    /// `MultiPut` key/value lengths.
    #[error("bad arguments: {0}")]
    BadArgs(String),

    /// `Join` for a server address already a member.
    #[error("server already joined")]
    AlreadyJoined,

    /// `Leave` or `Move` referencing a server address that is not a member.
    #[error("server not a member of the configuration")]
    NotJoined,

    /// `Move` preconditions failed, or a hand-off phase failed; configuration
    /// is left unchanged.
    #[error("move failed: {0}")]
    MoveFailed(String),

    /// Unexpected internal failure not otherwise classified.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtoError {
    /// The string carried in an `ErrorResponse` payload for this error.
    #[must_use]
    pub fn wire_message(&self) -> String {
        self.to_string()
    }

    /// Reconstruct a `ProtoError` from an `ErrorResponse`'s free-text message.
    /// Used on the receiving side of the wire, where only the rendered
    /// message survives; falls back to [`ProtoError::Internal`] for anything
    /// that doesn't match a recognized prefix.
    #[must_use]
    pub fn from_wire_message(message: &str) -> Self {
        match message {
            "no server owns this key" => Self::NoOwner,
            "server does not own the requested shard" => Self::WrongShard,
            "key not found" => Self::NotFound,
            "server already joined" => Self::AlreadyJoined,
            "server not a member of the configuration" => Self::NotJoined,
            other => {
                if let Some(rest) = other.strip_prefix("bad arguments: ") {
                    Self::BadArgs(rest.to_string())
                } else if let Some(rest) = other.strip_prefix("move failed: ") {
                    Self::MoveFailed(rest.to_string())
                } else {
                    Self::Internal(other.to_string())
                }
            }
        }
    }
}
