// SPDX-License-Identifier: Apache-2.0
//! Transport-layer failure modes, distinct from the protocol-level
//! [`shardkv_proto::ProtoError`] they frequently wrap.

use shardkv_proto::ProtoError;
use thiserror::Error;

/// Everything that can go wrong sending or receiving one framed message.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The total send/recv deadline elapsed before a full frame completed.
    #[error("timed out waiting for frame")]
    Timeout,

    /// The peer closed the connection mid-frame or before responding.
    #[error("connection closed by peer")]
    Closed,

    /// Underlying I/O failure (not timeout, not orderly close).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bytes did not decode to a valid frame.
    #[error(transparent)]
    Malformed(#[from] ProtoError),
}
