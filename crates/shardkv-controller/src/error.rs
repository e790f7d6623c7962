// SPDX-License-Identifier: Apache-2.0
//! Controller-facing error type: the outcome of a `Join`/`Leave`/`Move`/`Query`
//! call, independent of how it arrived (in-process call or over the wire).

use shardkv_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("server already joined")]
    AlreadyJoined,

    #[error("server not a member of the configuration")]
    NotJoined,

    #[error("move failed: {0}")]
    MoveFailed(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Transport(#[from] ProtoError),
}

impl From<ControllerError> for ProtoError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::AlreadyJoined => ProtoError::AlreadyJoined,
            ControllerError::NotJoined => ProtoError::NotJoined,
            ControllerError::MoveFailed(reason) => ProtoError::MoveFailed(reason),
            ControllerError::Unsupported(reason) => ProtoError::Internal(reason),
            ControllerError::Transport(inner) => inner,
        }
    }
}
