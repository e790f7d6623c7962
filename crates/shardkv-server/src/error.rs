// SPDX-License-Identifier: Apache-2.0
//! Storage-server error type.

use shardkv_proto::ProtoError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    #[error("server does not own the requested shard")]
    WrongShard,

    #[error("key not found")]
    NotFound,

    #[error("bad arguments: {0}")]
    BadArgs(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for ProtoError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::WrongShard => ProtoError::WrongShard,
            ServerError::NotFound => ProtoError::NotFound,
            ServerError::BadArgs(reason) => ProtoError::BadArgs(reason),
            ServerError::Internal(reason) => ProtoError::Internal(reason),
        }
    }
}
