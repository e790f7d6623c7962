// SPDX-License-Identifier: Apache-2.0
//! The controller's authoritative state: configuration, epoch and in-flight
//! moves, guarded by a single coarse lock as required by §4.4's concurrency
//! contract.

use std::time::Duration;

use shardkv_proto::config::{Configuration, ConfigurationEpoch};
use shardkv_proto::message::Message;
use shardkv_proto::shard::Shard;
use shardkv_proto::ProtoError;
use shardkv_transport::ConnectionPool;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ControllerError;
use crate::moves::{decompose, Piece};

struct Inner {
    configuration: Configuration,
    epoch: ConfigurationEpoch,
    /// Shards currently the subject of an in-flight `Move`, to reject
    /// overlapping moves per §4.4.1's tie-break rule.
    pending_moves: Vec<Shard>,
}

/// Shared, `Clone`-free controller state. Wrap in `Arc` to hand to multiple
/// connection-handling tasks, mirroring the teacher's `Arc<Mutex<HubState>>`
/// shape (here an `RwLock` since `Query` is read-mostly).
pub struct ControllerState {
    inner: RwLock<Inner>,
    pool: ConnectionPool,
    request_timeout: Duration,
}

impl ControllerState {
    #[must_use]
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                configuration: Configuration::new(),
                epoch: 0,
                pending_moves: Vec::new(),
            }),
            pool: ConnectionPool::new(request_timeout),
            request_timeout,
        }
    }

    /// Current configuration and epoch, as a consistent snapshot.
    pub async fn query(&self) -> (Configuration, ConfigurationEpoch) {
        let inner = self.inner.read().await;
        (inner.configuration.clone(), inner.epoch)
    }

    /// Add `addr` with an empty shard list.
    pub async fn join(&self, addr: &str) -> Result<(), ControllerError> {
        let mut inner = self.inner.write().await;
        if inner.configuration.contains_server(addr) {
            return Err(ControllerError::AlreadyJoined);
        }
        inner.configuration.add_server(addr);
        inner.epoch += 1;
        info!(server = addr, epoch = inner.epoch, "server joined");
        Ok(())
    }

    /// Remove `addr`; its shards become unassigned.
    pub async fn leave(&self, addr: &str) -> Result<(), ControllerError> {
        let mut inner = self.inner.write().await;
        if inner.configuration.remove_server(addr).is_none() {
            return Err(ControllerError::NotJoined);
        }
        inner.epoch += 1;
        info!(server = addr, epoch = inner.epoch, "server left");
        Ok(())
    }

    /// Execute a `Move(dest, requested_shards)` per §4.4.1: decompose,
    /// hand off piece by piece, commit on full success or roll back on first
    /// failure. A piece with no current owner is the bootstrap path — no
    /// server has ever held it, so there's nothing to hand off; it commits
    /// straight to `dest`.
    pub async fn mv(&self, dest: &str, requested: Vec<Shard>) -> Result<(), ControllerError> {
        let pieces = self.begin_move(dest, &requested).await?;

        let mut succeeded: Vec<Piece> = Vec::new();
        for piece in &pieces {
            match &piece.source {
                Some(source) => match self.hand_off(source, &piece.shard, dest).await {
                    Ok(()) => succeeded.push(piece.clone()),
                    Err(reason) => {
                        self.abort_move(&succeeded, dest, &requested).await;
                        return Err(ControllerError::MoveFailed(reason));
                    }
                },
                None => succeeded.push(piece.clone()),
            }
        }

        self.commit_move(&pieces, dest, &requested).await;
        Ok(())
    }

    async fn begin_move(&self, dest: &str, requested: &[Shard]) -> Result<Vec<Piece>, ControllerError> {
        let mut inner = self.inner.write().await;
        if !inner.configuration.contains_server(dest) {
            return Err(ControllerError::MoveFailed(format!("{dest} is not a member")));
        }
        if requested.iter().any(|r| inner.pending_moves.iter().any(|p| p.overlaps(r))) {
            return Err(ControllerError::MoveFailed("conflicting move already in progress".to_string()));
        }
        let pieces = decompose(requested, &inner.configuration, dest).map_err(ControllerError::MoveFailed)?;
        inner.pending_moves.extend_from_slice(requested);
        Ok(pieces)
    }

    async fn hand_off(&self, source: &str, shard: &Shard, dest: &str) -> Result<(), String> {
        let request = Message::ShardHandoffRequest {
            piece: *shard,
            dest: dest.to_string(),
        };
        match self.pool.request(source, &request, self.request_timeout).await {
            Ok(Message::ShardHandoffResponse) => Ok(()),
            Ok(Message::ErrorResponse { message }) => Err(message),
            Ok(other) => Err(format!("unexpected reply to shard handoff: {}", other.op_name())),
            Err(err) => Err(err.to_string()),
        }
    }

    /// Roll back `succeeded` pieces. Only pieces that actually went through a
    /// peer hand-off staged data on `dest` and need an `AbortBulk`; sourceless
    /// pieces never touched `dest` and are simply dropped from bookkeeping.
    async fn abort_move(&self, succeeded: &[Piece], dest: &str, requested: &[Shard]) {
        for piece in succeeded.iter().filter(|p| p.source.is_some()) {
            let request = Message::AbortBulkRequest { piece: piece.shard };
            if let Err(err) = self.pool.request(dest, &request, self.request_timeout).await {
                warn!(dest, shard = ?piece.shard, error = %err, "abort-bulk delivery failed");
            }
        }
        let mut inner = self.inner.write().await;
        for r in requested {
            if let Some(pos) = inner.pending_moves.iter().position(|p| p == r) {
                inner.pending_moves.remove(pos);
            }
        }
    }

    async fn commit_move(&self, pieces: &[Piece], dest: &str, requested: &[Shard]) {
        let mut inner = self.inner.write().await;
        for piece in pieces {
            if let Some(source) = &piece.source {
                inner.configuration.unassign_shard(source, piece.shard);
            }
            inner.configuration.assign_shard(dest, piece.shard);
        }
        for r in requested {
            if let Some(pos) = inner.pending_moves.iter().position(|p| p == r) {
                inner.pending_moves.remove(pos);
            }
        }
        inner.epoch += 1;
        info!(dest, epoch = inner.epoch, pieces = pieces.len(), "move committed");
    }
}

/// Map a `ControllerError` to the wire `Message` a caller over TCP should see.
#[must_use]
pub fn error_to_message(err: ControllerError) -> Message {
    let proto: ProtoError = err.into();
    Message::ErrorResponse {
        message: proto.wire_message(),
    }
}
