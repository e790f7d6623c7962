// SPDX-License-Identifier: Apache-2.0
//! `KvServer`: the shard-aware storage server. Owns a [`KvStore`], a
//! controller address for `Join`/`Leave`, and a connection pool for the
//! peer-to-peer side of the move protocol (sending `BulkPut`/`AbortBulk`
//! directly to other storage servers).

use std::time::Duration;

use shardkv_proto::message::{KeyValue, Message, ValueSlot};
use shardkv_proto::shard::Shard;
use shardkv_transport::ConnectionPool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backoff;
use crate::error::ServerError;
use crate::store::KvStore;

/// Maximum `Join` attempts on startup before giving up.
const MAX_JOIN_ATTEMPTS: u32 = 6;

pub struct KvServer {
    self_addr: String,
    controller_addr: String,
    store: Mutex<KvStore>,
    pool: ConnectionPool,
    request_timeout: Duration,
}

impl KvServer {
    #[must_use]
    pub fn new(self_addr: String, controller_addr: String, request_timeout: Duration) -> Self {
        Self {
            self_addr,
            controller_addr,
            store: Mutex::new(KvStore::new()),
            pool: ConnectionPool::new(request_timeout),
            request_timeout,
        }
    }

    #[must_use]
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Join the controller, retrying with bounded exponential backoff on
    /// transport failure. Returns an error immediately on a domain rejection
    /// (e.g. `AlreadyJoined`) since retrying wouldn't change the outcome.
    pub async fn start(&self, join_backoff: Duration) -> Result<(), ServerError> {
        let request = Message::JoinRequest {
            server: self.self_addr.clone(),
        };
        for attempt in 0..MAX_JOIN_ATTEMPTS {
            match self.pool.request(&self.controller_addr, &request, self.request_timeout).await {
                Ok(Message::JoinResponse) => {
                    info!(server = %self.self_addr, "joined controller");
                    return Ok(());
                }
                Ok(Message::ErrorResponse { message }) => {
                    warn!(server = %self.self_addr, error = %message, "join rejected");
                    return Err(ServerError::Internal(message));
                }
                Ok(other) => {
                    return Err(ServerError::Internal(format!(
                        "unexpected reply to join: {}",
                        other.op_name()
                    )));
                }
                Err(err) => {
                    let delay = backoff::delay_for(join_backoff, attempt);
                    warn!(server = %self.self_addr, attempt, error = %err, ?delay, "join attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(ServerError::Internal("exhausted join retries".to_string()))
    }

    /// Leave the controller. Best-effort: a transport failure here is logged
    /// and swallowed since the process is shutting down regardless.
    pub async fn stop(&self) {
        let request = Message::LeaveRequest {
            server: self.self_addr.clone(),
        };
        match self.pool.request(&self.controller_addr, &request, self.request_timeout).await {
            Ok(Message::LeaveResponse) => info!(server = %self.self_addr, "left controller"),
            Ok(other) => warn!(server = %self.self_addr, reply = other.op_name(), "unexpected leave reply"),
            Err(err) => warn!(server = %self.self_addr, error = %err, "leave request failed during shutdown"),
        }
    }

    pub async fn get(&self, key: &str) -> Result<(Vec<u8>, bool), ServerError> {
        let store = self.store.lock().await;
        match store.get(key)? {
            Some(value) => Ok((value.to_vec(), true)),
            None => Ok((Vec::new(), false)),
        }
    }

    pub async fn put(&self, key: String, value: Vec<u8>) -> Result<(), ServerError> {
        self.store.lock().await.put(key, value)
    }

    pub async fn append(&self, key: String, value: Vec<u8>) -> Result<(), ServerError> {
        self.store.lock().await.append(key, value)
    }

    pub async fn delete(&self, key: &str) -> Result<(), ServerError> {
        self.store.lock().await.delete(key)
    }

    pub async fn multi_get(&self, keys: &[String]) -> Result<Vec<ValueSlot>, ServerError> {
        self.store.lock().await.multi_get(keys)
    }

    pub async fn multi_put(&self, keys: &[String], values: &[Vec<u8>]) -> Result<(), ServerError> {
        self.store.lock().await.multi_put(keys, values)
    }

    /// Source side of a hand-off (§4.4.1 step 2): snapshot and stream
    /// `piece` to `dest` while holding the store lock for the whole
    /// round trip, then evict locally only once `dest` has acknowledged.
    pub async fn shard_handoff(&self, piece: Shard, dest: &str) -> Result<(), ServerError> {
        let mut store = self.store.lock().await;
        let items = store.snapshot(piece);
        let request = Message::BulkPutRequest { piece, items };
        match self.pool.request(dest, &request, self.request_timeout).await {
            Ok(Message::BulkPutResponse) => {
                store.evict(piece);
                Ok(())
            }
            Ok(Message::ErrorResponse { message }) => Err(ServerError::Internal(message)),
            Ok(other) => Err(ServerError::Internal(format!(
                "unexpected reply to bulk put: {}",
                other.op_name()
            ))),
            Err(err) => Err(ServerError::Internal(err.to_string())),
        }
    }

    /// Destination side of a hand-off: accept `items`, taking ownership of
    /// `piece`.
    pub async fn bulk_put(&self, piece: Shard, items: Vec<KeyValue>) -> Result<(), ServerError> {
        self.store.lock().await.accept_bulk(piece, items);
        Ok(())
    }

    /// Roll back a hand-off this server was accepting: drop `piece` and
    /// whatever it had staged for it.
    pub async fn abort_bulk(&self, piece: Shard) -> Result<(), ServerError> {
        self.store.lock().await.abort_bulk(piece);
        Ok(())
    }

    #[must_use]
    pub async fn owned_shards(&self) -> Vec<Shard> {
        self.store.lock().await.owned_shards().to_vec()
    }

    /// Query the controller's configuration and adopt any shard it lists for
    /// `self_addr` that this store doesn't already have. This is the other
    /// way (besides `ShardHandoff` acceptance) a server acquires ownership:
    /// a `Move` of a previously unowned range commits straight into the
    /// configuration with no peer to hand data off from, so the destination
    /// only learns about it by polling.
    pub async fn sync_configuration(&self) -> Result<(), ServerError> {
        let response = self
            .pool
            .request(&self.controller_addr, &Message::QueryRequest, self.request_timeout)
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        match response {
            Message::QueryResponse { configuration, .. } => {
                let mut store = self.store.lock().await;
                for shard in configuration.shards_of(&self.self_addr).unwrap_or(&[]) {
                    store.adopt_shard(*shard);
                }
                Ok(())
            }
            Message::ErrorResponse { message } => Err(ServerError::Internal(message)),
            other => Err(ServerError::Internal(format!(
                "unexpected reply to query: {}",
                other.op_name()
            ))),
        }
    }

    /// Run [`Self::sync_configuration`] on `period`, forever. Spawn this as a
    /// background task alongside the accept loop; a failed sync is logged and
    /// retried on the next tick rather than treated as fatal.
    pub async fn run_config_sync_loop(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(err) = self.sync_configuration().await {
                warn!(server = %self.self_addr, error = %err, "configuration sync failed");
            }
        }
    }
}
