// SPDX-License-Identifier: Apache-2.0
//! `ShardKvClient`: routes single-key operations to the owning server and
//! fans batched operations out across the servers they span.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use shardkv_proto::config::{Configuration, ConfigurationEpoch};
use shardkv_proto::message::{Message, ValueSlot};
use shardkv_transport::ConnectionPool;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ClientError;

/// Shard-aware client router. Caches the controller's configuration and
/// keeps a pooled connection per server address.
pub struct ShardKvClient {
    controller_addr: String,
    cached: RwLock<(Configuration, ConfigurationEpoch)>,
    pool: Arc<ConnectionPool>,
    request_timeout: Duration,
}

impl ShardKvClient {
    #[must_use]
    pub fn new(controller_addr: String, request_timeout: Duration) -> Self {
        Self {
            controller_addr,
            cached: RwLock::new((Configuration::new(), 0)),
            pool: Arc::new(ConnectionPool::new(request_timeout)),
            request_timeout,
        }
    }

    /// Fetch the latest configuration from the controller and replace the
    /// cached one. Called lazily on a cache miss, on `WrongShard`, or by a
    /// caller running its own periodic refresh loop (every 2s by default,
    /// per the freshness design note).
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let response = self
            .pool
            .request(&self.controller_addr, &Message::QueryRequest, self.request_timeout)
            .await?;
        match response {
            Message::QueryResponse { configuration, epoch } => {
                debug!(epoch, "client refreshed configuration");
                *self.cached.write().await = (configuration, epoch);
                Ok(())
            }
            Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
            other => Err(ClientError::Server(format!(
                "unexpected reply to query: {}",
                other.op_name()
            ))),
        }
    }

    /// Current cached epoch, for callers that want to observe staleness.
    pub async fn cached_epoch(&self) -> ConfigurationEpoch {
        self.cached.read().await.1
    }

    async fn resolve(&self, key: &str) -> Option<String> {
        self.cached
            .read()
            .await
            .0
            .server_for(key)
            .map(ToString::to_string)
    }

    /// Resolve `key`, refreshing once on a cache miss.
    async fn resolve_or_refresh(&self, key: &str) -> Result<String, ClientError> {
        if let Some(addr) = self.resolve(key).await {
            return Ok(addr);
        }
        self.refresh().await?;
        self.resolve(key).await.ok_or(ClientError::NoOwner)
    }

    /// Send `request` to `key`'s owning server, refreshing and retrying
    /// exactly once on `WrongShard`.
    async fn route_single(&self, key: &str, request: &Message) -> Result<Message, ClientError> {
        let addr = self.resolve_or_refresh(key).await?;
        let response = self.pool.request(&addr, request, self.request_timeout).await?;
        if is_wrong_shard(&response) {
            self.refresh().await?;
            let addr = self.resolve(key).await.ok_or(ClientError::NoOwner)?;
            let retried = self.pool.request(&addr, request, self.request_timeout).await?;
            return Ok(retried);
        }
        Ok(response)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ClientError> {
        match self.route_single(key, &Message::GetRequest { key: key.to_string() }).await? {
            Message::GetResponse { value, present } => Ok(present.then_some(value)),
            Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), ClientError> {
        let request = Message::PutRequest {
            key: key.to_string(),
            value,
        };
        match self.route_single(key, &request).await? {
            Message::PutResponse => Ok(()),
            Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn append(&self, key: &str, value: Vec<u8>) -> Result<(), ClientError> {
        let request = Message::AppendRequest {
            key: key.to_string(),
            value,
        };
        match self.route_single(key, &request).await? {
            Message::AppendResponse => Ok(()),
            Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), ClientError> {
        let request = Message::DeleteRequest { key: key.to_string() };
        match self.route_single(key, &request).await? {
            Message::DeleteResponse => Ok(()),
            Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
            other => Err(unexpected(&other)),
        }
    }

    /// Group `keys` by owning server, fan the sub-requests out with
    /// `tokio::spawn`, and reassemble results in the caller's original key
    /// order. Fails without issuing any request if any key has no owner.
    pub async fn multi_get(&self, keys: &[String]) -> Result<Vec<ValueSlot>, ClientError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let groups = self.group_by_owner(keys).await?;

        let mut tasks = Vec::with_capacity(groups.len());
        for (addr, indices) in groups {
            let sub_keys: Vec<String> = indices.iter().map(|&i| keys[i].clone()).collect();
            let pool = Arc::clone(&self.pool);
            let timeout = self.request_timeout;
            tasks.push(tokio::spawn(async move {
                let request = Message::MultiGetRequest { keys: sub_keys };
                let response = pool.request(&addr, &request, timeout).await?;
                match response {
                    Message::MultiGetResponse { values } => Ok((indices, values)),
                    Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
                    other => Err(unexpected(&other)),
                }
            }));
        }

        let mut results: Vec<Option<ValueSlot>> = vec![None; keys.len()];
        for task in futures::future::join_all(tasks).await {
            let (indices, values) = task.map_err(|e| ClientError::Server(e.to_string()))??;
            for (idx, value) in indices.into_iter().zip(values) {
                results[idx] = Some(value);
            }
        }

        Ok(results.into_iter().map(|v| v.expect("every index populated")).collect())
    }

    /// Group `keys`/`values` by owning server and fan the sub-requests out
    /// in parallel. On partial failure the overall call fails; already-
    /// applied sub-requests on other servers are NOT rolled back (no
    /// cross-server atomicity is guaranteed for batches).
    pub async fn multi_put(&self, keys: &[String], values: &[Vec<u8>]) -> Result<(), ClientError> {
        if keys.len() != values.len() {
            return Err(ClientError::BadArgs("keys and values length mismatch".to_string()));
        }
        if keys.is_empty() {
            return Ok(());
        }
        let groups = self.group_by_owner(keys).await?;

        let mut tasks = Vec::with_capacity(groups.len());
        for (addr, indices) in groups {
            let sub_keys: Vec<String> = indices.iter().map(|&i| keys[i].clone()).collect();
            let sub_values: Vec<Vec<u8>> = indices.iter().map(|&i| values[i].clone()).collect();
            let pool = Arc::clone(&self.pool);
            let timeout = self.request_timeout;
            tasks.push(tokio::spawn(async move {
                let request = Message::MultiPutRequest {
                    keys: sub_keys,
                    values: sub_values,
                };
                let response = pool.request(&addr, &request, timeout).await?;
                match response {
                    Message::MultiPutResponse => Ok(()),
                    Message::ErrorResponse { message } => Err(ClientError::from_wire_message(&message)),
                    other => Err(unexpected(&other)),
                }
            }));
        }

        for task in futures::future::join_all(tasks).await {
            task.map_err(|e| ClientError::Server(e.to_string()))??;
        }
        Ok(())
    }

    /// Resolve every key to its owning server, refreshing once if any key
    /// misses, then group by server preserving each key's original index.
    async fn group_by_owner(&self, keys: &[String]) -> Result<HashMap<String, Vec<usize>>, ClientError> {
        let mut owners: Vec<Option<String>> = {
            let cached = self.cached.read().await;
            keys.iter().map(|k| cached.0.server_for(k).map(ToString::to_string)).collect()
        };
        if owners.iter().any(Option::is_none) {
            self.refresh().await?;
            let cached = self.cached.read().await;
            owners = keys.iter().map(|k| cached.0.server_for(k).map(ToString::to_string)).collect();
        }

        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, owner) in owners.into_iter().enumerate() {
            let addr = owner.ok_or(ClientError::NoOwner)?;
            groups.entry(addr).or_default().push(i);
        }
        Ok(groups)
    }
}

fn is_wrong_shard(response: &Message) -> bool {
    matches!(
        response,
        Message::ErrorResponse { message } if message == "server does not own the requested shard"
    )
}

fn unexpected(response: &Message) -> ClientError {
    ClientError::Server(format!("unexpected reply: {}", response.op_name()))
}
