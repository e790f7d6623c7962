// SPDX-License-Identifier: Apache-2.0
//! The shard-scoped key-value map: the part of `KvServer` that touches the
//! actual data, kept free of any networking concern so it can be unit tested
//! directly.

use std::collections::HashMap;

use shardkv_proto::message::{KeyValue, ValueSlot};
use shardkv_proto::shard::Shard;

use crate::error::ServerError;

/// In-memory store restricted to the shards this server currently owns.
#[derive(Debug, Default)]
pub struct KvStore {
    owned: Vec<Shard>,
    map: HashMap<String, Vec<u8>>,
}

impl KvStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn owned_shards(&self) -> &[Shard] {
        &self.owned
    }

    fn owns(&self, key: &str) -> bool {
        self.owned.iter().any(|s| s.contains(key))
    }

    pub fn get(&self, key: &str) -> Result<Option<&[u8]>, ServerError> {
        if !self.owns(key) {
            return Err(ServerError::WrongShard);
        }
        Ok(self.map.get(key).map(Vec::as_slice))
    }

    pub fn put(&mut self, key: String, value: Vec<u8>) -> Result<(), ServerError> {
        if !self.owns(&key) {
            return Err(ServerError::WrongShard);
        }
        self.map.insert(key, value);
        Ok(())
    }

    pub fn append(&mut self, key: String, value: Vec<u8>) -> Result<(), ServerError> {
        if !self.owns(&key) {
            return Err(ServerError::WrongShard);
        }
        self.map.entry(key).or_default().extend_from_slice(&value);
        Ok(())
    }

    pub fn delete(&mut self, key: &str) -> Result<(), ServerError> {
        if !self.owns(key) {
            return Err(ServerError::WrongShard);
        }
        self.map.remove(key);
        Ok(())
    }

    /// All-or-nothing: every key must be owned, else no value is returned and
    /// no read occurs beyond the ownership check.
    pub fn multi_get(&self, keys: &[String]) -> Result<Vec<ValueSlot>, ServerError> {
        if keys.iter().any(|k| !self.owns(k)) {
            return Err(ServerError::WrongShard);
        }
        Ok(keys
            .iter()
            .map(|k| match self.map.get(k) {
                Some(v) => ValueSlot::Present(v.clone()),
                None => ValueSlot::Absent,
            })
            .collect())
    }

    /// All-or-nothing: lengths must match, every key must be owned, and
    /// either every write lands or none does.
    pub fn multi_put(&mut self, keys: &[String], values: &[Vec<u8>]) -> Result<(), ServerError> {
        if keys.len() != values.len() {
            return Err(ServerError::BadArgs("keys and values length mismatch".to_string()));
        }
        if keys.iter().any(|k| !self.owns(k)) {
            return Err(ServerError::WrongShard);
        }
        for (k, v) in keys.iter().zip(values.iter()) {
            self.map.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    /// Snapshot every resident key covered by `piece`, without removing them.
    pub fn snapshot(&self, piece: Shard) -> Vec<KeyValue> {
        self.map
            .iter()
            .filter(|(k, _)| piece.contains(k))
            .map(|(k, v)| KeyValue {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    /// Erase every resident key covered by `piece` and drop it from the
    /// owned-shard list. Called on the source side of a hand-off once the
    /// destination has acknowledged the bulk transfer.
    pub fn evict(&mut self, piece: Shard) {
        self.map.retain(|k, _| !piece.contains(k));
        self.owned.retain(|s| *s != piece);
    }

    /// Accept `items` for `piece`, adding it to the owned-shard list and
    /// inserting every item. Called on the destination side of a hand-off.
    pub fn accept_bulk(&mut self, piece: Shard, items: Vec<KeyValue>) {
        if !self.owned.contains(&piece) {
            self.owned.push(piece);
        }
        for item in items {
            self.map.insert(item.key, item.value);
        }
    }

    /// Undo a hand-off this server was mid-accepting: drop ownership of
    /// `piece` and every key it covers. Safe because a server never already
    /// owned a piece it is in the middle of accepting.
    pub fn abort_bulk(&mut self, piece: Shard) {
        self.owned.retain(|s| *s != piece);
        self.map.retain(|k, _| !piece.contains(k));
    }

    /// Add `shard` to the owned list directly (used when this server is
    /// `Join`ed with an initial assignment, or when syncing from the
    /// controller's configuration rather than a peer hand-off).
    pub fn adopt_shard(&mut self, shard: Shard) {
        if !self.owned.contains(&shard) {
            self.owned.push(shard);
        }
    }
}
