// SPDX-License-Identifier: Apache-2.0
//! A small keep-alive connection pool keyed by server address.
//!
//! Amortizes the TCP handshake cost of repeated requests from a single
//! client or peer. A connection that produced a `Timeout`, `Closed`, or
//! `Malformed` failure is dropped rather than returned to the pool, since its
//! framing state can no longer be trusted to start at a frame boundary.

use std::collections::HashMap;
use std::time::Duration;

use shardkv_proto::message::Message;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::connection::{FramedStream, DEFAULT_TIMEOUT};
use crate::error::TransportError;

/// Pools one live [`FramedStream`] per server address.
pub struct ConnectionPool {
    connect_timeout: Duration,
    conns: Mutex<HashMap<String, FramedStream<TcpStream>>>,
}

impl ConnectionPool {
    /// Build an empty pool; `connect_timeout` bounds each new TCP connect.
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// Send `request` to `addr` over a pooled connection (connecting fresh if
    /// none is cached), bounded by `timeout`, and return its response.
    ///
    /// On `Timeout`, `Closed`, or `Malformed`, the connection is dropped
    /// rather than pooled for reuse.
    pub async fn request(&self, addr: &str, request: &Message, timeout: Duration) -> Result<Message, TransportError> {
        let mut conn = self.take_or_connect(addr).await?;
        match conn.roundtrip(request, timeout).await {
            Ok(response) => {
                self.conns.lock().await.insert(addr.to_string(), conn);
                Ok(response)
            }
            Err(err) => Err(err),
        }
    }

    async fn take_or_connect(&self, addr: &str) -> Result<FramedStream<TcpStream>, TransportError> {
        if let Some(conn) = self.conns.lock().await.remove(addr) {
            return Ok(conn);
        }
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_elapsed| TransportError::Timeout)??;
        Ok(FramedStream::new(stream))
    }

    /// Drop every pooled connection, e.g. after a configuration refresh that
    /// invalidates prior routing assumptions.
    pub async fn clear(&self) {
        self.conns.lock().await.clear();
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}
