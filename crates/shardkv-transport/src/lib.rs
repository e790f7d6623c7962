// SPDX-License-Identifier: Apache-2.0
//! Deadline-bounded framed transport over `tokio` streams, plus a keep-alive
//! connection pool for clients and peer servers.

pub mod connection;
pub mod error;
pub mod pool;

pub use connection::{recv_message, send_message, FramedStream, DEFAULT_TIMEOUT};
pub use error::TransportError;
pub use pool::ConnectionPool;
