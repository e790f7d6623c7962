// SPDX-License-Identifier: Apache-2.0
//! Deadline-bounded framed send/recv over any `tokio` async stream.
//!
//! Grounded on `echo-session-ws-gateway`'s accumulator loop
//! (`try_extract_frame`/`try_frame_len`) for draining a streaming socket one
//! frame at a time, and on its use of `tokio::time::timeout` around upstream
//! I/O for the total-deadline behavior.

use std::time::Duration;

use shardkv_proto::message::Message;
use shardkv_proto::wire::{self, HEADER_BYTES};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use crate::error::TransportError;

/// Default total deadline for one send or one recv, per the wire framing
/// section's 400 ms default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(400);

/// Size of the chunks read off the socket while filling the accumulator.
const READ_CHUNK: usize = 4096;

/// Encode `msg` and write the complete frame to `writer`, bounded by
/// `timeout` for the whole write.
pub async fn send_message<W>(writer: &mut W, msg: &Message, timeout: Duration) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = wire::encode_frame(msg);
    match time::timeout(timeout, writer.write_all(&frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TransportError::Io(err)),
        Err(_elapsed) => Err(TransportError::Timeout),
    }
}

/// Read one complete frame from `reader` and decode it, bounded by `timeout`
/// for the whole read. Unlike [`FramedStream::recv`], this does not retain
/// any accumulator across calls — it is meant for one-shot request/response
/// helpers where each call owns the stream for its duration.
pub async fn recv_message<R>(reader: &mut R, timeout: Duration) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    time::timeout(timeout, recv_message_inner(reader))
        .await
        .map_err(|_elapsed| TransportError::Timeout)?
}

async fn recv_message_inner<R>(reader: &mut R) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut acc = Vec::with_capacity(HEADER_BYTES);
    loop {
        if let Some(msg) = wire::try_extract_frame(&mut acc)? {
            return Ok(msg);
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        acc.extend_from_slice(&chunk[..n]);
    }
}

/// A socket paired with a growable read accumulator, for connections that
/// stay open across several request/response round trips (the connection
/// pool's pooled entries, and the controller/server accept loops).
pub struct FramedStream<S> {
    stream: S,
    acc: Vec<u8>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream` with an empty accumulator.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            acc: Vec::new(),
        }
    }

    /// Encode and send one message, bounded by `timeout`.
    pub async fn send(&mut self, msg: &Message, timeout: Duration) -> Result<(), TransportError> {
        send_message(&mut self.stream, msg, timeout).await
    }

    /// Drain one complete frame from the accumulator, reading more bytes off
    /// the socket as needed, bounded by `timeout` for the whole operation.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Message, TransportError> {
        time::timeout(timeout, self.recv_inner())
            .await
            .map_err(|_elapsed| TransportError::Timeout)?
    }

    async fn recv_inner(&mut self) -> Result<Message, TransportError> {
        loop {
            if let Some(msg) = wire::try_extract_frame(&mut self.acc)? {
                return Ok(msg);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.acc.extend_from_slice(&chunk[..n]);
        }
    }

    /// Send `request` and wait for the matching response, as a single
    /// deadline-bounded round trip.
    pub async fn roundtrip(&mut self, request: &Message, timeout: Duration) -> Result<Message, TransportError> {
        self.send(request, timeout).await?;
        self.recv(timeout).await
    }

    /// Unwrap back to the raw stream, discarding any buffered partial frame.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardkv_proto::message::Message;
    use tokio::io::duplex;

    #[tokio::test]
    async fn roundtrip_over_an_in_memory_duplex_stream() {
        let (client_io, server_io) = duplex(4096);
        let mut client = FramedStream::new(client_io);
        let mut server = FramedStream::new(server_io);

        let request = Message::GetRequest { key: "alpha".to_string() };
        let request_clone = request.clone();
        let server_task = tokio::spawn(async move {
            let got = server.recv(DEFAULT_TIMEOUT).await.unwrap();
            assert_eq!(got, request_clone);
            server
                .send(
                    &Message::GetResponse {
                        value: b"value".to_vec(),
                        present: true,
                    },
                    DEFAULT_TIMEOUT,
                )
                .await
                .unwrap();
        });

        let response = client.roundtrip(&request, DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(
            response,
            Message::GetResponse {
                value: b"value".to_vec(),
                present: true,
            }
        );
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn recv_fails_with_closed_when_peer_drops_mid_frame() {
        let (client_io, server_io) = duplex(4096);
        let mut client = FramedStream::new(client_io);
        drop(server_io);
        let err = client.recv(DEFAULT_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn recv_fails_with_timeout_when_nothing_arrives() {
        let (client_io, _server_io) = duplex(4096);
        let mut client = FramedStream::new(client_io);
        let err = client.recv(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }
}
