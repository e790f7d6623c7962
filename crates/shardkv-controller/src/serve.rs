// SPDX-License-Identifier: Apache-2.0
//! TCP accept loop for the shardcontroller, one spawned task per connection.
//!
//! Grounded on `echo-session-service`'s accept loop: bind once, spawn a task
//! per accepted stream, and let each task own a [`FramedStream`] for the
//! life of that connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shardkv_proto::message::Message;
use shardkv_transport::{FramedStream, TransportError};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::ControllerError;
use crate::state::{error_to_message, ControllerState};

/// Bind `listen` and serve controller requests forever (until the listener
/// itself errors).
pub async fn serve(listen: SocketAddr, state: Arc<ControllerState>, request_timeout: Duration) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(%listen, "shardcontroller listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &state, request_timeout).await {
                warn!(%peer, error = %err, "controller connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: &ControllerState,
    request_timeout: Duration,
) -> Result<(), TransportError> {
    let mut framed = FramedStream::new(stream);
    loop {
        let request = match framed.recv(request_timeout).await {
            Ok(msg) => msg,
            Err(TransportError::Closed) => return Ok(()),
            Err(err) => return Err(err),
        };
        let response = dispatch(state, request).await;
        framed.send(&response, request_timeout).await?;
    }
}

async fn dispatch(state: &ControllerState, request: Message) -> Message {
    match request {
        Message::JoinRequest { server } => match state.join(&server).await {
            Ok(()) => Message::JoinResponse,
            Err(err) => error_to_message(err),
        },
        Message::LeaveRequest { server } => match state.leave(&server).await {
            Ok(()) => Message::LeaveResponse,
            Err(err) => error_to_message(err),
        },
        Message::MoveRequest { dest, shards } => match state.mv(&dest, shards).await {
            Ok(()) => Message::MoveResponse,
            Err(err) => error_to_message(err),
        },
        Message::QueryRequest => {
            let (configuration, epoch) = state.query().await;
            Message::QueryResponse { configuration, epoch }
        }
        other => error_to_message(ControllerError::Unsupported(format!(
            "{} is not a controller operation",
            other.op_name()
        ))),
    }
}
