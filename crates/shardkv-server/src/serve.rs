// SPDX-License-Identifier: Apache-2.0
//! TCP accept loop for the storage server, mirroring
//! `shardkv-controller::serve` (itself grounded on `echo-session-service`'s
//! accept loop).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use shardkv_proto::message::Message;
use shardkv_proto::ProtoError;
use shardkv_transport::{FramedStream, TransportError};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::ServerError;
use crate::server::KvServer;

pub async fn serve(listen: SocketAddr, server: Arc<KvServer>, request_timeout: Duration) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(%listen, server = server.self_addr(), "storage server listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, &server, request_timeout).await {
                warn!(%peer, error = %err, "server connection ended");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    server: &KvServer,
    request_timeout: Duration,
) -> Result<(), TransportError> {
    let mut framed = FramedStream::new(stream);
    loop {
        let request = match framed.recv(request_timeout).await {
            Ok(msg) => msg,
            Err(TransportError::Closed) => return Ok(()),
            Err(err) => return Err(err),
        };
        let response = dispatch(server, request).await;
        framed.send(&response, request_timeout).await?;
    }
}

fn error_message(err: ServerError) -> Message {
    let proto: ProtoError = err.into();
    Message::ErrorResponse {
        message: proto.wire_message(),
    }
}

async fn dispatch(server: &KvServer, request: Message) -> Message {
    match request {
        Message::GetRequest { key } => match server.get(&key).await {
            Ok((value, present)) => Message::GetResponse { value, present },
            Err(err) => error_message(err),
        },
        Message::PutRequest { key, value } => match server.put(key, value).await {
            Ok(()) => Message::PutResponse,
            Err(err) => error_message(err),
        },
        Message::AppendRequest { key, value } => match server.append(key, value).await {
            Ok(()) => Message::AppendResponse,
            Err(err) => error_message(err),
        },
        Message::DeleteRequest { key } => match server.delete(&key).await {
            Ok(()) => Message::DeleteResponse,
            Err(err) => error_message(err),
        },
        Message::MultiGetRequest { keys } => match server.multi_get(&keys).await {
            Ok(values) => Message::MultiGetResponse { values },
            Err(err) => error_message(err),
        },
        Message::MultiPutRequest { keys, values } => match server.multi_put(&keys, &values).await {
            Ok(()) => Message::MultiPutResponse,
            Err(err) => error_message(err),
        },
        Message::ShardHandoffRequest { piece, dest } => match server.shard_handoff(piece, &dest).await {
            Ok(()) => Message::ShardHandoffResponse,
            Err(err) => error_message(err),
        },
        Message::BulkPutRequest { piece, items } => match server.bulk_put(piece, items).await {
            Ok(()) => Message::BulkPutResponse,
            Err(err) => error_message(err),
        },
        Message::AbortBulkRequest { piece } => match server.abort_bulk(piece).await {
            Ok(()) => Message::AbortBulkResponse,
            Err(err) => error_message(err),
        },
        other => error_message(ServerError::Internal(format!(
            "{} is not a storage-server operation",
            other.op_name()
        ))),
    }
}
