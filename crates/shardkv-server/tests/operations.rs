// SPDX-License-Identifier: Apache-2.0
//! End-to-end request/response tests against a real `KvServer` accept loop,
//! driven over loopback TCP through `shardkv-transport`.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use shardkv_proto::message::{Message, ValueSlot};
use shardkv_proto::shard::Shard;
use shardkv_server::KvServer;
use shardkv_transport::{FramedStream, DEFAULT_TIMEOUT};
use tokio::net::TcpStream;

fn free_addr() -> String {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn spawn_server_owning(shard: Shard) -> String {
    let addr = free_addr();
    let server = Arc::new(KvServer::new(addr.clone(), "unused:0".to_string(), DEFAULT_TIMEOUT));
    // grant ownership directly via a bulk accept rather than a real controller round trip
    server.bulk_put(shard, Vec::new()).await.unwrap();
    let listen: std::net::SocketAddr = addr.parse().unwrap();
    tokio::spawn(async move {
        let _ = shardkv_server::serve(listen, server, DEFAULT_TIMEOUT).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

async fn connect(addr: &str) -> FramedStream<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    FramedStream::new(stream)
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let addr = spawn_server_owning(Shard::new(b'0', b'9')).await;
    let mut conn = connect(&addr).await;

    let put = conn
        .roundtrip(
            &Message::PutRequest {
                key: "1key".to_string(),
                value: b"value".to_vec(),
            },
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(put, Message::PutResponse);

    let get = conn
        .roundtrip(&Message::GetRequest { key: "1key".to_string() }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        get,
        Message::GetResponse {
            value: b"value".to_vec(),
            present: true,
        }
    );
}

#[tokio::test]
async fn get_outside_owned_shard_is_wrong_shard() {
    let addr = spawn_server_owning(Shard::new(b'0', b'9')).await;
    let mut conn = connect(&addr).await;

    let response = conn
        .roundtrip(&Message::GetRequest { key: "zkey".to_string() }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        response,
        Message::ErrorResponse {
            message: "server does not own the requested shard".to_string()
        }
    );
}

#[tokio::test]
async fn multi_put_then_multi_get_preserve_order() {
    let addr = spawn_server_owning(Shard::new(b'0', b'9')).await;
    let mut conn = connect(&addr).await;

    let multi_put = conn
        .roundtrip(
            &Message::MultiPutRequest {
                keys: vec!["1a".to_string(), "2b".to_string()],
                values: vec![b"va".to_vec(), b"vb".to_vec()],
            },
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(multi_put, Message::MultiPutResponse);

    let multi_get = conn
        .roundtrip(
            &Message::MultiGetRequest {
                keys: vec!["2b".to_string(), "1a".to_string(), "3c".to_string()],
            },
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(
        multi_get,
        Message::MultiGetResponse {
            values: vec![
                ValueSlot::Present(b"vb".to_vec()),
                ValueSlot::Present(b"va".to_vec()),
                ValueSlot::Absent,
            ]
        }
    );
}

#[tokio::test]
async fn append_to_missing_key_creates_it() {
    let addr = spawn_server_owning(Shard::new(b'0', b'9')).await;
    let mut conn = connect(&addr).await;

    let response = conn
        .roundtrip(
            &Message::AppendRequest {
                key: "1new".to_string(),
                value: b"hello".to_vec(),
            },
            DEFAULT_TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(response, Message::AppendResponse);

    let get = conn
        .roundtrip(&Message::GetRequest { key: "1new".to_string() }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        get,
        Message::GetResponse {
            value: b"hello".to_vec(),
            present: true,
        }
    );
}
