// SPDX-License-Identifier: Apache-2.0
//! End-to-end `Move` tests driven through a real shardcontroller over TCP,
//! covering both of §4.4.1's paths: bootstrapping a previously unowned range
//! straight onto a destination, and a genuine peer-to-peer hand-off between
//! two live servers.

use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;
use std::time::Duration;

use shardkv_controller::{serve as serve_controller, ControllerState};
use shardkv_proto::message::Message;
use shardkv_proto::shard::Shard;
use shardkv_server::{serve as serve_server, KvServer};
use shardkv_transport::{FramedStream, DEFAULT_TIMEOUT};
use tokio::net::TcpStream;

fn free_addr() -> String {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

async fn spawn_controller() -> String {
    let addr = free_addr();
    let state = Arc::new(ControllerState::new(DEFAULT_TIMEOUT));
    let listen: std::net::SocketAddr = addr.parse().unwrap();
    tokio::spawn(async move {
        let _ = serve_controller(listen, state, DEFAULT_TIMEOUT).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

async fn spawn_joined_server(controller_addr: &str) -> (String, Arc<KvServer>) {
    let addr = free_addr();
    let server = Arc::new(KvServer::new(addr.clone(), controller_addr.to_string(), DEFAULT_TIMEOUT));
    server.start(Duration::from_millis(50)).await.unwrap();
    let listen: std::net::SocketAddr = addr.parse().unwrap();
    tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            let _ = serve_server(listen, server, DEFAULT_TIMEOUT).await;
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    (addr, server)
}

async fn connect(addr: &str) -> FramedStream<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    FramedStream::new(stream)
}

async fn mv(controller_addr: &str, dest: &str, shards: Vec<Shard>) {
    let mut conn = connect(controller_addr).await;
    let response = conn
        .roundtrip(&Message::MoveRequest { dest: dest.to_string(), shards }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(response, Message::MoveResponse);
}

#[tokio::test]
async fn move_of_an_unowned_shard_bootstraps_ownership_through_config_sync() {
    let controller_addr = spawn_controller().await;
    let (dest_addr, dest) = spawn_joined_server(&controller_addr).await;

    mv(&controller_addr, &dest_addr, vec![Shard::new(b'0', b'9')]).await;

    // no peer hand-off happens for a bootstrap move: the destination only
    // learns about it by polling the controller's configuration.
    assert!(dest.owned_shards().await.is_empty());
    dest.sync_configuration().await.unwrap();
    assert_eq!(dest.owned_shards().await, vec![Shard::new(b'0', b'9')]);

    let mut conn = connect(&dest_addr).await;
    let put = conn
        .roundtrip(
            &Message::PutRequest {
                key: "1key".to_string(),
                value: b"bootstrapped".to_vec(),
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
            value: b"bootstrapped".to_vec(),
            present: true,
        }
    );
}

#[tokio::test]
async fn move_between_two_members_hands_off_peer_to_peer() {
    let controller_addr = spawn_controller().await;
    let (source_addr, source) = spawn_joined_server(&controller_addr).await;
    let (dest_addr, dest) = spawn_joined_server(&controller_addr).await;

    // bootstrap the whole alphabet onto source first.
    mv(&controller_addr, &source_addr, vec![Shard::full()]).await;
    source.sync_configuration().await.unwrap();

    let mut conn = connect(&source_addr).await;
    conn.roundtrip(
        &Message::PutRequest {
            key: "1key".to_string(),
            value: b"on-source".to_vec(),
        },
        DEFAULT_TIMEOUT,
    )
    .await
    .unwrap();

    // now move the digit range from source to dest: this goes through a real
    // peer-to-peer ShardHandoff/BulkPut round trip, not a config-sync poll.
    mv(&controller_addr, &dest_addr, vec![Shard::new(b'0', b'9')]).await;

    assert_eq!(source.owned_shards().await, vec![Shard::new(b'A', b'Z')]);
    assert_eq!(dest.owned_shards().await, vec![Shard::new(b'0', b'9')]);

    let mut dest_conn = connect(&dest_addr).await;
    let get = dest_conn
        .roundtrip(&Message::GetRequest { key: "1key".to_string() }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        get,
        Message::GetResponse {
            value: b"on-source".to_vec(),
            present: true,
        }
    );

    let source_get = conn
        .roundtrip(&Message::GetRequest { key: "1key".to_string() }, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(source_get, Message::ErrorResponse {
        message: "server does not own the requested shard".to_string(),
    });
}
