//! Integration tests for durable room state.
//!
//! The record store is the only state that survives session eviction;
//! these tests drive the full write path (update → fire-and-forget
//! persist) and the full read path (session recreation → init snapshot).

use std::sync::Arc;
use serde_json::json;
use slate_collab::client::{SyncClient, SyncEvent};
use slate_collab::protocol::{Delta, RecordMap};
use slate_collab::room::RoomRegistry;
use slate_collab::server::{ServerConfig, SyncServer};
use slate_collab::store::{RocksStore, RoomStore, StoreConfig};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a storage-backed server on a free port, return the port.
async fn start_persistent_server(path: std::path::PathBuf) -> u16 {
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        outbound_capacity: 64,
        storage_path: Some(path),
    };
    let server = SyncServer::new(config).unwrap();
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    port
}

/// Connect a client to a room, draining the Connected event.
async fn connect_client(room: &str, url: &str) -> (SyncClient, mpsc::Receiver<SyncEvent>) {
    let mut client = SyncClient::new(room, url);
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();
    match timeout(Duration::from_secs(2), events.recv()).await {
        Ok(Some(SyncEvent::Connected)) => {}
        other => panic!("Expected Connected event, got {other:?}"),
    }
    (client, events)
}

/// Wait for the init snapshot.
async fn wait_for_init(events: &mut mpsc::Receiver<SyncEvent>) -> RecordMap {
    loop {
        match timeout(Duration::from_secs(2), events.recv()).await {
            Ok(Some(SyncEvent::Init { records })) => return records,
            Ok(Some(_)) => continue,
            other => panic!("Timed out waiting for init, last: {other:?}"),
        }
    }
}

fn added(id: &str, value: serde_json::Value) -> Delta {
    Delta {
        added: [(id.to_string(), value)].into_iter().collect(),
        ..Delta::default()
    }
}

#[tokio::test]
async fn test_room_state_survives_session_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_persistent_server(dir.path().join("db")).await;
    let url = format!("ws://127.0.0.1:{port}");

    // First visit: draw something, then leave.
    {
        let (alice, mut events) = connect_client("board-1", &url).await;
        wait_for_init(&mut events).await;
        alice
            .send_update(added("shape1", json!({"kind": "rect", "w": 40})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    // All clients gone: the in-memory session is evicted once the close
    // lands. Give the server a moment to process it.
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Second visit recreates the session from the durable store.
    let (_bob, mut events) = connect_client("board-1", &url).await;
    let records = wait_for_init(&mut events).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records["shape1"], json!({"kind": "rect", "w": 40}));
}

#[tokio::test]
async fn test_unwritten_room_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_persistent_server(dir.path().join("db")).await;
    let url = format!("ws://127.0.0.1:{port}");

    let (_a, mut events) = connect_client("never-seen", &url).await;
    assert!(wait_for_init(&mut events).await.is_empty());
}

#[tokio::test]
async fn test_removals_are_durable() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_persistent_server(dir.path().join("db")).await;
    let url = format!("ws://127.0.0.1:{port}");

    {
        let (alice, mut events) = connect_client("board-1", &url).await;
        wait_for_init(&mut events).await;
        alice.send_update(added("a", json!(1))).await.unwrap();
        alice.send_update(added("b", json!(2))).await.unwrap();
        alice
            .send_update(Delta {
                removed: vec!["a".to_string()],
                ..Delta::default()
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (_bob, mut events) = connect_client("board-1", &url).await;
    let records = wait_for_init(&mut events).await;
    assert_eq!(records.len(), 1);
    assert!(records.contains_key("b"));
}

#[tokio::test]
async fn test_registry_persists_through_rocks_store() {
    // Drive the session hooks directly against RocksDB, no sockets.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("db");

    {
        let store: Arc<dyn RoomStore> =
            Arc::new(RocksStore::open(StoreConfig::for_testing(&db_path)).unwrap());
        let registry = RoomRegistry::new(Some(store));
        let room = registry.get_or_create("r1").await;

        let (tx, _rx) = tokio::sync::mpsc::channel(16);
        let conn_id = uuid::Uuid::new_v4();
        room.on_connect(slate_collab::room::ConnectionHandle::new(conn_id, tx)).await;

        let frame = slate_collab::protocol::WireMessage::update(added("persisted", json!(true)))
            .encode()
            .unwrap();
        room.on_message(conn_id, &frame).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        room.on_close(conn_id).await;
        registry.remove_if_empty("r1").await;
    }

    // Reopen the database cold and read what the session wrote.
    let store = RocksStore::open(StoreConfig::for_testing(&db_path)).unwrap();
    let records = store.read_all("r1").unwrap();
    assert_eq!(records["persisted"], json!(true));
}

#[tokio::test]
async fn test_rooms_isolated_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_persistent_server(dir.path().join("db")).await;
    let url = format!("ws://127.0.0.1:{port}");

    {
        let (a, mut events_a) = connect_client("room-a", &url).await;
        wait_for_init(&mut events_a).await;
        a.send_update(added("only_a", json!(1))).await.unwrap();
        let (b, mut events_b) = connect_client("room-b", &url).await;
        wait_for_init(&mut events_b).await;
        b.send_update(added("only_b", json!(2))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (_a2, mut events_a) = connect_client("room-a", &url).await;
    let records_a = wait_for_init(&mut events_a).await;
    assert!(records_a.contains_key("only_a"));
    assert!(!records_a.contains_key("only_b"));

    let (_b2, mut events_b) = connect_client("room-b", &url).await;
    let records_b = wait_for_init(&mut events_b).await;
    assert!(records_b.contains_key("only_b"));
    assert!(!records_b.contains_key("only_a"));
}

#[tokio::test]
async fn test_last_writer_wins_across_reconnects() {
    let dir = tempfile::tempdir().unwrap();
    let port = start_persistent_server(dir.path().join("db")).await;
    let url = format!("ws://127.0.0.1:{port}");

    {
        let (alice, mut events) = connect_client("board-1", &url).await;
        wait_for_init(&mut events).await;
        alice.send_update(added("s", json!({"v": 1}))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    {
        let (bob, mut events) = connect_client("board-1", &url).await;
        let records = wait_for_init(&mut events).await;
        assert_eq!(records["s"], json!({"v": 1}));
        bob.send_update(Delta {
            updated: [("s".to_string(), json!({"v": 2}))].into_iter().collect(),
            ..Delta::default()
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (_carol, mut events) = connect_client("board-1", &url).await;
    let records = wait_for_init(&mut events).await;
    assert_eq!(records["s"], json!({"v": 2}));
}
