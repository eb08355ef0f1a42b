//! WebSocket sync server with room-per-URL routing.
//!
//! Architecture:
//! ```text
//! ws://host:port/<room_id>
//!        │
//!        ▼
//! TcpListener ── accept ── connection task (one per socket)
//!                               │
//!                               ├── RoomRegistry::get_or_create(room_id)
//!                               │
//!                               └── RoomSession hooks:
//!                                     on_connect / on_message / on_close
//! ```
//!
//! The room id is the request path of the WebSocket handshake, so the
//! transport is room-scoped by construction. Each connection task owns
//! the socket: it forwards inbound text frames to the session and drains
//! the session's outbound queue back onto the socket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::room::{ConnectionHandle, RoomRegistry};
use crate::store::{RocksStore, RoomStore, StoreConfig, StoreError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Outbound frame queue capacity per connection
    pub outbound_capacity: usize,
    /// Persistence storage path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            outbound_capacity: 256,
            storage_path: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub active_rooms: usize,
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a new sync server with the given configuration.
    ///
    /// Opens the RocksDB store when a storage path is configured; rooms
    /// are otherwise served from memory only.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store: Option<Arc<dyn RoomStore>> = match &config.storage_path {
            Some(path) => {
                let store_config = StoreConfig {
                    path: path.clone(),
                    ..StoreConfig::default()
                };
                Some(Arc::new(RocksStore::open(store_config)?))
            }
            None => None,
        };

        Ok(Self {
            config,
            registry: Arc::new(RoomRegistry::new(store)),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        })
    }

    /// Create with default configuration (in-memory, no persistence).
    pub fn with_defaults() -> Self {
        let config = ServerConfig::default();
        Self {
            config,
            registry: Arc::new(RoomRegistry::new(None)),
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Create with persistence enabled at the given path.
    pub fn with_storage(
        bind_addr: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        Self::new(ServerConfig {
            bind_addr: bind_addr.into(),
            storage_path: Some(path.into()),
            ..ServerConfig::default()
        })
    }

    /// Start listening for WebSocket connections.
    ///
    /// This runs the server accept loop. Call from an async runtime.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Sync server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let stats = self.stats.clone();
            let outbound_capacity = self.config.outbound_capacity;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, registry, stats, outbound_capacity).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection for its whole lifetime.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<RoomRegistry>,
        stats: Arc<RwLock<ServerStats>>,
        outbound_capacity: usize,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Capture the request path during the handshake: that's the room.
        let mut path = String::new();
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            Ok(resp)
        })
        .await?;

        let room_id = path.trim_start_matches('/').to_string();
        if room_id.is_empty() {
            log::warn!("Rejecting connection from {addr}: no room id in path {path:?}");
            let mut ws_stream = ws_stream;
            let _ = ws_stream.close(None).await;
            return Ok(());
        }

        let conn_id = Uuid::new_v4();
        log::info!("WebSocket connection {conn_id} from {addr} for room {room_id}");

        let session = registry.get_or_create(&room_id).await;
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(outbound_capacity);

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
            s.active_rooms = registry.room_count().await;
        }

        session.on_connect(ConnectionHandle::new(conn_id, outbound_tx)).await;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                // Outbound frames queued by the room session
                frame = outbound_rx.recv() => {
                    match frame {
                        Some(text) => {
                            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                // Inbound WebSocket messages
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                            }
                            session.on_message(conn_id, text.as_str()).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            // Protocol is JSON text; binary frames are malformed.
                            log::warn!("Dropping binary frame from {conn_id} in room {room_id}");
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if ws_sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection {conn_id} closed from {addr}");
                            break;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        // Cleanup always runs, whatever ended the loop.
        let room_empty = session.on_close(conn_id).await;
        if room_empty {
            registry.remove_if_empty(&room_id).await;
        }

        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = registry.room_count().await;
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the room registry.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Live sessions snapshot: room id → connection count.
    pub async fn room_occupancy(&self) -> HashMap<String, usize> {
        let mut occupancy = HashMap::new();
        for room_id in self.registry.active_rooms().await {
            if let Some(session) = self.registry.get(&room_id).await {
                occupancy.insert(room_id, session.connection_count().await);
            }
        }
        occupancy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.outbound_capacity, 256);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_server_creation() {
        let server = SyncServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert!(server.registry().store().is_none());
    }

    #[test]
    fn test_server_custom_config() {
        let config = ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            outbound_capacity: 512,
            storage_path: None,
        };
        let server = SyncServer::new(config).unwrap();
        assert_eq!(server.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_server_with_storage() {
        let dir = tempfile::tempdir().unwrap();
        let server = SyncServer::with_storage("127.0.0.1:0", dir.path().join("db")).unwrap();
        assert!(server.registry().store().is_some());
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SyncServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.active_rooms, 0);
    }

    #[tokio::test]
    async fn test_room_occupancy_empty() {
        let server = SyncServer::with_defaults();
        assert!(server.room_occupancy().await.is_empty());
    }
}
