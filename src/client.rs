//! WebSocket sync client for connecting to the collaboration server.
//!
//! Provides connection lifecycle, delta send, and an event stream the
//! embedding application consumes: the init snapshot, rebroadcast peer
//! updates, and presence changes. Edits made while disconnected are the
//! caller's problem — this layer makes no offline-sync promises.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::protocol::{Delta, Frame, ProtocolError, RecordMap, WireMessage};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Full room snapshot, received once after connecting
    Init { records: RecordMap },
    /// A delta rebroadcast from another participant
    RemoteUpdate { delta: Delta },
    /// The room's live participant list changed
    Presence { users: Vec<Uuid> },
}

/// The sync client.
///
/// Connects to `ws://host:port/<room_id>` and translates wire frames
/// into [`SyncEvent`]s on an mpsc channel.
pub struct SyncClient {
    room_id: String,
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    event_tx: mpsc::Sender<SyncEvent>,
}

impl SyncClient {
    /// Create a new sync client for a room.
    pub fn new(room_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            room_id: room_id.into(),
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("{}/{}", self.server_url, self.room_id);
        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(ok) => ok,
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel onto the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            // Channel drained: the client was dropped or disconnected.
            // Start the closing handshake so the server sees us leave.
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Reader task: decode frames into events.
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let event = match WireMessage::decode(text.as_str()) {
                            Ok(Frame::Message(WireMessage::Init { payload })) => {
                                Some(SyncEvent::Init { records: payload })
                            }
                            Ok(Frame::Message(WireMessage::Update { payload })) => {
                                Some(SyncEvent::RemoteUpdate { delta: payload })
                            }
                            Ok(Frame::Message(WireMessage::Presence { users })) => {
                                Some(SyncEvent::Presence { users })
                            }
                            Ok(Frame::Unknown(tag)) => {
                                log::debug!("Ignoring unknown frame type {tag:?} from server");
                                None
                            }
                            Err(e) => {
                                log::warn!("Dropping malformed frame from server: {e}");
                                None
                            }
                        };
                        if let Some(evt) = event {
                            let _ = event_tx.send(evt).await;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Send a delta to the server.
    pub async fn send_update(&self, delta: Delta) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }

        let frame = WireMessage::update(delta).encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx
                .send(frame)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Disconnect from the server.
    ///
    /// Dropping the client has the same effect; this just makes the
    /// intent explicit and updates the state immediately.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Get the current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Get the room id.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Get the server URL.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SyncClient::new("r1", "ws://localhost:9090");
        assert_eq!(client.room_id(), "r1");
        assert_eq!(client.server_url(), "ws://localhost:9090");
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = SyncClient::new("r1", "ws://localhost:9090");
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_update_while_disconnected_errors() {
        let client = SyncClient::new("r1", "ws://localhost:9090");
        let result = client.send_update(Delta::default()).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_take_event_rx_once() {
        let mut client = SyncClient::new("r1", "ws://localhost:9090");
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Nothing listens on this port; connect must fail cleanly.
        let mut client = SyncClient::new("r1", "ws://127.0.0.1:1");
        assert!(client.connect().await.is_err());
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }
}
