//! Room sessions: the single authority over one room's shared state.
//!
//! Architecture:
//! ```text
//! Client A ──┐
//!             ├── RoomSession (room_id) ── RecordMap (in-memory)
//! Client B ──┘          │                      │
//!                       │                      └── RoomStore (RocksDB)
//!                       │                             fire-and-forget write_all
//!                       └── connections: conn_id → outbound queue
//! ```
//!
//! Every event for a room — connect, message, close — runs under that
//! room's mutex, so deltas are applied strictly sequentially and
//! last-writer-wins is well defined: the delta processed later always
//! wins ties. Rooms are fully independent; no cross-room coordination.
//!
//! Rebroadcast happens before persistence is issued. Persistence is a
//! spawned fire-and-forget task per delta; the last write to complete
//! wins on disk, matching the record-level conflict policy. A write
//! failure is logged and never rolls back the in-memory state or the
//! broadcast — durability is best-effort, delivery latency is not.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use uuid::Uuid;

use crate::presence;
use crate::protocol::{Frame, RecordMap, WireMessage};
use crate::store::RoomStore;

/// A registered connection: its id plus the outbound frame queue drained
/// by the transport task.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(id: Uuid, outbound: mpsc::Sender<String>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame for delivery. Never blocks the room event loop: a
    /// full queue drops the frame and logs, a closed queue is left for
    /// the close event to clean up.
    pub fn send(&self, frame: &str) {
        match self.outbound.try_send(frame.to_owned()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Connection {} outbound queue full, dropping frame", self.id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Mutable per-room state, guarded by the session mutex.
struct SessionState {
    /// Live connections in this room
    connections: HashMap<Uuid, ConnectionHandle>,
    /// Authoritative in-memory record map
    records: RecordMap,
    /// Whether the durable store has been read yet
    loaded: bool,
}

/// One room's session: owns the record map and the connection set, and
/// applies the synchronization protocol to every event it is handed.
pub struct RoomSession {
    room_id: String,
    store: Option<Arc<dyn RoomStore>>,
    state: Mutex<SessionState>,
}

impl RoomSession {
    pub fn new(room_id: impl Into<String>, store: Option<Arc<dyn RoomStore>>) -> Self {
        Self {
            room_id: room_id.into(),
            store,
            state: Mutex::new(SessionState {
                connections: HashMap::new(),
                records: RecordMap::new(),
                loaded: false,
            }),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Register a new connection.
    ///
    /// Loads the durable state on the first connect (failing open to an
    /// empty room if the read errors — the store is the only source of
    /// truth, so there is nothing better to do than log and carry on),
    /// sends the `init` snapshot to the joiner only, then broadcasts
    /// presence to the whole room including the joiner.
    pub async fn on_connect(&self, handle: ConnectionHandle) {
        let mut state = self.state.lock().await;

        if !state.loaded {
            if let Some(store) = &self.store {
                match store.read_all(&self.room_id) {
                    Ok(records) => state.records = records,
                    Err(e) => {
                        log::warn!(
                            "Failed to read stored state for room {}, starting empty: {e}",
                            self.room_id
                        );
                    }
                }
            }
            state.loaded = true;
        }

        let conn_id = handle.id();
        state.connections.insert(conn_id, handle);
        log::info!(
            "Connection {conn_id} joined room {} ({} live)",
            self.room_id,
            state.connections.len()
        );

        // Init snapshot reflects every delta already applied in memory.
        let init = WireMessage::init(state.records.clone());
        match init.encode() {
            Ok(frame) => {
                if let Some(conn) = state.connections.get(&conn_id) {
                    conn.send(&frame);
                }
            }
            Err(e) => log::error!("Failed to encode init for room {}: {e}", self.room_id),
        }

        Self::broadcast_presence(&state, &self.room_id);
    }

    /// Handle an inbound frame from a registered connection.
    ///
    /// Only `update` is structurally significant. The raw frame is
    /// rebroadcast verbatim to every other connection *before* the delta
    /// is applied and persisted, to keep peer-observed latency low.
    /// Malformed frames are dropped and logged; unknown tags are a no-op.
    pub async fn on_message(&self, sender: Uuid, raw: &str) {
        let mut state = self.state.lock().await;

        let delta = match WireMessage::decode(raw) {
            Ok(Frame::Message(WireMessage::Update { payload })) => payload,
            Ok(Frame::Message(other)) => {
                log::debug!(
                    "Ignoring server-only message from {sender} in room {}: {other:?}",
                    self.room_id
                );
                return;
            }
            Ok(Frame::Unknown(tag)) => {
                log::debug!("Ignoring unknown message type {tag:?} in room {}", self.room_id);
                return;
            }
            Err(e) => {
                log::warn!("Dropping malformed frame from {sender} in room {}: {e}", self.room_id);
                return;
            }
        };

        for (id, conn) in &state.connections {
            if *id != sender {
                conn.send(raw);
            }
        }

        delta.apply(&mut state.records);

        if !delta.is_empty() {
            if let Some(store) = &self.store {
                let store = store.clone();
                let room_id = self.room_id.clone();
                let snapshot = state.records.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.write_all(&room_id, &snapshot) {
                        log::error!("Failed to persist room {room_id}: {e}");
                    }
                });
            }
        }
    }

    /// Deregister a connection and broadcast presence to the remainder.
    ///
    /// Idempotent: closing an unknown or already-removed connection is a
    /// no-op. Returns true when the room has no live connections left.
    pub async fn on_close(&self, conn_id: Uuid) -> bool {
        let mut state = self.state.lock().await;

        if state.connections.remove(&conn_id).is_some() {
            log::info!(
                "Connection {conn_id} left room {} ({} live)",
                self.room_id,
                state.connections.len()
            );
            Self::broadcast_presence(&state, &self.room_id);
        }

        state.connections.is_empty()
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Copy of the current in-memory record map.
    pub async fn records(&self) -> RecordMap {
        self.state.lock().await.records.clone()
    }

    fn broadcast_presence(state: &SessionState, room_id: &str) {
        let frame = match presence::recompute(state.connections.keys()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to encode presence for room {room_id}: {e}");
                return;
            }
        };
        for conn in state.connections.values() {
            conn.send(&frame);
        }
    }
}

/// Registry of live room sessions, keyed by room id.
///
/// Sessions are created lazily on first connect and dropped once empty;
/// the durable store outlives them, so eviction is always safe.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<RoomSession>>>,
    store: Option<Arc<dyn RoomStore>>,
}

impl RoomRegistry {
    pub fn new(store: Option<Arc<dyn RoomStore>>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Get or create the session for a room.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<RoomSession> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        // Slow path: write lock, re-check after acquiring
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(RoomSession::new(room_id, self.store.clone()));
        rooms.insert(room_id.to_string(), room.clone());
        room
    }

    /// Look up an existing session without creating one.
    pub async fn get(&self, room_id: &str) -> Option<Arc<RoomSession>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Drop a session with no live connections. Returns true if removed.
    pub async fn remove_if_empty(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            if room.connection_count().await == 0 {
                rooms.remove(room_id);
                log::info!("Room {room_id} removed (empty)");
                return true;
            }
        }
        false
    }

    /// Number of live sessions.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Ids of all live sessions.
    pub async fn active_rooms(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// The durable store backing new sessions, if configured.
    pub fn store(&self) -> Option<&Arc<dyn RoomStore>> {
        self.store.as_ref()
    }
}
