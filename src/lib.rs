//! # slate-collab — Real-time whiteboard synchronization
//!
//! Room-scoped multiplayer editing over WebSockets with last-writer-wins
//! record semantics and durable per-room snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │    JSON frames      │ (central)   │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                     ┌──────┴──────┐
//!                                     │ RoomSession │  one per room,
//!                                     │ (authority) │  events serialized
//!                                     └──────┬──────┘
//!                                            │
//!                                  ┌─────────┴─────────┐
//!                                  │ RecordMap (memory)│
//!                                  │ RoomStore (Rocks) │
//!                                  └───────────────────┘
//! ```
//!
//! A client joins a room by connecting to `ws://host:port/<room_id>`. The
//! server replies with an `init` snapshot of the room's records, then
//! rebroadcasts every peer's `update` delta verbatim to everyone else and
//! keeps a `presence` list of live connections flowing to all of them.
//! Deltas for one room are applied strictly in arrival order; conflicts
//! on the same record id resolve last-writer-wins, with no operational
//! merge.
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire protocol (`init` / `update` / `presence`)
//! - [`room`] — room sessions, connection bookkeeping, room registry
//! - [`presence`] — participant-list derivation
//! - [`store`] — durable room snapshots (RocksDB) + in-memory backend
//! - [`server`] — WebSocket sync server
//! - [`client`] — WebSocket sync client

pub mod protocol;
pub mod presence;
pub mod store;
pub mod room;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use protocol::{Delta, Frame, ProtocolError, RecordMap, WireMessage};
pub use room::{ConnectionHandle, RoomRegistry, RoomSession};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use client::{ConnectionState, SyncClient, SyncEvent};
pub use store::{MemoryStore, RocksStore, RoomMetadata, RoomStore, StoreConfig, StoreError};
