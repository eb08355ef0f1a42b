//! Durable room-scoped record storage.
//!
//! The room session consumes a [`RoomStore`]: read-all / write-all over one
//! room's full record map. Writes are idempotent full overwrites with atomic
//! swap semantics — a reader never observes a partial write. Incremental
//! patches were considered and rejected for simplicity; whiteboard rooms
//! hold tens-to-hundreds of records, not large datasets, and the full
//! overwrite is the documented scalability ceiling of this design.
//!
//! Backends:
//! - [`RocksStore`] — RocksDB, LZ4-compressed JSON snapshots per room
//! - [`MemoryStore`] — process-local, for tests and persistence-free runs

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{RocksStore, RoomMetadata, StoreConfig};

use crate::protocol::RecordMap;

/// Room-scoped durable storage.
///
/// A missing room is not an error: `read_all` returns an empty map, which
/// is indistinguishable from a brand-new room.
pub trait RoomStore: Send + Sync {
    /// Read the full record map for a room. Empty map if none exists.
    fn read_all(&self, room_id: &str) -> Result<RecordMap, StoreError>;

    /// Overwrite the full record map for a room atomically.
    fn write_all(&self, room_id: &str, records: &RecordMap) -> Result<(), StoreError>;

    /// Delete a room's stored state entirely.
    fn delete_room(&self, room_id: &str) -> Result<(), StoreError>;

    /// List all room ids with stored state.
    fn list_rooms(&self) -> Result<Vec<String>, StoreError>;
}

/// Storage errors.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    DatabaseError(String),
    /// Serialization failed
    SerializationError(String),
    /// Deserialization failed
    DeserializationError(String),
    /// Compression error
    CompressionError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::DatabaseError(e) => write!(f, "Database error: {e}"),
            StoreError::SerializationError(e) => write!(f, "Serialization error: {e}"),
            StoreError::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            StoreError::CompressionError(e) => write!(f, "Compression error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}
