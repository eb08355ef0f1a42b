//! In-memory [`RoomStore`] backend.
//!
//! Used by tests and by servers configured without a storage path. State
//! dies with the process, which matches the "persistence-free deployment"
//! mode: rooms simply start empty after a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{RoomStore, StoreError};
use crate::protocol::RecordMap;

/// Process-local room storage.
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, RecordMap>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Number of rooms with stored state.
    pub fn room_count(&self) -> usize {
        self.rooms.read().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStore for MemoryStore {
    fn read_all(&self, room_id: &str) -> Result<RecordMap, StoreError> {
        let rooms = self
            .rooms
            .read()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(rooms.get(room_id).cloned().unwrap_or_default())
    }

    fn write_all(&self, room_id: &str, records: &RecordMap) -> Result<(), StoreError> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        rooms.insert(room_id.to_string(), records.clone());
        Ok(())
    }

    fn delete_room(&self, room_id: &str) -> Result<(), StoreError> {
        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        rooms.remove(room_id);
        Ok(())
    }

    fn list_rooms(&self) -> Result<Vec<String>, StoreError> {
        let rooms = self
            .rooms
            .read()
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(rooms.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_missing_room_is_empty() {
        let store = MemoryStore::new();
        let records = store.read_all("nope").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_write_read_roundtrip() {
        let store = MemoryStore::new();
        let mut records = RecordMap::new();
        records.insert("shape1".into(), json!({"kind": "rect"}));

        store.write_all("r1", &records).unwrap();
        assert_eq!(store.read_all("r1").unwrap(), records);
    }

    #[test]
    fn test_write_is_full_overwrite() {
        let store = MemoryStore::new();
        let mut first = RecordMap::new();
        first.insert("a".into(), json!(1));
        first.insert("b".into(), json!(2));
        store.write_all("r1", &first).unwrap();

        let mut second = RecordMap::new();
        second.insert("c".into(), json!(3));
        store.write_all("r1", &second).unwrap();

        let read = store.read_all("r1").unwrap();
        assert_eq!(read.len(), 1);
        assert!(read.contains_key("c"));
    }

    #[test]
    fn test_rooms_are_isolated() {
        let store = MemoryStore::new();
        let mut a = RecordMap::new();
        a.insert("only_in_a".into(), json!(true));
        store.write_all("a", &a).unwrap();

        assert!(store.read_all("b").unwrap().is_empty());
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn test_delete_room() {
        let store = MemoryStore::new();
        store.write_all("r1", &RecordMap::new()).unwrap();
        assert_eq!(store.list_rooms().unwrap(), vec!["r1".to_string()]);

        store.delete_room("r1").unwrap();
        assert!(store.list_rooms().unwrap().is_empty());
        // Deleting again is a no-op
        store.delete_room("r1").unwrap();
    }
}
