//! JSON wire protocol for whiteboard record synchronization.
//!
//! Frames are JSON text messages, discriminated by a `type` tag:
//! ```text
//! server → joiner   {"type":"init","payload":{<record id>:<value>, …}}
//! client → server   {"type":"update","payload":{"added":{…},"updated":{…},"removed":[…]}}
//! server → peers    the original "update" frame, retransmitted verbatim
//! server → room     {"type":"presence","users":[<connection id>, …]}
//! ```
//!
//! All three parts of an update are optional. Record values are opaque
//! JSON — the server never inspects them beyond (de)serialization.
//! Unknown `type` tags decode to [`Frame::Unknown`] so that newer clients
//! can talk to older servers without being disconnected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// The full record mapping for one room: record id → opaque value.
pub type RecordMap = HashMap<String, Value>;

/// A batch of record changes from one client edit.
///
/// Conflict policy is last-writer-wins per record id: whichever delta the
/// room session applies later overwrites earlier values wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Newly created records
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub added: RecordMap,
    /// Overwritten records
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub updated: RecordMap,
    /// Deleted record ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
}

impl Delta {
    /// True when all three parts are empty. Empty deltas are still
    /// rebroadcast but never persisted.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Apply this delta to a record map: insert `added`, overwrite
    /// `updated`, then delete `removed`.
    pub fn apply(&self, records: &mut RecordMap) {
        for (id, value) in &self.added {
            records.insert(id.clone(), value.clone());
        }
        for (id, value) in &self.updated {
            records.insert(id.clone(), value.clone());
        }
        for id in &self.removed {
            records.remove(id);
        }
    }
}

/// Top-level protocol message. Exactly three kinds exist on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// Full room state, sent to a connection once on join.
    Init { payload: RecordMap },
    /// An incremental change, client-originated.
    Update { payload: Delta },
    /// Full-replace list of live connection ids in the room.
    Presence { users: Vec<Uuid> },
}

impl WireMessage {
    /// Create an init snapshot message.
    pub fn init(payload: RecordMap) -> Self {
        Self::Init { payload }
    }

    /// Create an update message carrying a delta.
    pub fn update(payload: Delta) -> Self {
        Self::Update { payload }
    }

    /// Create a presence message listing live connection ids.
    pub fn presence(users: Vec<Uuid>) -> Self {
        Self::Presence { users }
    }

    /// Serialize to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize a JSON text frame.
    ///
    /// A frame with a recognized `type` tag but an invalid body is an
    /// error (malformed — the caller drops and logs it). A frame with an
    /// unrecognized tag decodes to [`Frame::Unknown`] and is ignored by
    /// callers.
    pub fn decode(text: &str) -> Result<Frame, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        match tag.as_str() {
            "init" | "update" | "presence" => serde_json::from_value(value)
                .map(Frame::Message)
                .map_err(|e| ProtocolError::DeserializationError(e.to_string())),
            other => Ok(Frame::Unknown(other.to_string())),
        }
    }
}

/// Decode result: a known message, or an unknown-but-well-formed tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(WireMessage),
    Unknown(String),
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    /// Frame is valid JSON but has no string `type` field
    MissingType,
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::MissingType => write!(f, "Frame has no message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}
