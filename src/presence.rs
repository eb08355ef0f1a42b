//! Participant-list derivation for a room.
//!
//! Presence is a full-replace model: on every connect or disconnect the
//! room session recomputes the complete list of live connection ids and
//! broadcasts it to everyone, joiners and bystanders alike. No diffing —
//! rooms hold tens of participants, not thousands, and a full list keeps
//! clients stateless about membership.

use uuid::Uuid;

use crate::protocol::WireMessage;

/// Collect the live connection ids, sorted for deterministic frames.
///
/// The protocol promises only "exactly the currently live ids"; sorting is
/// a convenience so identical sets always produce identical frames.
pub fn participants<'a>(live: impl IntoIterator<Item = &'a Uuid>) -> Vec<Uuid> {
    let mut users: Vec<Uuid> = live.into_iter().copied().collect();
    users.sort();
    users
}

/// Build the `presence` frame for the current connection set.
pub fn recompute<'a>(live: impl IntoIterator<Item = &'a Uuid>) -> WireMessage {
    WireMessage::presence(participants(live))
}
