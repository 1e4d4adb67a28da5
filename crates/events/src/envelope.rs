use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tallyup_core::GroupId;

/// Envelope for an event, containing stream metadata.
///
/// This is the unit a persistence collaborator appends to a group's stream.
/// `sequence_number` is monotonically increasing per group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    group_id: GroupId,

    /// Monotonically increasing position in the group stream.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(event_id: Uuid, group_id: GroupId, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id,
            group_id,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
