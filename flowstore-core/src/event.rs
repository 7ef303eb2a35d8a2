use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stream::StreamId;

/// An immutable record committed to the store.
///
/// Once written an [`Event`] is never updated or deleted. `(stream_id,
/// stream_version)` and `event_number` are both unique and dense within
/// their respective scope (the owning stream, and the whole store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique identifier of this event.
    pub id: uuid::Uuid,

    /// Store-wide monotonic dense position of this event in the `$all`
    /// stream, assigned at commit time.
    pub event_number: u64,

    /// Identifier of the owning stream.
    pub stream_id: StreamId,

    /// Per-stream monotonic dense position, 1-based.
    pub stream_version: u64,

    /// Application-defined event type discriminator.
    pub event_type: String,

    /// Opaque identifier correlating this event with others from the same
    /// business transaction, if any.
    pub correlation_id: Option<String>,

    /// Opaque identifier of whatever caused this event to be recorded, if
    /// any.
    pub causation_id: Option<String>,

    /// Opaque event payload, not interpreted by this crate.
    pub data: Vec<u8>,

    /// Opaque event metadata, not interpreted by this crate.
    pub metadata: Vec<u8>,

    /// Commit timestamp assigned by the store.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Returns true if this event belongs to the given stream.
    pub fn belongs_to(&self, stream_id: &StreamId) -> bool {
        &self.stream_id == stream_id
    }
}
