use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::stream::StreamId;

/// Primary key of a durable [`Subscription`] row, assigned by the store.
pub type SubscriptionId = i64;

/// Durable subscription row: `(subscription_id, stream_uuid,
/// subscription_name, last_seen_event_number, last_seen_stream_version,
/// created_at)`, unique on `(stream_uuid, subscription_name)`.
///
/// `last_seen_*` means "highest contiguous prefix the subscriber has
/// acknowledged"; it never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: SubscriptionId,
    pub stream_id: StreamId,
    pub name: String,
    pub last_seen_event_number: Option<u64>,
    pub last_seen_stream_version: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Whether a subscription targets a single named stream or the synthetic
/// `$all` stream. Determines how a bare-integer [`Ack`] is interpreted and
/// which topic the subscription listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Subscribed to a single stream: bare-integer acks are interpreted as
    /// `stream_version`, and events are filtered defensively by
    /// `stream_id`.
    Stream,
    /// Subscribed to the `$all` synthetic stream: bare-integer acks are
    /// interpreted as `event_number`.
    All,
}

/// Starting point for a new subscription, as passed via `start_from` in the
/// subscribe API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartFrom {
    /// Start from the very beginning of the stream.
    #[default]
    Origin,
    /// Start from whatever the current tail is at the moment of
    /// subscribing.
    Current,
    /// Start from an explicit position: `stream_version` for a
    /// single-stream subscription, `event_number` for an all-stream one.
    Exact(u64),
}

/// The three forms an acknowledgement may take:
/// a batch of previously-forwarded events, a single event, or a bare
/// position (interpreted according to [`SubscriptionKind`]).
#[derive(Debug, Clone)]
pub enum Ack {
    Events(Vec<Event>),
    Event(Event),
    Position(u64),
}

impl Ack {
    /// Resolves this ack into `(event_number, stream_version)` pairs
    /// against a live context, where `position` is only meaningful when
    /// paired with a [`SubscriptionKind`] (bare integers are ambiguous on
    /// their own).
    ///
    /// For [`Ack::Events`] and [`Ack::Event`], returns the maximum
    /// `event_number`/`stream_version` found, as the durable cursor tracks
    /// the highest contiguous acknowledged position.
    pub fn resolve(&self, kind: SubscriptionKind) -> ResolvedAck {
        match self {
            Ack::Events(events) => {
                let event_number = events.iter().map(|e| e.event_number).max();
                let stream_version = events.iter().map(|e| e.stream_version).max();
                ResolvedAck {
                    event_number,
                    stream_version,
                }
            }
            Ack::Event(event) => ResolvedAck {
                event_number: Some(event.event_number),
                stream_version: Some(event.stream_version),
            },
            Ack::Position(position) => match kind {
                SubscriptionKind::All => ResolvedAck {
                    event_number: Some(*position),
                    stream_version: None,
                },
                SubscriptionKind::Stream => ResolvedAck {
                    event_number: None,
                    stream_version: Some(*position),
                },
            },
        }
    }
}

/// Result of resolving an [`Ack`]: at least one of the two fields is
/// populated.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvedAck {
    pub event_number: Option<u64>,
    pub stream_version: Option<u64>,
}
