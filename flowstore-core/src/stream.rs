use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the synthetic stream representing the total order of all events
/// committed to the store, across every other stream.
pub const ALL_STREAM: &str = "$all";

/// Identifier of a stream: either a user-supplied `stream_uuid`, or the
/// reserved [`ALL_STREAM`] synthetic stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Wraps a user-supplied opaque stream identifier.
    pub fn new(stream_uuid: impl Into<String>) -> Self {
        Self(stream_uuid.into())
    }

    /// The synthetic `$all` stream.
    pub fn all() -> Self {
        Self(ALL_STREAM.to_owned())
    }

    /// Returns true if this is the synthetic `$all` stream.
    pub fn is_all(&self) -> bool {
        self.0 == ALL_STREAM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StreamId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StreamId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}
