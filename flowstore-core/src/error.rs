use thiserror::Error;

/// Errors returned by an [`EventReader`](crate::traits::EventReader).
///
/// Raised only for explicit reads: the normal subscription flow never
/// hits [`ReadError::StreamNotFound`], since catch-up reads against an
/// empty/non-existent stream simply return zero rows.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The requested stream has no committed events.
    #[error("stream not found")]
    StreamNotFound,

    /// Any other failure originating from the backing store.
    #[error("event reader backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Errors returned by a [`SubscriptionStore`](crate::traits::SubscriptionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent creator raced the check-then-insert on `subscribe`.
    #[error("subscription already exists")]
    AlreadyExists,

    /// Any other failure originating from the backing store.
    #[error("subscription store backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}
