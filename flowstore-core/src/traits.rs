use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{ReadError, StoreError};
use crate::event::Event;
use crate::stream::StreamId;
use crate::subscription::{Subscription, SubscriptionId};

/// Paginated forward reader over a stream or the `$all` view.
/// Stateless: batch size is chosen by the caller.
#[async_trait]
pub trait EventReader: Send + Sync {
    /// Reads up to `max` events of `stream_id` with `stream_version >=
    /// from_version`, in ascending order.
    ///
    /// Fails with [`ReadError::StreamNotFound`] if the stream has no rows.
    async fn read(
        &self,
        stream_id: &StreamId,
        from_version: u64,
        max: u32,
    ) -> Result<Vec<Event>, ReadError>;

    /// Reads up to `max` events from the `$all` view with `event_number >=
    /// from_event_number`, in ascending order.
    async fn read_all(&self, from_event_number: u64, max: u32) -> Result<Vec<Event>, ReadError>;

    /// Returns the current tail position, used to resolve
    /// [`StartFrom::Current`].
    async fn current_event_number(&self) -> Result<u64, ReadError>;

    /// Returns the current version of a single stream, used to resolve
    /// [`StartFrom::Current`] for single-stream subscriptions.
    async fn current_stream_version(&self, stream_id: &StreamId) -> Result<u64, ReadError>;
}

/// CRUD on durable subscription rows.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Looks up or creates a subscription row. If a row already exists it
    /// is returned unchanged (idempotent lookup-or-create); a fresh row is
    /// seeded with `start_event_number`/`start_stream_version` (already
    /// resolved from the caller's `start_from` option, see
    /// [`StartFrom`](crate::subscription::StartFrom)).
    async fn subscribe(
        &self,
        stream_id: &StreamId,
        name: &str,
        start_event_number: Option<u64>,
        start_stream_version: Option<u64>,
    ) -> Result<Subscription, StoreError>;

    /// Unconditionally overwrites the durable cursor. The caller is
    /// expected to be the advisory-lock holder and to guarantee
    /// monotonicity.
    async fn ack(
        &self,
        subscription_id: SubscriptionId,
        event_number: Option<u64>,
        stream_version: Option<u64>,
    ) -> Result<(), StoreError>;

    /// Deletes the durable row. Idempotent: succeeds even if no row
    /// exists.
    async fn unsubscribe(&self, stream_id: &StreamId, name: &str) -> Result<(), StoreError>;
}

/// Outcome of attempting to acquire the single-active-subscriber advisory
/// lock for a subscription id.
pub enum LockOutcome {
    /// The lock was acquired; dropping the guard releases it (in practice:
    /// when the holding session terminates).
    Acquired(Box<dyn LockGuard>),
    /// Another session currently holds the lock.
    Taken,
}

/// A held advisory lock. Dropping it (or the session behind it) releases
/// the lock.
pub trait LockGuard: Send + Sync {}

/// Database-scoped exclusive lock keyed by subscription id.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    async fn try_acquire_exclusive(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<LockOutcome, ReadError>;
}

/// Subscriber to the database's asynchronous notification channel.
/// Emits `(first_event_number, last_event_number)` ranges in commit
/// order, without coalescing.
pub trait NotificationListener: Send + Sync {
    fn listen(&self) -> BoxStream<'static, Result<(u64, u64), ReadError>>;
}
