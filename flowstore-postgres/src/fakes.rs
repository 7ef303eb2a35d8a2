//! In-memory fakes for [`EventReader`], [`SubscriptionStore`] and
//! [`AdvisoryLock`], used by the state-machine unit tests in [`crate::actor`]
//! so they don't need a real database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use flowstore_core::{
    AdvisoryLock, Event, EventReader, LockGuard, LockOutcome, ReadError, StoreError, StreamId,
    Subscription, SubscriptionId, SubscriptionStore,
};

/// An in-memory `$all` log, append-only for the test's lifetime.
#[derive(Default)]
pub struct FakeReader {
    events: Mutex<Vec<Event>>,
}

impl FakeReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl EventReader for FakeReader {
    async fn read(&self, stream_id: &StreamId, from_version: u64, max: u32) -> Result<Vec<Event>, ReadError> {
        let events = self.events.lock().unwrap();
        if !events.iter().any(|e| e.belongs_to(stream_id)) {
            return Err(ReadError::StreamNotFound);
        }

        Ok(events
            .iter()
            .filter(|e| e.belongs_to(stream_id) && e.stream_version >= from_version)
            .take(max as usize)
            .cloned()
            .collect())
    }

    async fn read_all(&self, from_event_number: u64, max: u32) -> Result<Vec<Event>, ReadError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_number >= from_event_number)
            .take(max as usize)
            .cloned()
            .collect())
    }

    async fn current_event_number(&self) -> Result<u64, ReadError> {
        Ok(self.events.lock().unwrap().iter().map(|e| e.event_number).max().unwrap_or(0))
    }

    async fn current_stream_version(&self, stream_id: &StreamId) -> Result<u64, ReadError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.belongs_to(stream_id))
            .map(|e| e.stream_version)
            .max()
            .unwrap_or(0))
    }
}

/// An in-memory subscription row table, keyed the same way the Postgres
/// table is: `(stream_id, subscription_name)` unique.
#[derive(Default)]
pub struct FakeStore {
    rows: Mutex<HashMap<(String, String), Subscription>>,
    next_id: AtomicI64,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for FakeStore {
    async fn subscribe(
        &self,
        stream_id: &StreamId,
        name: &str,
        start_event_number: Option<u64>,
        start_stream_version: Option<u64>,
    ) -> Result<Subscription, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (stream_id.as_str().to_owned(), name.to_owned());

        if let Some(row) = rows.get(&key) {
            return Ok(row.clone());
        }

        let subscription_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let row = Subscription {
            subscription_id,
            stream_id: stream_id.clone(),
            name: name.to_owned(),
            last_seen_event_number: start_event_number,
            last_seen_stream_version: start_stream_version,
            created_at: chrono::Utc::now(),
        };

        rows.insert(key, row.clone());
        Ok(row)
    }

    async fn ack(
        &self,
        subscription_id: SubscriptionId,
        event_number: Option<u64>,
        stream_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.values_mut().find(|row| row.subscription_id == subscription_id) {
            if let Some(en) = event_number {
                row.last_seen_event_number = Some(en);
            }
            if let Some(sv) = stream_version {
                row.last_seen_stream_version = Some(sv);
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, stream_id: &StreamId, name: &str) -> Result<(), StoreError> {
        self.rows
            .lock()
            .unwrap()
            .remove(&(stream_id.as_str().to_owned(), name.to_owned()));
        Ok(())
    }
}

pub struct NoopGuard;

impl LockGuard for NoopGuard {}

/// Acquires immediately, every time: fine for unit tests where lock
/// contention itself isn't the thing under test (see
/// `unique_live_subscription` for the real contention test).
#[derive(Default)]
pub struct FakeLock;

#[async_trait]
impl AdvisoryLock for FakeLock {
    async fn try_acquire_exclusive(&self, _subscription_id: SubscriptionId) -> Result<LockOutcome, ReadError> {
        Ok(LockOutcome::Acquired(Box::new(NoopGuard)))
    }
}

/// Builds a minimal fake event for state-machine tests.
pub fn event(stream: &str, event_number: u64, stream_version: u64, event_type: &str) -> Event {
    Event {
        id: uuid::Uuid::new_v4(),
        event_number,
        stream_id: StreamId::new(stream),
        stream_version,
        event_type: event_type.to_owned(),
        correlation_id: None,
        causation_id: None,
        data: vec![],
        metadata: vec![],
        created_at: chrono::Utc::now(),
    }
}
