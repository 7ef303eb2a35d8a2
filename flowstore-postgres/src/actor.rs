//! The per-subscription state machine: owns the advisory
//! lock for as long as it runs, drives a transient catch-up worker, then
//! switches to live delivery fed by [`crate::topics::Topics`], applying
//! back-pressure via a bounded `pending_events` buffer.
//!
//! Grounded on `eventually-postgres::subscriber::EventSubscriber` (mailbox
//! actor driven by `tokio::select!` over a command channel and a live
//! stream) and on `eventually-postgres::subscription::PersistentBuilder`
//! (lookup-or-create against the durable row before entering the main
//! loop).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use flowstore_core::{
    Ack, AdvisoryLock, Event, EventReader, LockGuard, LockOutcome, ReadError, StartFrom,
    StreamId, Subscription, SubscriptionId, SubscriptionKind, SubscriptionStore,
};
use tokio::sync::{broadcast, mpsc};

use crate::handle::{Mapper, Selector, SubscribeOptions, Subscriber, SubscriberMessage};
use crate::handle::SubscriptionHandle;
use crate::topics::Topics;

/// Internal mailbox of a running subscription process.
pub enum ActorMessage {
    /// A batch produced by the catch-up worker.
    CaughtUpEvents(Vec<Event>),
    /// The catch-up worker reached the tail and exited.
    CaughtUpFinished,
    /// The catch-up worker hit a backend failure; the actor crashes so the
    /// supervisor can restart it.
    CaughtUpFailed(ReadError),
    Ack(Ack),
    Unsubscribe,
}

/// A batch that has survived selection and mapping, ready to be (or
/// already) forwarded to the subscriber. Keeps the pre-map events around so
/// a bare-position ack can be cross-referenced back to the other half of
/// `(event_number, stream_version)`.
struct PendingBatch<T> {
    events: Vec<Event>,
    forwarded: Vec<T>,
}

/// Construction parameters for a [`SubscriptionActor`], gathered by
/// [`crate::registry::Registry`] before spawning the task.
pub struct ActorConfig<T> {
    pub stream_id: StreamId,
    pub kind: SubscriptionKind,
    pub name: String,
    pub options: SubscribeOptions<T>,
    pub reader: Arc<dyn EventReader>,
    pub store: Arc<dyn SubscriptionStore>,
    pub lock: Arc<dyn AdvisoryLock>,
    pub topics: Arc<Topics>,
    pub subscriber: Subscriber<T>,
    pub max_size: usize,
    pub catchup_batch_size: u32,
    pub lock_poll_interval: Duration,
    pub mailbox_tx: mpsc::Sender<ActorMessage>,
    pub mailbox: mpsc::Receiver<ActorMessage>,
}

/// Collapses the named transition-table states into four runtime
/// variants; see DESIGN.md for why the others don't need their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    CatchingUp,
    Subscribed,
    MaxCapacity,
}

/// Why a [`SubscriptionActor::run`] returned, so [`crate::registry::Registry`]
/// can decide whether to restart it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The subscriber dropped its receiver; the durable row is left intact
    /// and nothing is restarted.
    SubscriberGone,
    /// `unsubscribe` was called: the durable row was deleted on purpose.
    Unsubscribed,
    /// A backend failure occurred; the registry restarts the process.
    Crashed,
}

pub struct SubscriptionActor<T> {
    subscription_id: SubscriptionId,
    stream_id: StreamId,
    kind: SubscriptionKind,
    name: String,

    reader: Arc<dyn EventReader>,
    store: Arc<dyn SubscriptionStore>,
    lock: Arc<dyn AdvisoryLock>,
    topics: Arc<Topics>,

    subscriber: Subscriber<T>,
    selector: Option<Selector>,
    mapper: Mapper<T>,
    start_from: StartFrom,

    max_size: usize,
    catchup_batch_size: u32,
    lock_poll_interval: Duration,

    state: State,
    /// True from the moment the catch-up worker is spawned until it
    /// reports [`ActorMessage::CaughtUpFinished`]. Tracked independently of
    /// [`State`] so that back-pressure (`State::MaxCapacity`) can't mask
    /// whether catch-up is still in progress.
    catching_up: bool,
    /// Live batches received while `catching_up` is true, held until
    /// catch-up finishes so they're merged in order instead of racing
    /// ahead of still-unread catch-up pages.
    live_buffer: Vec<Event>,
    /// Position catch-up should page forward from: an `event_number` for
    /// an all-stream subscription, a `stream_version` for a single-stream
    /// one. Distinct from `last_received`, which is always in
    /// `event_number` units.
    catchup_from: u64,
    /// Highest raw `event_number` seen so far, forwarded or not; guards
    /// against re-ingesting the same event twice (catch-up/live overlap).
    last_received: u64,
    /// Highest `event_number` among events actually forwarded to the
    /// subscriber.
    last_seen: u64,
    last_ack_event_number: Option<u64>,
    last_ack_stream_version: Option<u64>,
    /// Raw events of the batch currently forwarded and awaiting ack, used
    /// to cross-reference bare-position acks. `None` when nothing is
    /// outstanding.
    in_flight: Option<Vec<Event>>,
    pending: VecDeque<PendingBatch<T>>,

    mailbox_tx: mpsc::Sender<ActorMessage>,
    mailbox: mpsc::Receiver<ActorMessage>,
}

impl<T: Send + Sync + 'static> SubscriptionActor<T> {
    pub fn new(config: ActorConfig<T>) -> Self {
        Self {
            subscription_id: 0,
            stream_id: config.stream_id,
            kind: config.kind,
            name: config.name,
            reader: config.reader,
            store: config.store,
            lock: config.lock,
            topics: config.topics,
            subscriber: config.subscriber,
            selector: config.options.selector,
            mapper: config.options.mapper,
            start_from: config.options.start_from,
            max_size: config.max_size,
            catchup_batch_size: config.catchup_batch_size,
            lock_poll_interval: config.lock_poll_interval,
            state: State::Initial,
            catching_up: false,
            live_buffer: Vec::new(),
            catchup_from: 0,
            last_received: 0,
            last_seen: 0,
            last_ack_event_number: None,
            last_ack_stream_version: None,
            in_flight: None,
            pending: VecDeque::new(),
            mailbox_tx: config.mailbox_tx,
            mailbox: config.mailbox,
        }
    }

    /// Drives the subscription to completion: lookup-or-create, acquire the
    /// advisory lock, catch up, then deliver live. Returns the reason
    /// delivery stopped, so [`crate::registry::Registry`] can decide
    /// whether to restart it.
    pub async fn run(mut self) -> Outcome {
        let (start_event_number, start_stream_version) = match self.resolve_start().await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::error!(%error, name = %self.name, "failed to resolve start_from");
                return Outcome::Crashed;
            }
        };

        let row = match self
            .store
            .subscribe(&self.stream_id, &self.name, start_event_number, start_stream_version)
            .await
        {
            Ok(row) => row,
            Err(error) => {
                tracing::error!(%error, name = %self.name, "failed to look up or create subscription");
                return Outcome::Crashed;
            }
        };

        self.adopt(row);

        let guard = match self.acquire_lock().await {
            Ok(guard) => guard,
            Err(outcome) => return outcome,
        };

        self.state = State::CatchingUp;
        self.catching_up = true;

        let handle = SubscriptionHandle {
            tx: self.mailbox_tx.clone(),
        };
        if self.subscriber.send(SubscriberMessage::Subscribed(handle)).await.is_err() {
            return Outcome::SubscriberGone;
        }

        let topic = if self.kind == SubscriptionKind::All {
            flowstore_core::ALL_STREAM.to_owned()
        } else {
            self.stream_id.as_str().to_owned()
        };
        let mut live = self.topics.subscribe(&topic);

        let catchup_handle = crate::catchup::spawn(crate::catchup::CatchUpConfig {
            reader: self.reader.clone(),
            kind: self.kind,
            stream_id: self.stream_id.clone(),
            from: self.catchup_from,
            batch_size: self.catchup_batch_size,
            mailbox: self.mailbox_tx.clone(),
        });

        let outcome = self.drive_main_loop(&mut live).await;

        catchup_handle.abort();
        drop(guard);

        outcome
    }

    async fn drive_main_loop(&mut self, live: &mut broadcast::Receiver<Vec<Event>>) -> Outcome {
        loop {
            tokio::select! {
                _ = self.subscriber.closed() => {
                    tracing::debug!(name = %self.name, "subscriber dropped, terminating subscription process");
                    return Outcome::SubscriberGone;
                }
                message = self.mailbox.recv() => {
                    let Some(message) = message else { return Outcome::SubscriberGone; };
                    if let Some(outcome) = self.handle_message(message).await {
                        return outcome;
                    }
                }
                received = live.recv() => {
                    match received {
                        Ok(batch) => self.handle_live_batch(batch).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(name = %self.name, skipped, "live topic lagged, some notifications were dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::error!(name = %self.name, "live topic closed unexpectedly");
                            return Outcome::Crashed;
                        }
                    }
                }
            }
        }
    }

    /// Returns `Some(outcome)` if the actor should terminate.
    async fn handle_message(&mut self, message: ActorMessage) -> Option<Outcome> {
        match message {
            ActorMessage::CaughtUpEvents(batch) => {
                self.ingest(batch).await;
                None
            }
            ActorMessage::CaughtUpFinished => {
                if self.catching_up {
                    self.catching_up = false;
                    if self.state == State::CatchingUp {
                        self.state = State::Subscribed;
                    }
                    if !self.live_buffer.is_empty() {
                        let buffered = std::mem::take(&mut self.live_buffer);
                        self.ingest(buffered).await;
                    }
                }
                None
            }
            ActorMessage::CaughtUpFailed(error) => {
                tracing::error!(%error, name = %self.name, "catch-up worker failed, crashing subscription process");
                Some(Outcome::Crashed)
            }
            ActorMessage::Ack(ack) => {
                if let Err(error) = self.handle_ack(ack).await {
                    tracing::error!(%error, name = %self.name, "failed to persist ack");
                    return Some(Outcome::Crashed);
                }
                None
            }
            ActorMessage::Unsubscribe => {
                let _ = self.store.unsubscribe(&self.stream_id, &self.name).await;
                Some(Outcome::Unsubscribed)
            }
        }
    }

    /// Handles one batch received on the live topic. While catch-up is
    /// still running, a live batch may race ahead of catch-up pages that
    /// haven't been read yet, so it's held in `live_buffer` rather than
    /// forwarded, and merged in after catch-up drains the backlog.
    async fn handle_live_batch(&mut self, batch: Vec<Event>) {
        if self.catching_up {
            self.live_buffer.extend(batch);
        } else {
            self.ingest(batch).await;
        }
    }

    async fn resolve_start(&self) -> Result<(Option<u64>, Option<u64>), ReadError> {
        match self.start_from {
            StartFrom::Origin => Ok((None, None)),
            StartFrom::Current => {
                if self.kind == SubscriptionKind::All {
                    Ok((Some(self.reader.current_event_number().await?), None))
                } else {
                    Ok((None, Some(self.reader.current_stream_version(&self.stream_id).await?)))
                }
            }
            StartFrom::Exact(position) => {
                if self.kind == SubscriptionKind::All {
                    Ok((Some(position), None))
                } else {
                    Ok((None, Some(position)))
                }
            }
        }
    }

    fn adopt(&mut self, row: Subscription) {
        self.subscription_id = row.subscription_id;
        self.last_received = row.last_seen_event_number.unwrap_or(0);
        self.last_seen = row.last_seen_event_number.unwrap_or(0);
        self.last_ack_event_number = row.last_seen_event_number;
        self.last_ack_stream_version = row.last_seen_stream_version;
        self.catchup_from = match self.kind {
            SubscriptionKind::All => row.last_seen_event_number.unwrap_or(0),
            SubscriptionKind::Stream => row.last_seen_stream_version.unwrap_or(0),
        };
    }

    /// Loops in [`State::Initial`] until the advisory lock is acquired or
    /// the subscription is torn down before ever starting.
    async fn acquire_lock(&mut self) -> Result<Box<dyn LockGuard>, Outcome> {
        loop {
            tokio::select! {
                _ = self.subscriber.closed() => return Err(Outcome::SubscriberGone),
                message = self.mailbox.recv() => {
                    match message {
                        Some(ActorMessage::Unsubscribe) => {
                            let _ = self.store.unsubscribe(&self.stream_id, &self.name).await;
                            return Err(Outcome::Unsubscribed);
                        }
                        None => return Err(Outcome::SubscriberGone),
                        _ => {}
                    }
                }
                outcome = self.lock.try_acquire_exclusive(self.subscription_id) => {
                    match outcome {
                        Ok(LockOutcome::Acquired(guard)) => {
                            tracing::debug!(name = %self.name, "advisory lock acquired, entering catch-up");
                            return Ok(guard);
                        }
                        Ok(LockOutcome::Taken) => {
                            tokio::time::sleep(self.lock_poll_interval).await;
                        }
                        Err(error) => {
                            tracing::warn!(%error, name = %self.name, "advisory lock backend failure, retrying");
                            tokio::time::sleep(self.lock_poll_interval).await;
                        }
                    }
                }
            }
        }
    }

    /// Dedupes, filters, maps, and enqueues-or-forwards an incoming raw
    /// batch, whether it came from the catch-up worker or a live topic.
    async fn ingest(&mut self, raw_batch: Vec<Event>) {
        let mut fresh: Vec<Event> = raw_batch
            .into_iter()
            .filter(|e| e.event_number > self.last_received)
            .collect();

        if self.kind == SubscriptionKind::Stream {
            fresh.retain(|e| e.belongs_to(&self.stream_id));
        }

        if fresh.is_empty() {
            return;
        }

        if let Some(max) = fresh.iter().map(|e| e.event_number).max() {
            self.last_received = self.last_received.max(max);
        }

        let selected: Vec<Event> = match &self.selector {
            Some(predicate) => fresh.into_iter().filter(|e| predicate(e)).collect(),
            None => fresh,
        };

        // An empty filtered batch is not forwarded or buffered at all; its
        // event numbers are covered implicitly once a later ack surpasses
        // them.
        if selected.is_empty() {
            return;
        }

        let forwarded: Vec<T> = selected.iter().cloned().map(|e| (self.mapper)(e)).collect();
        let batch = PendingBatch {
            events: selected,
            forwarded,
        };

        if self.in_flight.is_none() && self.pending.is_empty() {
            self.forward(batch).await;
        } else {
            self.pending.push_back(batch);
            self.update_capacity_state();
        }
    }

    async fn forward(&mut self, batch: PendingBatch<T>) {
        let checkpoint = batch
            .events
            .iter()
            .map(|e| e.event_number)
            .max()
            .expect("forward is only called with a non-empty batch");

        if self
            .subscriber
            .send(SubscriberMessage::Events(batch.forwarded))
            .await
            .is_ok()
        {
            self.last_seen = checkpoint;
            self.in_flight = Some(batch.events);
        }
    }

    fn update_capacity_state(&mut self) {
        let buffered: usize = self.pending.iter().map(|b| b.forwarded.len()).sum();
        if buffered >= self.max_size {
            self.state = State::MaxCapacity;
        }
    }

    async fn handle_ack(&mut self, ack: Ack) -> Result<(), flowstore_core::StoreError> {
        let (event_number, stream_version) = self.resolve_pair(&ack);

        if event_number.is_none() && stream_version.is_none() {
            return Ok(());
        }

        if let Some(en) = event_number {
            self.last_ack_event_number = Some(self.last_ack_event_number.map_or(en, |old| old.max(en)));
        }
        if let Some(sv) = stream_version {
            self.last_ack_stream_version =
                Some(self.last_ack_stream_version.map_or(sv, |old| old.max(sv)));
        }

        self.store
            .ack(self.subscription_id, event_number, stream_version)
            .await?;

        if self.in_flight_covered_by(event_number, stream_version) {
            self.in_flight = None;
        }

        if self.in_flight.is_none() {
            if let Some(next) = self.pending.pop_front() {
                self.forward(next).await;
            }
            if self.state == State::MaxCapacity {
                let buffered: usize = self.pending.iter().map(|b| b.forwarded.len()).sum();
                if buffered < self.max_size {
                    self.state = State::Subscribed;
                }
            }
        }

        Ok(())
    }

    /// Fills in whichever half of `(event_number, stream_version)` a
    /// bare-position ack leaves implicit, by cross-referencing the raw
    /// events of the in-flight batch.
    fn resolve_pair(&self, ack: &Ack) -> (Option<u64>, Option<u64>) {
        let resolved = ack.resolve(self.kind);

        match (resolved.event_number, resolved.stream_version) {
            (Some(en), Some(sv)) => (Some(en), Some(sv)),
            (Some(en), None) => {
                let sv = self.find_in_flight(|e| e.event_number == en).map(|e| e.stream_version);
                (Some(en), sv)
            }
            (None, Some(sv)) => {
                let en = self.find_in_flight(|e| e.stream_version == sv).map(|e| e.event_number);
                (en, Some(sv))
            }
            (None, None) => (None, None),
        }
    }

    fn find_in_flight(&self, predicate: impl Fn(&Event) -> bool) -> Option<&Event> {
        self.in_flight.as_ref()?.iter().find(|e| predicate(e))
    }

    /// Whether an ack naming `event_number`/`stream_version` reaches or
    /// passes the highest position in the currently in-flight batch.
    /// Compares against the batch's own maximum rather than requiring
    /// `resolve_pair` to have found an exact matching event, so a
    /// bare-position ack that doesn't line up with any single in-flight
    /// event (e.g. naming a later position) still clears it.
    fn in_flight_covered_by(&self, event_number: Option<u64>, stream_version: Option<u64>) -> bool {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return false;
        };

        if let Some(en) = event_number {
            if let Some(max_en) = in_flight.iter().map(|e| e.event_number).max() {
                if en >= max_en {
                    return true;
                }
            }
        }

        if let Some(sv) = stream_version {
            if let Some(max_sv) = in_flight.iter().map(|e| e.stream_version).max() {
                if sv >= max_sv {
                    return true;
                }
            }
        }

        false
    }
}
