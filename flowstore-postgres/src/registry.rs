//! The supervisor/registry: the only public entry point for starting and
//! stopping subscriptions. Keeps the process registry that
//! enforces "exactly one locally-running subscription per `(kind, stream,
//! name)`", and restarts a subscription's actor task when it crashes.
//!
//! Grounded on `eventually-postgres::store::EventStoreBuilder`'s top-level
//! ownership of the pool/reader/store/lock/listener, composed here into a
//! single handle the rest of the runtime is built around.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowstore_core::{AdvisoryLock, EventReader, StreamId, SubscriptionKind, SubscriptionStore};
use tokio::sync::mpsc;

use crate::actor::{ActorConfig, ActorMessage, Outcome, SubscriptionActor};
use crate::config::Config;
use crate::error::Error;
use crate::handle::{SubscribeOptions, SubscriberMessage};
use crate::topics::Topics;

type Key = (SubscriptionKind, String, String);

/// Owns the shared backends and process registry. Cheap to clone (wraps an
/// `Arc` internally via `Arc<Registry>` at the call site); construct once
/// per store and share it.
pub struct Registry {
    reader: Arc<dyn EventReader>,
    store: Arc<dyn SubscriptionStore>,
    lock: Arc<dyn AdvisoryLock>,
    topics: Arc<Topics>,
    max_size: usize,
    catchup_batch_size: u32,
    lock_poll_interval: Duration,
    active: Mutex<HashMap<Key, mpsc::Sender<ActorMessage>>>,
}

impl Registry {
    pub fn new(
        reader: Arc<dyn EventReader>,
        store: Arc<dyn SubscriptionStore>,
        lock: Arc<dyn AdvisoryLock>,
        topics: Arc<Topics>,
        config: &Config,
    ) -> Self {
        Self {
            reader,
            store,
            lock,
            topics,
            max_size: config.max_buffer_size,
            catchup_batch_size: config.catchup_batch_size,
            lock_poll_interval: Duration::from_millis(config.lock_poll_interval_ms),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to a single stream. Fails with
    /// [`Error::SubscriptionAlreadyExists`] if a subscription with this
    /// `(stream_id, name)` is already running on this process.
    pub async fn subscribe_to_stream<T>(
        self: &Arc<Self>,
        stream_id: impl Into<StreamId>,
        name: impl Into<String>,
        options: SubscribeOptions<T>,
    ) -> Result<mpsc::Receiver<SubscriberMessage<T>>, Error>
    where
        T: Send + Sync + 'static,
    {
        self.subscribe(SubscriptionKind::Stream, stream_id.into(), name.into(), options)
            .await
    }

    /// Subscribes to the synthetic `$all` stream.
    pub async fn subscribe_to_all_streams<T>(
        self: &Arc<Self>,
        name: impl Into<String>,
        options: SubscribeOptions<T>,
    ) -> Result<mpsc::Receiver<SubscriberMessage<T>>, Error>
    where
        T: Send + Sync + 'static,
    {
        self.subscribe(SubscriptionKind::All, StreamId::all(), name.into(), options)
            .await
    }

    /// Tears down a running subscription by name, deleting its durable row.
    /// A no-op if no such subscription is currently running on this
    /// process.
    pub async fn unsubscribe_from_stream(&self, stream_id: impl Into<StreamId>, name: impl Into<String>) {
        let stream_id = stream_id.into();
        let name = name.into();

        for kind in [SubscriptionKind::Stream, SubscriptionKind::All] {
            let sender = self
                .active
                .lock()
                .unwrap()
                .get(&(kind, stream_id.as_str().to_owned(), name.clone()))
                .cloned();

            if let Some(sender) = sender {
                let _ = sender.send(ActorMessage::Unsubscribe).await;
            }
        }
    }

    async fn subscribe<T>(
        self: &Arc<Self>,
        kind: SubscriptionKind,
        stream_id: StreamId,
        name: String,
        options: SubscribeOptions<T>,
    ) -> Result<mpsc::Receiver<SubscriberMessage<T>>, Error>
    where
        T: Send + Sync + 'static,
    {
        let key: Key = (kind, stream_id.as_str().to_owned(), name.clone());
        let (mailbox_tx, mailbox) = mpsc::channel(128);

        {
            let mut active = self.active.lock().unwrap();
            if active.contains_key(&key) {
                return Err(Error::SubscriptionAlreadyExists);
            }
            active.insert(key.clone(), mailbox_tx.clone());
        }

        let (subscriber_tx, subscriber_rx) = mpsc::channel(self.max_size.max(1));
        let registry = Arc::clone(self);

        tokio::spawn(registry.supervise(
            key,
            kind,
            stream_id,
            name,
            options.start_from,
            options.selector,
            options.mapper,
            subscriber_tx,
            mailbox_tx,
            mailbox,
        ));

        Ok(subscriber_rx)
    }

    #[allow(clippy::too_many_arguments)]
    async fn supervise<T: Send + Sync + 'static>(
        self: Arc<Self>,
        key: Key,
        kind: SubscriptionKind,
        stream_id: StreamId,
        name: String,
        start_from: flowstore_core::StartFrom,
        selector: Option<crate::handle::Selector>,
        mapper: crate::handle::Mapper<T>,
        subscriber: crate::handle::Subscriber<T>,
        mut mailbox_tx: mpsc::Sender<ActorMessage>,
        mut mailbox: mpsc::Receiver<ActorMessage>,
    ) {
        loop {
            let actor = SubscriptionActor::new(ActorConfig {
                stream_id: stream_id.clone(),
                kind,
                name: name.clone(),
                options: SubscribeOptions {
                    start_from,
                    selector: selector.clone(),
                    mapper: mapper.clone(),
                },
                reader: self.reader.clone(),
                store: self.store.clone(),
                lock: self.lock.clone(),
                topics: self.topics.clone(),
                subscriber: subscriber.clone(),
                max_size: self.max_size,
                catchup_batch_size: self.catchup_batch_size,
                lock_poll_interval: self.lock_poll_interval,
                mailbox_tx: mailbox_tx.clone(),
                mailbox,
            });

            let outcome = actor.run().await;

            match outcome {
                Outcome::Crashed => {
                    tracing::warn!(name = %name, "subscription process crashed, restarting");
                    let (new_tx, new_rx) = mpsc::channel(128);
                    mailbox_tx = new_tx.clone();
                    mailbox = new_rx;
                    self.active.lock().unwrap().insert(key.clone(), new_tx);
                    continue;
                }
                Outcome::SubscriberGone | Outcome::Unsubscribed => {
                    self.active.lock().unwrap().remove(&key);
                    return;
                }
            }
        }
    }
}
