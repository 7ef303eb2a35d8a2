//! Client-facing surface of a subscription: the options accepted by
//! `subscribe_to_stream`/`subscribe_to_all_streams`, the message protocol
//! sent to the subscriber, and the handle used to ack/unsubscribe.

use std::sync::Arc;

use flowstore_core::{Ack, Event, StartFrom};
use tokio::sync::mpsc;

use crate::actor::ActorMessage;
use crate::error::Error;

/// Predicate over an event: non-matches are not forwarded, but still
/// advance `last_seen`.
pub type Selector = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Transforms an event into the value actually delivered to the
/// subscriber. The subscription is parameterized over `T`, the mapper's
/// output type.
pub type Mapper<T> = Arc<dyn Fn(Event) -> T + Send + Sync>;

/// Options recognized by the subscribe API.
pub struct SubscribeOptions<T> {
    pub start_from: StartFrom,
    pub selector: Option<Selector>,
    pub mapper: Mapper<T>,
}

impl SubscribeOptions<Event> {
    /// Delivers raw, unmapped events from `start_from`, with no filtering.
    pub fn raw(start_from: StartFrom) -> Self {
        Self {
            start_from,
            selector: None,
            mapper: Arc::new(|event| event),
        }
    }
}

impl<T> SubscribeOptions<T> {
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = Some(selector);
        self
    }
}

/// Message protocol sent to the subscriber.
#[derive(Debug)]
pub enum SubscriberMessage<T> {
    /// Sent once, after advisory-lock acquisition.
    Subscribed(SubscriptionHandle),
    /// An ordered batch: raw events or mapper outputs.
    Events(Vec<T>),
}

/// Channel on which a subscriber receives [`SubscriberMessage`]s. Dropping
/// the receiving end of this channel is how a subscriber "dies" from the
/// subscription's perspective: the subscription detects `Sender::closed()`
/// and terminates, preserving the durable row.
pub type Subscriber<T> = mpsc::Sender<SubscriberMessage<T>>;

/// Handle to a live subscription process, used to ack progress or
/// unsubscribe. Cheap to clone; all clones address the same
/// subscription actor.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub(crate) tx: mpsc::Sender<ActorMessage>,
}

impl SubscriptionHandle {
    /// Acknowledges progress. Always returns `Ok`: acks against a dead
    /// subscription succeed silently from the caller's perspective.
    pub async fn ack(&self, ack: Ack) -> Result<(), Error> {
        let _ = self.tx.send(ActorMessage::Ack(ack)).await;
        Ok(())
    }

    /// Unsubscribes: deletes the durable row and terminates the
    /// subscription process. Idempotent.
    pub async fn unsubscribe(&self) -> Result<(), Error> {
        let _ = self.tx.send(ActorMessage::Unsubscribe).await;
        Ok(())
    }
}
