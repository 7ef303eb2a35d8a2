//! The catch-up worker: a transient task that pages a
//! subscription from its last durable checkpoint up to the tail, forwarding
//! each batch into the owning subscription actor's mailbox, then exits.
//!
//! Grounded on `eventually-postgres::subscriber::EventSubscriber`'s
//! catch-up phase: a `tokio::spawn`ed loop issuing bounded `stream_query`
//! calls until a short page signals the tail has been reached.

use std::sync::Arc;

use flowstore_core::{EventReader, ReadError, StreamId, SubscriptionKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::actor::ActorMessage;

pub struct CatchUpConfig {
    pub reader: Arc<dyn EventReader>,
    pub kind: SubscriptionKind,
    pub stream_id: StreamId,
    /// Highest position already durably seen; paging starts one past it.
    pub from: u64,
    pub batch_size: u32,
    pub mailbox: mpsc::Sender<ActorMessage>,
}

/// Spawns the worker and returns its handle; the owning actor aborts it
/// once the main loop exits, in case it is still running — a live
/// subscriber's teardown can race the catch-up worker's own completion.
pub fn spawn(config: CatchUpConfig) -> JoinHandle<()> {
    tokio::spawn(run(config))
}

async fn run(config: CatchUpConfig) {
    let CatchUpConfig {
        reader,
        kind,
        stream_id,
        mut from,
        batch_size,
        mailbox,
    } = config;

    loop {
        let page = match kind {
            SubscriptionKind::All => reader.read_all(from + 1, batch_size).await,
            SubscriptionKind::Stream => reader.read(&stream_id, from + 1, batch_size).await,
        };

        let page = match page {
            Ok(page) => page,
            Err(ReadError::StreamNotFound) => {
                let _ = mailbox.send(ActorMessage::CaughtUpFinished).await;
                return;
            }
            Err(error) => {
                let _ = mailbox.send(ActorMessage::CaughtUpFailed(error)).await;
                return;
            }
        };

        if page.is_empty() {
            let _ = mailbox.send(ActorMessage::CaughtUpFinished).await;
            return;
        }

        let reached_tail = page.len() < batch_size as usize;
        from = match kind {
            SubscriptionKind::All => page.last().map(|e| e.event_number).unwrap_or(from),
            SubscriptionKind::Stream => page.last().map(|e| e.stream_version).unwrap_or(from),
        };

        if mailbox.send(ActorMessage::CaughtUpEvents(page)).await.is_err() {
            return;
        }

        if reached_tail {
            let _ = mailbox.send(ActorMessage::CaughtUpFinished).await;
            return;
        }
    }
}
