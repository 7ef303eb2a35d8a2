//! Notification Reader / Broadcaster: for each
//! `(first, last)` range emitted by the [`NotificationListener`], reads the
//! corresponding events from the `$all` view, groups them by stream, and
//! publishes on both the single-stream topic and the all-stream topic.
//!
//! This, together with [`crate::listener::PostgresNotificationListener`],
//! is the cluster-wide singleton publisher: exactly one running instance
//! per cluster, not per node. Wiring that uniqueness
//! guarantee (local registry vs. distributed leader election) is the
//! concern of [`crate::registry`]; this type only implements the
//! read-group-publish step once started.

use std::collections::BTreeMap;
use std::sync::Arc;

use flowstore_core::{Event, NotificationListener, StreamId, ALL_STREAM};
use futures::stream::StreamExt;

use crate::reader::PostgresEventReader;
use crate::topics::Topics;

const READ_PAGE_SIZE: u32 = 1000;

/// Drives the read-group-publish loop for as long as the listener's stream
/// yields ranges. Intended to be run as a single background task for the
/// whole cluster.
pub async fn run(
    listener: Arc<dyn NotificationListener>,
    reader: PostgresEventReader,
    topics: Arc<Topics>,
) {
    let mut ranges = listener.listen();

    while let Some(range) = ranges.next().await {
        let (first, last) = match range {
            Ok(range) => range,
            Err(error) => {
                tracing::warn!(%error, "notification listener error, continuing");
                continue;
            }
        };

        if let Err(error) = read_and_broadcast(&reader, &topics, first, last).await {
            tracing::warn!(%error, first, last, "failed to read and broadcast notified range");
        }
    }

    tracing::warn!("notification listener stream ended, broadcaster stopping");
}

async fn read_and_broadcast(
    reader: &PostgresEventReader,
    topics: &Topics,
    first: u64,
    last: u64,
) -> Result<(), flowstore_core::ReadError> {
    use flowstore_core::EventReader;

    let mut batch = Vec::new();
    let mut from = first;

    // The range is a contiguous slice of `$all`; page through it in case it
    // spans more than one read's worth of rows.
    loop {
        let page = reader.read_all(from, READ_PAGE_SIZE).await?;
        if page.is_empty() {
            break;
        }

        let page_last = page.last().map(|e| e.event_number).unwrap_or(from);
        from = page_last + 1;
        let done = page.len() < READ_PAGE_SIZE as usize || page_last >= last;
        batch.extend(page);

        if done {
            break;
        }
    }

    if batch.is_empty() {
        return Ok(());
    }

    let mut by_stream: BTreeMap<StreamId, Vec<Event>> = BTreeMap::new();
    for event in &batch {
        by_stream
            .entry(event.stream_id.clone())
            .or_default()
            .push(event.clone());
    }

    for (stream_id, events) in by_stream {
        topics.publish(stream_id.as_str(), events);
    }

    topics.publish(ALL_STREAM, batch);

    Ok(())
}
