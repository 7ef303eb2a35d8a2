//! Back-pressure via the bounded `pending` buffer and `MaxCapacity`:
//! only one batch is ever in flight: later catch-up pages
//! queue up until the subscriber acks, and delivery order is preserved
//! regardless of how much backlog accumulates behind it.

mod setup;

use std::time::Duration;

use flowstore_core::{Ack, Event, StartFrom};
use flowstore_postgres::{SubscribeOptions, SubscriberMessage};
use testcontainers::clients::Cli;

async fn try_recv_events(
    rx: &mut tokio::sync::mpsc::Receiver<SubscriberMessage<Event>>,
) -> Option<Vec<Event>> {
    match tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
        Err(_) => None,
        Ok(None) => panic!("subscriber channel closed unexpectedly"),
        Ok(Some(SubscriberMessage::Events(events))) => Some(events),
        Ok(Some(other)) => panic!("expected Events, got {other:?}"),
    }
}

async fn recv_events(rx: &mut tokio::sync::mpsc::Receiver<SubscriberMessage<Event>>) -> Vec<Event> {
    match tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("subscriber channel closed unexpectedly")
    {
        SubscriberMessage::Events(events) => events,
        other => panic!("expected Events, got {other:?}"),
    }
}

#[tokio::test]
async fn buffered_batches_are_delivered_one_at_a_time_in_order() {
    let docker = Cli::default();
    let (_node, runtime) = setup::runtime_with_config(&docker, |config| {
        config.catchup_batch_size = 2;
        config.max_buffer_size = 2;
    })
    .await;
    let pool = runtime.pool();
    let registry = runtime.registry();

    setup::append(
        &pool,
        "orders-4",
        &[
            ("A", serde_json::json!({})),
            ("B", serde_json::json!({})),
            ("C", serde_json::json!({})),
            ("D", serde_json::json!({})),
            ("E", serde_json::json!({})),
            ("F", serde_json::json!({})),
        ],
    )
    .await;

    let mut rx = registry
        .subscribe_to_stream::<Event>("orders-4", "back_pressure", SubscribeOptions::raw(StartFrom::Origin))
        .await
        .expect("failed to subscribe");

    let handle = match tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for Subscribed")
        .expect("subscriber channel closed unexpectedly")
    {
        SubscriberMessage::Subscribed(handle) => handle,
        other => panic!("expected Subscribed, got {other:?}"),
    };

    let first = recv_events(&mut rx).await;
    assert_eq!(first.iter().map(|e| &e.event_type).collect::<Vec<_>>(), vec!["A", "B"]);

    // The next two pages are buffered behind the unacked first batch.
    assert!(try_recv_events(&mut rx).await.is_none());

    handle.ack(Ack::Events(first)).await.expect("ack failed");
    let second = recv_events(&mut rx).await;
    assert_eq!(second.iter().map(|e| &e.event_type).collect::<Vec<_>>(), vec!["C", "D"]);

    handle.ack(Ack::Events(second)).await.expect("ack failed");
    let third = recv_events(&mut rx).await;
    assert_eq!(third.iter().map(|e| &e.event_type).collect::<Vec<_>>(), vec!["E", "F"]);
}
