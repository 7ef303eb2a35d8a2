//! Catch-up then live delivery from `StartFrom::Origin`, for a single
//! stream.

mod setup;

use std::time::Duration;

use flowstore_core::{Ack, Event, StartFrom};
use flowstore_postgres::{SubscribeOptions, SubscriberMessage};
use testcontainers::clients::Cli;

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
async fn delivers_existing_then_live_events_in_order() {
    let docker = Cli::default();
    let (_node, runtime) = setup::runtime(&docker).await;
    let pool = runtime.pool();
    let registry = runtime.registry();

    setup::append(
        &pool,
        "orders-1",
        &[
            ("OrderPlaced", serde_json::json!({"id": 1})),
            ("OrderShipped", serde_json::json!({"id": 1})),
        ],
    )
    .await;

    let mut rx = registry
        .subscribe_to_stream::<Event>("orders-1", "subscribe_from_origin", SubscribeOptions::raw(StartFrom::Origin))
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

    let caught_up = recv_events(&mut rx).await;
    assert_eq!(caught_up.len(), 2);
    assert_eq!(caught_up[0].event_type, "OrderPlaced");
    assert_eq!(caught_up[1].event_type, "OrderShipped");

    handle.ack(Ack::Events(caught_up)).await.expect("ack failed");

    setup::append(&pool, "orders-1", &[("OrderClosed", serde_json::json!({"id": 1}))]).await;

    let live = recv_events(&mut rx).await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].event_type, "OrderClosed");
    assert_eq!(live[0].stream_version, 3);
}

#[tokio::test]
async fn stream_subscription_ignores_other_streams() {
    let docker = Cli::default();
    let (_node, runtime) = setup::runtime(&docker).await;
    let pool = runtime.pool();
    let registry = runtime.registry();

    let mut rx = registry
        .subscribe_to_stream::<Event>("orders-2", "ignores_other_streams", SubscribeOptions::raw(StartFrom::Origin))
        .await
        .expect("failed to subscribe");

    let _handle = match tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for Subscribed")
        .expect("subscriber channel closed unexpectedly")
    {
        SubscriberMessage::Subscribed(handle) => handle,
        other => panic!("expected Subscribed, got {other:?}"),
    };

    setup::append(&pool, "unrelated-stream", &[("Noise", serde_json::json!({}))]).await;
    setup::append(&pool, "orders-2", &[("OrderPlaced", serde_json::json!({"id": 2}))]).await;

    let batch = recv_events(&mut rx).await;
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].event_type, "OrderPlaced");
    assert_eq!(batch[0].stream_id.as_str(), "orders-2");
}
