//! Teardown: `unsubscribe` deletes the durable row and terminates delivery;
//! acking against an already-torn-down subscription is
//! a silent no-op.

mod setup;

use std::time::Duration;

use flowstore_core::{Ack, Event, StartFrom};
use flowstore_postgres::{SubscribeOptions, SubscriberMessage};
use testcontainers::clients::Cli;

#[tokio::test]
async fn unsubscribe_deletes_the_row_and_closes_the_channel() {
    let docker = Cli::default();
    let (_node, runtime) = setup::runtime(&docker).await;
    let pool = runtime.pool();
    let registry = runtime.registry();

    setup::append(&pool, "orders-6", &[("OrderPlaced", serde_json::json!({}))]).await;

    let mut rx = registry
        .subscribe_to_stream::<Event>("orders-6", "unsubscribe_test", SubscribeOptions::raw(StartFrom::Origin))
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

    let batch = match tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for Events")
        .expect("subscriber channel closed unexpectedly")
    {
        SubscriberMessage::Events(events) => events,
        other => panic!("expected Events, got {other:?}"),
    };

    assert!(setup::subscription_row_exists(&pool, "orders-6", "unsubscribe_test").await);

    handle.ack(Ack::Events(batch)).await.expect("ack failed");
    handle.unsubscribe().await.expect("unsubscribe failed");

    let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel closure");
    assert!(closed.is_none());

    assert!(!setup::subscription_row_exists(&pool, "orders-6", "unsubscribe_test").await);

    // Acking against a dead handle is a silent no-op, not an error.
    handle.ack(Ack::Position(1)).await.expect("ack on a dead subscription must not error");
}
