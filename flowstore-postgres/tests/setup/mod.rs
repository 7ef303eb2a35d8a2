//! Shared harness for the integration tests: spins up a disposable Postgres
//! container, migrates it, and builds a [`SubscriptionRuntime`] against it.
//!
//! Mirrors `eventually-postgres/tests/subscriber.rs`'s container setup, but
//! keyed on `testcontainers-modules::postgres` rather than the bundled
//! image module `eventually-postgres` originally used.
//!
//! Each test binary that does `mod setup;` only exercises a subset of these
//! helpers, so the unused ones warn per-binary; that's expected for a
//! shared test module, not a sign of dead code in the crate itself.
#![allow(dead_code)]

use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use flowstore_postgres::{Config, RuntimeBuilder, SubscriptionRuntime};
use testcontainers::clients::Cli;
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::NoTls;

pub type Manager = PostgresConnectionManager<NoTls>;

/// Starts a disposable Postgres container, returning it alongside the
/// [`Config`] needed to connect to it. Keep the container alive for as long
/// as any runtime built from the config is in use.
pub fn start_container(docker: &Cli) -> (testcontainers::Container<'_, Postgres>, Config) {
    let node = docker.run(Postgres::default());
    let port = node.get_host_port_ipv4(5432);

    let config = Config {
        db_host: "127.0.0.1".to_owned(),
        db_port: port,
        db_username: "postgres".to_owned(),
        db_password: "postgres".to_owned(),
        db_database: "postgres".to_owned(),
        max_buffer_size: 1000,
        catchup_batch_size: 500,
        lock_poll_interval_ms: 50,
    };

    (node, config)
}

/// Builds a migrated [`SubscriptionRuntime`] from a [`Config`]. Each call
/// produces an independent pool/registry, as a separate process connecting
/// to the same database would.
pub async fn build_runtime(config: Config) -> SubscriptionRuntime {
    RuntimeBuilder::new(config)
        .migrate()
        .await
        .expect("failed to run database migrations")
        .build()
}

/// Starts a container and builds a single [`SubscriptionRuntime`] against
/// it. The returned container must be kept alive (not dropped) for as long
/// as the runtime is used.
pub async fn runtime(docker: &Cli) -> (testcontainers::Container<'_, Postgres>, SubscriptionRuntime) {
    let (node, config) = start_container(docker);
    let runtime = build_runtime(config).await;
    (node, runtime)
}

/// Same as [`runtime`], but with a caller-supplied adjustment to the
/// [`Config`] (e.g. to shrink `catchup_batch_size`/`max_buffer_size` for
/// back-pressure tests).
pub async fn runtime_with_config(
    docker: &Cli,
    configure: impl FnOnce(&mut Config),
) -> (testcontainers::Container<'_, Postgres>, SubscriptionRuntime) {
    let (node, mut config) = start_container(docker);
    configure(&mut config);
    let runtime = build_runtime(config).await;
    (node, runtime)
}

/// Appends a batch of events to a stream via the `append_to_store` SQL
/// function installed by the migration, without optimistic-concurrency
/// checking (irrelevant to the subscription runtime under test).
pub async fn append(pool: &Pool<Manager>, stream_id: &str, events: &[(&str, serde_json::Value)]) {
    let client = pool.get().await.expect("failed to get a pooled connection");

    let event_types: Vec<&str> = events.iter().map(|(event_type, _)| *event_type).collect();
    let data: Vec<serde_json::Value> = events.iter().map(|(_, data)| data.clone()).collect();
    let metadata: Vec<serde_json::Value> = events.iter().map(|_| serde_json::json!({})).collect();

    client
        .query_one(
            "SELECT append_to_store($1, 0, false, $2, $3, $4)",
            &[&stream_id, &event_types, &data, &metadata],
        )
        .await
        .expect("append_to_store failed");
}

/// Returns the durable `last_seen_event_number` for a subscription row, or
/// `None` if it doesn't exist (e.g. after `unsubscribe`).
pub async fn subscription_row_exists(pool: &Pool<Manager>, stream_id: &str, name: &str) -> bool {
    let client = pool.get().await.expect("failed to get a pooled connection");

    client
        .query_opt(
            "SELECT 1 FROM subscriptions WHERE stream_id = $1 AND subscription_name = $2",
            &[&stream_id, &name],
        )
        .await
        .expect("query failed")
        .is_some()
}
