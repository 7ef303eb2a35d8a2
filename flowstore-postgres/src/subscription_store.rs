//! CRUD on durable subscription rows, grounded on
//! `eventually-postgres::subscription::PersistentBuilder::get_or_create`
//! and its `GET_OR_CREATE_SUBSCRIPTION`/`CHECKPOINT_SUBSCRIPTION` queries —
//! here expressed as plain SQL rather than stored procedures, since the DDL
//! is a migration concern, not a runtime one.

use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use chrono::{DateTime, Utc};
use flowstore_core::{StoreError, StreamId, Subscription, SubscriptionId, SubscriptionStore};
use tokio_postgres::NoTls;

const INSERT_IF_ABSENT: &str = "INSERT INTO subscriptions \
    (stream_id, subscription_name, last_seen_event_number, last_seen_stream_version) \
    VALUES ($1, $2, $3, $4) \
    ON CONFLICT (stream_id, subscription_name) DO NOTHING \
    RETURNING subscription_id, stream_id, subscription_name, last_seen_event_number, \
              last_seen_stream_version, created_at";

const SELECT_BY_NAME: &str = "SELECT subscription_id, stream_id, subscription_name, \
    last_seen_event_number, last_seen_stream_version, created_at \
    FROM subscriptions WHERE stream_id = $1 AND subscription_name = $2";

const ACK: &str = "UPDATE subscriptions SET \
    last_seen_event_number = COALESCE($2, last_seen_event_number), \
    last_seen_stream_version = COALESCE($3, last_seen_stream_version) \
    WHERE subscription_id = $1";

const DELETE: &str = "DELETE FROM subscriptions WHERE stream_id = $1 AND subscription_name = $2";

#[derive(Clone)]
pub struct PostgresSubscriptionStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: Pool<PostgresConnectionManager<NoTls>>) -> Self {
        Self { pool }
    }
}

fn row_to_subscription(row: &tokio_postgres::Row) -> Result<Subscription, StoreError> {
    let subscription_id: SubscriptionId = row.try_get("subscription_id").map_err(to_backend)?;
    let last_seen_event_number: Option<i64> =
        row.try_get("last_seen_event_number").map_err(to_backend)?;
    let last_seen_stream_version: Option<i64> = row
        .try_get("last_seen_stream_version")
        .map_err(to_backend)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(to_backend)?;

    Ok(Subscription {
        subscription_id,
        stream_id: StreamId::new(row.try_get::<_, String>("stream_id").map_err(to_backend)?),
        name: row.try_get("subscription_name").map_err(to_backend)?,
        last_seen_event_number: last_seen_event_number.map(|v| v as u64),
        last_seen_stream_version: last_seen_stream_version.map(|v| v as u64),
        created_at,
    })
}

fn to_backend(e: tokio_postgres::Error) -> StoreError {
    StoreError::Backend(e.into())
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn subscribe(
        &self,
        stream_id: &StreamId,
        name: &str,
        start_event_number: Option<u64>,
        start_stream_version: Option<u64>,
    ) -> Result<Subscription, StoreError> {
        let client = self.pool.get().await.map_err(|e| StoreError::Backend(e.into()))?;

        let inserted = client
            .query_opt(
                INSERT_IF_ABSENT,
                &[
                    &stream_id.as_str(),
                    &name,
                    &start_event_number.map(|v| v as i64),
                    &start_stream_version.map(|v| v as i64),
                ],
            )
            .await
            .map_err(to_backend)?;

        let row = match inserted {
            Some(row) => row,
            None => client
                .query_one(SELECT_BY_NAME, &[&stream_id.as_str(), &name])
                .await
                .map_err(to_backend)?,
        };

        row_to_subscription(&row)
    }

    async fn ack(
        &self,
        subscription_id: SubscriptionId,
        event_number: Option<u64>,
        stream_version: Option<u64>,
    ) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(|e| StoreError::Backend(e.into()))?;

        client
            .execute(
                ACK,
                &[
                    &subscription_id,
                    &event_number.map(|v| v as i64),
                    &stream_version.map(|v| v as i64),
                ],
            )
            .await
            .map_err(to_backend)?;

        Ok(())
    }

    async fn unsubscribe(&self, stream_id: &StreamId, name: &str) -> Result<(), StoreError> {
        let client = self.pool.get().await.map_err(|e| StoreError::Backend(e.into()))?;

        client
            .execute(DELETE, &[&stream_id.as_str(), &name])
            .await
            .map_err(to_backend)?;

        Ok(())
    }
}
