//! Paginated forward reader over a stream or the `$all` view, grounded on
//! `eventually-postgres::store::EventStore::stream_query` — a pooled
//! connection, a `query_raw` call and a typed row mapping.

use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use flowstore_core::{Event, EventReader, ReadError, StreamId};
use tokio_postgres::NoTls;

const READ: &str = "SELECT event_number, id, stream_id, stream_version, event_type, \
    correlation_id, causation_id, data, metadata, created_at \
    FROM events WHERE stream_id = $1 AND stream_version >= $2 \
    ORDER BY stream_version ASC LIMIT $3";

const READ_ALL: &str = "SELECT event_number, id, stream_id, stream_version, event_type, \
    correlation_id, causation_id, data, metadata, created_at \
    FROM events WHERE event_number >= $1 \
    ORDER BY event_number ASC LIMIT $2";

const CURRENT_EVENT_NUMBER: &str = "SELECT COALESCE(MAX(event_number), 0) FROM events";

const CURRENT_STREAM_VERSION: &str =
    "SELECT COALESCE(MAX(stream_version), 0) FROM events WHERE stream_id = $1";

#[derive(Clone)]
pub struct PostgresEventReader {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresEventReader {
    pub fn new(pool: Pool<PostgresConnectionManager<NoTls>>) -> Self {
        Self { pool }
    }
}

fn row_to_event(row: &tokio_postgres::Row) -> Result<Event, ReadError> {
    let event_number: i64 = row.try_get("event_number").map_err(to_backend)?;
    let stream_version: i64 = row.try_get("stream_version").map_err(to_backend)?;

    Ok(Event {
        id: row.try_get("id").map_err(to_backend)?,
        event_number: event_number as u64,
        stream_id: StreamId::new(row.try_get::<_, String>("stream_id").map_err(to_backend)?),
        stream_version: stream_version as u64,
        event_type: row.try_get("event_type").map_err(to_backend)?,
        correlation_id: row.try_get("correlation_id").map_err(to_backend)?,
        causation_id: row.try_get("causation_id").map_err(to_backend)?,
        data: serde_json::to_vec(&row.try_get::<_, serde_json::Value>("data").map_err(to_backend)?)
            .map_err(|e| ReadError::Backend(e.into()))?,
        metadata: serde_json::to_vec(
            &row.try_get::<_, serde_json::Value>("metadata")
                .map_err(to_backend)?,
        )
        .map_err(|e| ReadError::Backend(e.into()))?,
        created_at: row.try_get("created_at").map_err(to_backend)?,
    })
}

fn to_backend(e: tokio_postgres::Error) -> ReadError {
    ReadError::Backend(e.into())
}

#[async_trait]
impl EventReader for PostgresEventReader {
    async fn read(
        &self,
        stream_id: &StreamId,
        from_version: u64,
        max: u32,
    ) -> Result<Vec<Event>, ReadError> {
        if self.current_stream_version(stream_id).await? == 0 {
            return Err(ReadError::StreamNotFound);
        }

        let client = self.pool.get().await.map_err(|e| ReadError::Backend(e.into()))?;
        let rows = client
            .query(
                READ,
                &[&stream_id.as_str(), &(from_version as i64), &(max as i64)],
            )
            .await
            .map_err(to_backend)?;

        rows.iter().map(row_to_event).collect()
    }

    async fn read_all(&self, from_event_number: u64, max: u32) -> Result<Vec<Event>, ReadError> {
        let client = self.pool.get().await.map_err(|e| ReadError::Backend(e.into()))?;
        let rows = client
            .query(READ_ALL, &[&(from_event_number as i64), &(max as i64)])
            .await
            .map_err(to_backend)?;

        rows.iter().map(row_to_event).collect()
    }

    async fn current_event_number(&self) -> Result<u64, ReadError> {
        let client = self.pool.get().await.map_err(|e| ReadError::Backend(e.into()))?;
        let row = client
            .query_one(CURRENT_EVENT_NUMBER, &[])
            .await
            .map_err(to_backend)?;
        let value: i64 = row.try_get(0).map_err(to_backend)?;
        Ok(value as u64)
    }

    async fn current_stream_version(&self, stream_id: &StreamId) -> Result<u64, ReadError> {
        let client = self.pool.get().await.map_err(|e| ReadError::Backend(e.into()))?;
        let row = client
            .query_one(CURRENT_STREAM_VERSION, &[&stream_id.as_str()])
            .await
            .map_err(to_backend)?;
        let value: i64 = row.try_get(0).map_err(to_backend)?;
        Ok(value as u64)
    }
}
