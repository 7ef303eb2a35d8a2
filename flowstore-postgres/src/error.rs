use thiserror::Error;

/// Top-level error type for the `flowstore-postgres` runtime.
///
/// Mirrors `eventually-postgres::store::Error`: a thin `thiserror` wrapper
/// around the driver/pool errors, plus the runtime's own failure modes.
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the `tokio-postgres` driver.
    #[error("postgres client returned an error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Error returned by the `bb8` connection pool.
    #[error("bb8 connection pool returned an error: {0}")]
    Bb8(#[from] bb8::RunError<tokio_postgres::Error>),

    /// Error returned while running embedded migrations.
    #[error("failed to run database migrations: {0}")]
    Migration(#[source] anyhow::Error),

    /// A live local subscription with the same `(stream, name)` already
    /// exists.
    #[error("subscription already exists")]
    SubscriptionAlreadyExists,

    /// Raised internally when the advisory lock for a subscription is
    /// currently held by another session; the state machine catches this
    /// and retries, it should never escape to a caller.
    #[error("advisory lock already taken")]
    LockAlreadyTaken,

    #[error(transparent)]
    Read(#[from] flowstore_core::ReadError),

    #[error(transparent)]
    Store(#[from] flowstore_core::StoreError),
}
