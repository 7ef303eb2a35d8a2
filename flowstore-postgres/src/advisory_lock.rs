//! Database-scoped exclusive advisory lock keyed by subscription id,
//! the cluster-wide single-active-subscriber primitive.
//!
//! Grounded on the session-holding-connection pattern in
//! `eventually-postgres::subscriber::EventSubscriber::new` (a dedicated
//! `tokio_postgres::connect` whose driving future is spawned separately
//! from the `Client` used to issue commands) and on the advisory-lock
//! usage in `thalo-rs-message-db`'s `message_store.acquire_lock`.
//! Each acquisition attempt opens its own session:
//! sharing one session across subscriptions would mean one subscription's
//! teardown silently released another's lock.

use flowstore_core::{AdvisoryLock, LockGuard, LockOutcome, ReadError, SubscriptionId};

use async_trait::async_trait;
use tokio_postgres::NoTls;

const TRY_LOCK: &str = "SELECT pg_try_advisory_lock($1)";

/// Opens a dedicated session per lock attempt against the given DSN.
#[derive(Clone)]
pub struct PostgresAdvisoryLock {
    dsn: String,
}

impl PostgresAdvisoryLock {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }
}

#[async_trait]
impl AdvisoryLock for PostgresAdvisoryLock {
    async fn try_acquire_exclusive(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<LockOutcome, ReadError> {
        let (client, connection) = tokio_postgres::connect(&self.dsn, NoTls)
            .await
            .map_err(|e| ReadError::Backend(e.into()))?;

        let task = tokio::spawn(async move {
            if let Err(error) = connection.await {
                tracing::debug!(%error, "advisory lock session connection terminated");
            }
        });

        let row = client
            .query_one(TRY_LOCK, &[&subscription_id])
            .await
            .map_err(|e| ReadError::Backend(e.into()))?;

        let acquired: bool = row.get(0);

        if !acquired {
            task.abort();
            return Ok(LockOutcome::Taken);
        }

        tracing::debug!(subscription_id, "advisory lock acquired");

        Ok(LockOutcome::Acquired(Box::new(SessionLockGuard {
            client,
            task,
            subscription_id,
        })))
    }
}

/// Holds the session that owns the advisory lock. Dropping it drops the
/// `Client`, which closes the connection and releases the lock — the
/// lock is released implicitly when the holding session terminates.
struct SessionLockGuard {
    // Never queried again after acquisition; held only so dropping this
    // guard drops the session and releases the lock.
    #[allow(dead_code)]
    client: tokio_postgres::Client,
    task: tokio::task::JoinHandle<()>,
    subscription_id: SubscriptionId,
}

impl LockGuard for SessionLockGuard {}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        tracing::debug!(subscription_id = self.subscription_id, "releasing advisory lock");
        self.task.abort();
    }
}
