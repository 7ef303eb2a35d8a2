//! Top-level wiring: connect a pool, run embedded migrations, then assemble
//! the reader/store/lock/listener/broadcaster/registry.
//!
//! Mirrors the two-step `EventStoreBuilder` / `EventStoreBuilderMigrated`
//! pattern in `eventually-postgres::store`: migrations run once, against a
//! pool, before any other collaborator is constructed. Fixed to `NoTls`
//! rather than generic over `tokio_postgres::tls::MakeTlsConnect` — this
//! runtime has no caller needing TLS, so that generic bound is simplified
//! away (see DESIGN.md).

use std::ops::DerefMut;
use std::sync::Arc;

use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use tokio_postgres::NoTls;

use crate::advisory_lock::PostgresAdvisoryLock;
use crate::config::Config;
use crate::error::Error;
use crate::listener::PostgresNotificationListener;
use crate::reader::PostgresEventReader;
use crate::registry::Registry;
use crate::subscription_store::PostgresSubscriptionStore;
use crate::topics::Topics;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Entry point: owns the configuration until a pool is connected and
/// migrated.
pub struct RuntimeBuilder {
    config: Config,
}

impl RuntimeBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connects a pool against the configured DSN and runs embedded
    /// migrations against it; the migration installs `append_to_store`
    /// with an explicit `pg_notify` call built in, so every commit
    /// re-enables the notification channel without a separate trigger.
    pub async fn migrate(self) -> Result<MigratedRuntimeBuilder, Error> {
        let dsn = self.config.postgres_dsn();
        let manager = PostgresConnectionManager::new_from_stringlike(&dsn, NoTls)?;
        let pool = Pool::builder().build(manager).await?;

        {
            let mut connection = pool.get().await?;
            embedded::migrations::runner()
                .run_async(connection.deref_mut())
                .await
                .map_err(|e| Error::Migration(e.into()))?;
        }

        Ok(MigratedRuntimeBuilder {
            config: self.config,
            pool,
        })
    }
}

/// Builder step after migrations have run; assembles the runtime.
pub struct MigratedRuntimeBuilder {
    config: Config,
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl MigratedRuntimeBuilder {
    /// Wires the reader, subscription store, advisory lock, notification
    /// listener and registry together, and spawns the cluster-wide
    /// notification broadcaster as a background task.
    pub fn build(self) -> SubscriptionRuntime {
        let dsn = self.config.postgres_dsn();

        let reader = Arc::new(PostgresEventReader::new(self.pool.clone()));
        let store = Arc::new(PostgresSubscriptionStore::new(self.pool.clone()));
        let lock = Arc::new(PostgresAdvisoryLock::new(dsn.clone()));
        let listener: Arc<dyn flowstore_core::NotificationListener> =
            Arc::new(PostgresNotificationListener::new(dsn));
        let topics = Arc::new(Topics::new());

        tokio::spawn(crate::broadcaster::run(
            listener,
            PostgresEventReader::new(self.pool.clone()),
            topics.clone(),
        ));

        let registry = Arc::new(Registry::new(reader, store, lock, topics, &self.config));

        SubscriptionRuntime {
            pool: self.pool,
            registry,
        }
    }
}

/// The fully wired subscription runtime. Clone [`registry`](Self::registry)
/// to share it across tasks; subscribing and unsubscribing go through it.
pub struct SubscriptionRuntime {
    pool: Pool<PostgresConnectionManager<NoTls>>,
    registry: Arc<Registry>,
}

impl SubscriptionRuntime {
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// The underlying connection pool, exposed for callers that also need
    /// to append events (append itself is outside this runtime's scope).
    pub fn pool(&self) -> Pool<PostgresConnectionManager<NoTls>> {
        self.pool.clone()
    }
}
