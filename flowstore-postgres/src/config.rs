use envconfig::Envconfig;

/// Runtime configuration for the subscription runtime, read from the
/// environment (matches the `orders-http-api-postgres-store::Config`
/// pattern: `envconfig`-derived, defaulted, DSN assembled on demand).
#[derive(Envconfig, Debug, Clone)]
pub struct Config {
    #[envconfig(from = "DB_HOST", default = "localhost")]
    pub db_host: String,

    #[envconfig(from = "DB_PORT", default = "5432")]
    pub db_port: u16,

    #[envconfig(from = "DB_USERNAME", default = "postgres")]
    pub db_username: String,

    #[envconfig(from = "DB_PASSWORD", default = "password")]
    pub db_password: String,

    #[envconfig(from = "DB_DATABASE", default = "postgres")]
    pub db_database: String,

    /// Maximum number of events buffered in a subscription's
    /// `pending_events` before it transitions to `MaxCapacity`. No default
    /// is mandated by the design, so a conservative one is picked here.
    #[envconfig(from = "SUBSCRIPTION_MAX_BUFFER_SIZE", default = "1000")]
    pub max_buffer_size: usize,

    /// Batch size used by the catch-up worker's paginated reads.
    #[envconfig(from = "SUBSCRIPTION_CATCHUP_BATCH_SIZE", default = "500")]
    pub catchup_batch_size: u32,

    /// Poll interval used while retrying advisory lock acquisition from
    /// `Initial` state.
    #[envconfig(from = "SUBSCRIPTION_LOCK_POLL_INTERVAL_MS", default = "250")]
    pub lock_poll_interval_ms: u64,
}

impl Config {
    pub fn postgres_dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_username, self.db_password, self.db_host, self.db_port, self.db_database
        )
    }
}
