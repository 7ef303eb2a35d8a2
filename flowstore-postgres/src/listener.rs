//! Subscribes to the database's asynchronous `events` channel, emitting
//! `(first_event_number, last_event_number)` ranges in commit order
//! without coalescing.
//!
//! Grounded on `eventually-postgres::subscriber::EventSubscriber::new`:
//! a dedicated `tokio_postgres::connect`, a `poll_fn` over
//! `connection.poll_message`, and `LISTEN <channel>;` issued once the
//! client is ready. On disconnect we reconnect and re-`LISTEN`, but do not
//! attempt to replay missed ranges — recovery is the catch-up path's job.

use std::time::Duration;

use flowstore_core::{NotificationListener, ReadError};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio_postgres::AsyncMessage;
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL: &str = "events";
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct PostgresNotificationListener {
    dsn: String,
}

impl PostgresNotificationListener {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self { dsn: dsn.into() }
    }

    async fn run_once(dsn: &str, tx: &mpsc::Sender<Result<(u64, u64), ReadError>>) -> bool {
        let connected = tokio_postgres::connect(dsn, tokio_postgres::NoTls).await;

        let (client, mut connection) = match connected {
            Ok(pair) => pair,
            Err(error) => {
                let _ = tx.send(Err(ReadError::Backend(error.into()))).await;
                return false;
            }
        };

        if let Err(error) = client.batch_execute(&format!("LISTEN {CHANNEL}")).await {
            let _ = tx.send(Err(ReadError::Backend(error.into()))).await;
            return false;
        }

        let mut stream = futures::stream::poll_fn(move |cx| connection.poll_message(cx));

        while let Some(message) = stream.next().await {
            match message {
                Ok(AsyncMessage::Notification(notification)) => {
                    match parse_payload(notification.payload()) {
                        Ok(range) => {
                            if tx.send(Ok(range)).await.is_err() {
                                return true;
                            }
                        }
                        Err(error) => {
                            if tx.send(Err(error)).await.is_err() {
                                return true;
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    let _ = tx.send(Err(ReadError::Backend(error.into()))).await;
                    return false;
                }
            }
        }

        false
    }
}

fn parse_payload(payload: &str) -> Result<(u64, u64), ReadError> {
    let (first, last) = payload
        .split_once(',')
        .ok_or_else(|| ReadError::Backend(anyhow::anyhow!("malformed notification payload: {payload}")))?;

    let first: u64 = first
        .parse()
        .map_err(|_| ReadError::Backend(anyhow::anyhow!("malformed notification payload: {payload}")))?;
    let last: u64 = last
        .parse()
        .map_err(|_| ReadError::Backend(anyhow::anyhow!("malformed notification payload: {payload}")))?;

    Ok((first, last))
}

impl NotificationListener for PostgresNotificationListener {
    fn listen(&self) -> BoxStream<'static, Result<(u64, u64), ReadError>> {
        let (tx, rx) = mpsc::channel(128);
        let dsn = self.dsn.clone();

        tokio::spawn(async move {
            loop {
                let should_stop = Self::run_once(&dsn, &tx).await;
                if should_stop || tx.is_closed() {
                    break;
                }
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
