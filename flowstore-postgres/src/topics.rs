//! In-process pub-sub topics keyed by stream identifier (a specific
//! `stream_uuid` or `$all`).
//!
//! This is the "local" variant of a pluggable registration layer
//! (`{start_child, whereis, multi_send}`): a single-node registry of
//! `tokio::sync::broadcast` channels. A distributed variant (globally-named
//! via consensus/leader election) would implement the same [`Topics`]
//! shape but isn't built here — see DESIGN.md.

use std::collections::HashMap;
use std::sync::Mutex;

use flowstore_core::Event;
use tokio::sync::broadcast;

const TOPIC_CHANNEL_SIZE: usize = 256;

pub struct Topics {
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<Event>>>>,
}

impl Default for Topics {
    fn default() -> Self {
        Self::new()
    }
}

impl Topics {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to a topic, creating it if it doesn't exist yet.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<Event>> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_SIZE).0)
            .subscribe()
    }

    /// Publishes a batch on a topic. Fire-and-forget: if nobody is
    /// subscribed, the batch is simply dropped.
    pub fn publish(&self, topic: &str, batch: Vec<Event>) {
        let channels = self.channels.lock().unwrap();
        if let Some(sender) = channels.get(topic) {
            // Err only means there are currently no receivers; that's a
            // valid state, not a failure: publishing is best-effort.
            let _ = sender.send(batch);
        }
    }
}
