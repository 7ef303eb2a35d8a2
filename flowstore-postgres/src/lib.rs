//! PostgreSQL-backed implementation of the `flowstore` persistent, ordered
//! subscription runtime.
//!
//! See [`actor`] for the central per-subscription state machine, and
//! [`registry`] for the supervisor that wires subscriptions together.

pub mod actor;
pub mod advisory_lock;
pub mod broadcaster;
pub mod catchup;
pub mod config;
pub mod error;
#[cfg(test)]
pub(crate) mod fakes;
pub mod handle;
pub mod listener;
pub mod reader;
pub mod registry;
pub mod subscription_store;
pub mod topics;
pub mod runtime;

pub use config::Config;
pub use error::Error;
pub use handle::{Mapper, Selector, SubscribeOptions, Subscriber, SubscriberMessage};
pub use registry::Registry;
pub use runtime::{MigratedRuntimeBuilder, RuntimeBuilder, SubscriptionRuntime};
