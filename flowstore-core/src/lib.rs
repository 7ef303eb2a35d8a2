//! Storage-agnostic domain types for the `flowstore` subscription runtime.
//!
//! This crate contains no I/O: it defines the `Event`/`Subscription` data
//! model and the trait seams (`EventReader`, `SubscriptionStore`,
//! `AdvisoryLock`, `NotificationListener`) that a backend crate — see
//! `flowstore-postgres` — implements.
//!
//! You should not depend on this crate directly in an application; import
//! `flowstore-postgres` instead.

pub mod error;
pub mod event;
pub mod stream;
pub mod subscription;
pub mod traits;

pub use error::{ReadError, StoreError};
pub use event::Event;
pub use stream::{StreamId, ALL_STREAM};
pub use subscription::{Ack, ResolvedAck, StartFrom, Subscription, SubscriptionId, SubscriptionKind};
pub use traits::{
    AdvisoryLock, EventReader, LockGuard, LockOutcome, NotificationListener, SubscriptionStore,
};
