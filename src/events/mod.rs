//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ConnectionManager`, `WorkerPool` workers, `QueueHandler`,
//!   `Dispatcher`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by [`crate::subscribers::SubscriberSet::listen`],
//!   and tests that observe the runtime.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
