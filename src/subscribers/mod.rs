//! # Event subscribers for the bridge runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and
//! the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ConnectionManager ┐
//!   Worker 1..N       ├─ publish(Event) ─► Bus ─► listener ─► SubscriberSet::emit
//!   Dispatcher        ┘                                          │
//!                                                         ┌──────┴──────┐
//!                                                         ▼             ▼
//!                                                     LogWriter   impl Subscribe
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
