//! Retry policies.
//!
//! ## Contents
//! - [`ReconnectPolicy`] how many times and how long to wait when the broker connection is lost
//!
//! ## Quick wiring
//! ```text
//! Config { max_reconnect, reconnect_delay }
//!      └─► Config::reconnect_policy()
//!           └─► core::ConnectionManager uses policy.delay_for(i) before attempt i
//! ```

mod reconnect;

pub use reconnect::ReconnectPolicy;
