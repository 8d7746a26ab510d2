//! Runtime core: broker connection, worker pool and lifecycle.
//!
//! Internal modules:
//! - [`manager`]: owns the broker session, forwards deliveries, supervises reconnects;
//! - [`pool`]: fixed set of workers handling deliveries with ack-after-handle;
//! - [`handler`]: the per-delivery unit of work;
//! - [`state`]: connection lifecycle states;
//! - [`shutdown`]: cross-platform termination signal handling.

mod handler;
mod manager;
mod pool;
mod shutdown;
mod state;

pub use handler::{Handler, HandlerFn, HandlerRef};
pub use manager::ConnectionManager;
pub use pool::{Acknowledge, PoolParams, WorkerPool};
pub use shutdown::wait_for_signal;
pub use state::ConnectionState;
