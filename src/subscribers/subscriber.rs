//! # Event subscriber trait.
//!
//! Provides [`Subscribe`] an extension point for plugging custom event handlers into the runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only**.
//! - Events are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use queue_worker::{Subscribe, Event, EventKind};
//!
//! struct FailureCounter;
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::InvokeFailed) {
//!             // export a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failures" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (min 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
