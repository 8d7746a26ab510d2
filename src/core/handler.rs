//! # Delivery handler abstraction.
//!
//! [`Handler`] is the unit of work the [`WorkerPool`](crate::WorkerPool) runs for
//! every delivery. `Ok(())` means the message was handled and may be acknowledged;
//! any error leaves it unacknowledged for the broker to redeliver.
//!
//! [`HandlerFn`] wraps a closure producing a fresh future per delivery.
//!
//! ## Example
//! ```rust
//! use queue_worker::{Delivery, HandleError, HandlerFn, HandlerRef};
//!
//! let h: HandlerRef = HandlerFn::arc("noop", |_d: Delivery| async { Ok::<_, HandleError>(()) });
//! assert_eq!(h.name(), "noop");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::Delivery;
use crate::error::HandleError;

/// Shared handler handle.
pub type HandlerRef = Arc<dyn Handler>;

/// Processes one delivery.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Handles `delivery`. Must not return before the work is finished.
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandleError>;
}

/// Function-backed handler.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the handler as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandleError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandleError> {
        (self.f)(delivery.clone()).await
    }
}
