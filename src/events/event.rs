//! # Runtime events emitted by the bridge.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Connection events**: broker session lifecycle and reconnect supervision
//! - **Message events**: per-delivery flow (received, invoked, acked)
//! - **Dispatch events**: callback and report delivery
//! - **Runtime events**: shutdown drain
//!
//! The [`Event`] struct carries optional metadata such as the function name,
//! broker sequence, status code, delays and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use queue_worker::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ReconnectScheduled)
//!     .with_attempt(2)
//!     .with_delay(Duration::from_secs(4));
//!
//! assert_eq!(ev.kind, EventKind::ReconnectScheduled);
//! assert_eq!(ev.delay_ms, Some(4000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Connection events ===
    /// Opening a broker session.
    ///
    /// Sets: `target` (broker url)
    Connecting,

    /// Session established and subscription bound.
    ///
    /// Sets: `target` (subject), `group` (queue group / durable name), `limit` (max in flight)
    Subscribed,

    /// Broker reported the connection as lost.
    ///
    /// Sets: `target` (broker url), `reason`
    Disconnected,

    /// Next reconnect attempt is waiting.
    ///
    /// Sets: `attempt` (1-based), `delay_ms`
    ReconnectScheduled,

    /// A reconnect attempt failed.
    ///
    /// Sets: `attempt`, `reason`
    ReconnectFailed,

    /// A reconnect attempt succeeded.
    ///
    /// Sets: `attempt`
    Reconnected,

    /// Reconnect budget spent; the connection stays absent.
    ///
    /// Sets: `attempt` (budget)
    ReconnectExhausted,

    /// Reconnect loop stopped by a shutdown signal.
    ReconnectAborted,

    /// Shutdown requested (OS signal observed or close called).
    ShutdownRequested,

    /// Broker connection closed and delivery queue shut.
    ConnectionClosed,

    // === Message events ===
    /// Worker picked a delivery from the queue.
    ///
    /// Sets: `msg_seq`, `target` (subject), `worker`, `bytes`, `reason` (redacted payload),
    /// `attempt` (2 on redelivery)
    MessageReceived,

    /// Payload could not be decoded; message will not be acknowledged.
    ///
    /// Sets: `msg_seq`, `reason`
    DecodeFailed,

    /// Handler failed for another reason; message will not be acknowledged.
    ///
    /// Sets: `msg_seq`, `worker`, `reason`
    HandleFailed,

    /// Function invocation started.
    ///
    /// Sets: `msg_seq`, `function`, `target` (url), `bytes`
    Invoking,

    /// Function returned a response (any status).
    ///
    /// Sets: `msg_seq`, `function`, `status`, `duration_ms`, `bytes`
    Invoked,

    /// Function could not be reached; reported as service unavailable.
    ///
    /// Sets: `msg_seq`, `function`, `status`, `duration_ms`, `reason`
    InvokeFailed,

    /// Delivery acknowledged to the broker.
    ///
    /// Sets: `msg_seq`, `worker`
    Acked,

    /// Acknowledgment failed; broker will redeliver after ack wait.
    ///
    /// Sets: `msg_seq`, `reason`
    AckFailed,

    /// Acknowledgment withheld because shutdown is in progress.
    ///
    /// Sets: `msg_seq`
    AckSkipped,

    // === Dispatch events ===
    /// Callback delivered.
    ///
    /// Sets: `msg_seq`, `function`, `target` (callback url), `status`
    CallbackPosted,

    /// Callback could not be delivered (not retried).
    ///
    /// Sets: `msg_seq`, `function`, `target`, `reason`
    CallbackFailed,

    /// Async report delivered.
    ///
    /// Sets: `msg_seq`, `function`, `status`
    ReportPosted,

    /// Async report could not be delivered (not retried).
    ///
    /// Sets: `msg_seq`, `function`, `reason`
    ReportFailed,

    // === Runtime events ===
    /// All workers stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some deliveries were still in flight.
    ///
    /// Sets: `reason` (stuck deliveries)
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Function name, if applicable.
    pub function: Option<Arc<str>>,
    /// URL, subject or subscriber name the event refers to.
    pub target: Option<Arc<str>>,
    /// Human-readable reason (errors, details).
    pub reason: Option<Arc<str>>,
    /// Broker sequence of the delivery.
    pub msg_seq: Option<u64>,
    /// Worker index that handled the delivery.
    pub worker: Option<u32>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// HTTP status code.
    pub status: Option<u16>,
    /// Delay before next attempt in milliseconds.
    pub delay_ms: Option<u64>,
    /// Elapsed time in milliseconds.
    pub duration_ms: Option<u64>,
    /// Payload size in bytes.
    pub bytes: Option<usize>,
    /// Queue group (and durable name) of a subscription.
    pub group: Option<Arc<str>>,
    /// Concurrency limit of a subscription.
    pub limit: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            function: None,
            target: None,
            reason: None,
            msg_seq: None,
            worker: None,
            attempt: None,
            status: None,
            delay_ms: None,
            duration_ms: None,
            bytes: None,
            group: None,
            limit: None,
        }
    }

    /// Attaches a function name.
    #[inline]
    pub fn with_function(mut self, name: impl Into<Arc<str>>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Attaches a target (url, subject, subscriber name).
    #[inline]
    pub fn with_target(mut self, target: impl Into<Arc<str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the broker sequence of a delivery.
    #[inline]
    pub fn with_msg_seq(mut self, seq: u64) -> Self {
        self.msg_seq = Some(seq);
        self
    }

    /// Attaches the worker index.
    #[inline]
    pub fn with_worker(mut self, worker: u32) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches an HTTP status code.
    #[inline]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        self.duration_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a payload size.
    #[inline]
    pub fn with_bytes(mut self, n: usize) -> Self {
        self.bytes = Some(n);
        self
    }

    /// Attaches a subscription's queue group.
    #[inline]
    pub fn with_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Attaches a subscription's concurrency limit.
    #[inline]
    pub fn with_limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}
