//! # LogWriter: event printer over `tracing`
//!
//! Renders incoming [`Event`]s as structured `tracing` records. Installed by the
//! binary so operators see the bridge lifecycle without extra wiring.
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  subscribed subject="faas-request" group="faas" max_in_flight=4
//! INFO  invoked function="echo" seq=12 status=200 duration_ms=31
//! WARN  reconnect scheduled attempt=2 delay_ms=4000
//! ERROR reconnect budget spent attempts=120
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn s(v: &Option<std::sync::Arc<str>>) -> &str {
    v.as_deref().unwrap_or("")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::Connecting => {
                tracing::info!(url = s(&e.target), "connecting");
            }
            EventKind::Subscribed => {
                tracing::info!(
                    subject = s(&e.target),
                    group = s(&e.group),
                    max_in_flight = e.limit,
                    "subscribed"
                );
            }
            EventKind::Disconnected => {
                tracing::warn!(url = s(&e.target), reason = s(&e.reason), "disconnected");
            }
            EventKind::ReconnectScheduled => {
                tracing::warn!(attempt = e.attempt, delay_ms = e.delay_ms, "reconnect scheduled");
            }
            EventKind::ReconnectFailed => {
                tracing::warn!(attempt = e.attempt, reason = s(&e.reason), "reconnect failed");
            }
            EventKind::Reconnected => {
                tracing::info!(attempt = e.attempt, "reconnected");
            }
            EventKind::ReconnectExhausted => {
                tracing::error!(attempts = e.attempt, "reconnect budget spent");
            }
            EventKind::ReconnectAborted => {
                tracing::info!("reconnect aborted by shutdown");
            }
            EventKind::ShutdownRequested => {
                tracing::info!("shutdown requested");
            }
            EventKind::ConnectionClosed => {
                tracing::info!("connection closed");
            }
            EventKind::MessageReceived => {
                tracing::info!(
                    seq = e.msg_seq,
                    subject = s(&e.target),
                    worker = e.worker,
                    body = s(&e.reason),
                    "message received"
                );
            }
            EventKind::DecodeFailed => {
                tracing::error!(seq = e.msg_seq, reason = s(&e.reason), "decode failed");
            }
            EventKind::HandleFailed => {
                tracing::error!(seq = e.msg_seq, worker = e.worker, reason = s(&e.reason), "handle failed");
            }
            EventKind::Invoking => {
                tracing::debug!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    url = s(&e.target),
                    bytes = e.bytes,
                    "invoking"
                );
            }
            EventKind::Invoked => {
                tracing::info!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    status = e.status,
                    duration_ms = e.duration_ms,
                    bytes = e.bytes,
                    "invoked"
                );
            }
            EventKind::InvokeFailed => {
                tracing::warn!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    status = e.status,
                    duration_ms = e.duration_ms,
                    reason = s(&e.reason),
                    "invoke failed"
                );
            }
            EventKind::Acked => {
                tracing::debug!(seq = e.msg_seq, worker = e.worker, "acked");
            }
            EventKind::AckFailed => {
                tracing::warn!(seq = e.msg_seq, reason = s(&e.reason), "ack failed");
            }
            EventKind::AckSkipped => {
                tracing::info!(seq = e.msg_seq, "ack withheld during shutdown");
            }
            EventKind::CallbackPosted => {
                tracing::info!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    url = s(&e.target),
                    status = e.status,
                    "callback posted"
                );
            }
            EventKind::CallbackFailed => {
                tracing::warn!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    url = s(&e.target),
                    reason = s(&e.reason),
                    "callback failed"
                );
            }
            EventKind::ReportPosted => {
                tracing::debug!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    status = e.status,
                    "report posted"
                );
            }
            EventKind::ReportFailed => {
                tracing::warn!(
                    seq = e.msg_seq,
                    function = s(&e.function),
                    reason = s(&e.reason),
                    "report failed"
                );
            }
            EventKind::AllStoppedWithin => {
                tracing::info!("all workers stopped within grace");
            }
            EventKind::GraceExceeded => {
                tracing::error!(stuck = s(&e.reason), "grace exceeded");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
