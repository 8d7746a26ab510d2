use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;
use reqwest::header::HeaderMap;

/// Status reported when the function could not be reached.
pub const UNAVAILABLE: u16 = 503;

/// Result of one function invocation, carried to the dispatcher.
#[derive(Clone, Debug)]
pub struct InvocationOutcome {
    /// Broker sequence of the originating delivery.
    pub msg_seq: u64,
    /// Function name from the request.
    pub function: String,
    /// Function status, or [`UNAVAILABLE`] on transport failure.
    pub status: u16,
    /// Response body (empty on transport failure).
    pub body: Bytes,
    /// Response headers (empty on transport failure).
    pub headers: HeaderMap,
    /// Time spent in the HTTP call.
    pub duration: Duration,
    /// Time since the delivery was picked up.
    pub time_taken: Duration,
    /// Callback target from the request.
    pub callback_url: Option<Url>,
    /// Correlation id from the request.
    pub call_id: Option<String>,
    /// Transport error, if the call never produced a response.
    pub error: Option<String>,
}

impl InvocationOutcome {
    /// True if the function never answered.
    pub fn is_transport_failure(&self) -> bool {
        self.error.is_some()
    }

    /// `time_taken` in seconds with microsecond precision, as sent in `X-Duration-Seconds`.
    pub fn duration_seconds(&self) -> String {
        format!("{:.6}", self.time_taken.as_secs_f64())
    }
}
