//! # Invocation pipeline.
//!
//! ```text
//! QueueRequest ─► function_url ─► POST (body + copied headers) ─┬─► response ─► read body
//!                                                               └─► transport error ─► 503
//!                                         ▼
//!                                InvocationOutcome
//! ```
//!
//! Any HTTP status is a valid outcome; only a missing response is mapped to
//! `503 Service Unavailable`. The pipeline never fails.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::{InvocationOutcome, QueueRequest, UNAVAILABLE, function_url};
use crate::config::Config;
use crate::events::{Bus, Event, EventKind};

/// Headers owned by the transport; never forwarded.
const SKIPPED: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

/// Calls functions on behalf of queued requests.
#[derive(Clone)]
pub struct Invoker {
    client: reqwest::Client,
    config: Arc<Config>,
    bus: Bus,
}

impl Invoker {
    /// Creates an invoker over the shared client.
    pub fn new(client: reqwest::Client, config: Arc<Config>, bus: Bus) -> Self {
        Self { client, config, bus }
    }

    /// Invokes the function named by `req`.
    ///
    /// `started` marks when the delivery was picked up; it anchors
    /// [`InvocationOutcome::time_taken`].
    pub async fn invoke(&self, req: &QueueRequest, msg_seq: u64, started: Instant) -> InvocationOutcome {
        let url = function_url(req, &self.config);
        self.bus.publish(
            Event::new(EventKind::Invoking)
                .with_msg_seq(msg_seq)
                .with_function(req.function.as_str())
                .with_target(url.as_str())
                .with_bytes(req.body.len()),
        );
        if self.config.debug_print_body {
            tracing::debug!(seq = msg_seq, body = %String::from_utf8_lossy(&req.body), "request body");
        }

        let call = Instant::now();
        let sent = self
            .client
            .post(&url)
            .headers(copy_headers(&req.header))
            .body(req.body.clone())
            .send()
            .await;

        let mut outcome = InvocationOutcome {
            msg_seq,
            function: req.function.clone(),
            status: UNAVAILABLE,
            body: Bytes::new(),
            headers: HeaderMap::new(),
            duration: call.elapsed(),
            time_taken: started.elapsed(),
            callback_url: req.callback_url.clone(),
            call_id: req.call_id().map(str::to_owned),
            error: None,
        };

        match sent {
            Ok(res) => {
                outcome.status = res.status().as_u16();
                outcome.headers = res.headers().clone();
                outcome.body = match res.bytes().await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(seq = msg_seq, function = %req.function, error = %e, "error reading body");
                        Bytes::new()
                    }
                };
                outcome.duration = call.elapsed();
                outcome.time_taken = started.elapsed();

                if self.config.write_debug {
                    tracing::debug!(
                        seq = msg_seq,
                        body = %String::from_utf8_lossy(&outcome.body),
                        "function response"
                    );
                }
                self.bus.publish(
                    Event::new(EventKind::Invoked)
                        .with_msg_seq(msg_seq)
                        .with_function(req.function.as_str())
                        .with_status(outcome.status)
                        .with_duration(outcome.duration)
                        .with_bytes(outcome.body.len()),
                );
            }
            Err(e) => {
                outcome.error = Some(e.to_string());
                self.bus.publish(
                    Event::new(EventKind::InvokeFailed)
                        .with_msg_seq(msg_seq)
                        .with_function(req.function.as_str())
                        .with_status(UNAVAILABLE)
                        .with_duration(outcome.duration)
                        .with_reason(e.to_string()),
                );
            }
        }
        outcome
    }
}

/// Converts a header map into transport headers.
///
/// Invalid names or values are dropped; transport-owned headers are skipped.
pub(crate) fn copy_headers<'a, I, V>(source: I) -> HeaderMap
where
    I: IntoIterator<Item = (&'a String, V)>,
    V: IntoIterator<Item = &'a String>,
{
    let mut out = HeaderMap::new();
    for (name, values) in source {
        if SKIPPED.iter().any(|s| name.eq_ignore_ascii_case(s)) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "dropping invalid header name");
            continue;
        };
        for v in values {
            match HeaderValue::from_str(v) {
                Ok(v) => {
                    out.append(name.clone(), v);
                }
                Err(_) => tracing::warn!(header = %name, "dropping invalid header value"),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn copies_multi_valued_headers_and_skips_transport_ones() {
        let mut h: BTreeMap<String, Vec<String>> = BTreeMap::new();
        h.insert("X-Call-Id".into(), vec!["1".into()]);
        h.insert("Accept".into(), vec!["a".into(), "b".into()]);
        h.insert("Host".into(), vec!["evil".into()]);
        h.insert("Content-Length".into(), vec!["999".into()]);
        h.insert("Bad Name".into(), vec!["x".into()]);

        let out = copy_headers(&h);
        assert_eq!(out["x-call-id"], "1");
        assert_eq!(out.get_all("accept").iter().count(), 2);
        assert!(!out.contains_key("host"));
        assert!(!out.contains_key("content-length"));
        assert_eq!(out.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_function_yields_unavailable() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let cfg = Config {
            gateway_invoke: true,
            gateway_address: "127.0.0.1".into(),
            gateway_port: 1,
            ..Config::default()
        };
        let invoker = Invoker::new(reqwest::Client::new(), Arc::new(cfg), bus);
        let req = QueueRequest {
            function: "echo".into(),
            callback_url: Some("http://cb.local/".parse().unwrap()),
            ..QueueRequest::default()
        };

        let out = invoker.invoke(&req, 9, Instant::now()).await;
        assert!(out.is_transport_failure());
        assert_eq!(out.status, UNAVAILABLE);
        assert!(out.body.is_empty());
        assert_eq!(out.callback_url.unwrap().as_str(), "http://cb.local/");

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Invoking);
        let failed = rx.recv().await.unwrap();
        assert_eq!(failed.kind, EventKind::InvokeFailed);
        assert_eq!(failed.msg_seq, Some(9));
    }
}
