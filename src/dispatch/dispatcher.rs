//! # Result and report dispatch.
//!
//! For every [`InvocationOutcome`]:
//! 1. callback (only when the request named one): function body and headers plus
//!    `X-Duration-Seconds`, `X-Function-Status`, `X-Function-Name` and `X-Call-Id`,
//!    signed before sending;
//! 2. report (unless disabled): [`AsyncReport`] JSON to the gateway, with basic auth
//!    when credentials are loaded.
//!
//! Both posts are best-effort. Failures surface as events and never reach the caller.

use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::AsyncReport;
use crate::auth::BasicAuthCredentials;
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind};
use crate::invoke::InvocationOutcome;
use crate::signing::Signer;

const SKIPPED: [&str; 4] = ["host", "content-length", "transfer-encoding", "connection"];

/// Posts callbacks and async reports.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    signer: Signer,
    report_url: Option<String>,
    credentials: Option<BasicAuthCredentials>,
    bus: Bus,
}

impl Dispatcher {
    /// Creates a dispatcher.
    ///
    /// `report_url = None` disables the async report.
    pub fn new(
        client: reqwest::Client,
        signer: Signer,
        report_url: Option<String>,
        credentials: Option<BasicAuthCredentials>,
        bus: Bus,
    ) -> Self {
        Self {
            client,
            signer,
            report_url,
            credentials,
            bus,
        }
    }

    /// Runs the callback and report steps for `outcome`.
    pub async fn dispatch(&self, outcome: &InvocationOutcome) {
        if let Some(url) = &outcome.callback_url {
            let ev = match self.post_callback(url, outcome).await {
                Ok(status) => Event::new(EventKind::CallbackPosted).with_status(status),
                Err(e) => Event::new(EventKind::CallbackFailed).with_reason(e.to_string()),
            };
            self.bus.publish(
                ev.with_msg_seq(outcome.msg_seq)
                    .with_function(outcome.function.as_str())
                    .with_target(url.as_str()),
            );
        }

        if let Some(report_url) = &self.report_url {
            let ev = match self.post_report(report_url, outcome).await {
                Ok(status) => Event::new(EventKind::ReportPosted).with_status(status),
                Err(e) => Event::new(EventKind::ReportFailed).with_reason(e.to_string()),
            };
            self.bus.publish(
                ev.with_msg_seq(outcome.msg_seq)
                    .with_function(outcome.function.as_str())
                    .with_target(report_url.as_str()),
            );
        }
    }

    /// Posts the function result to `url`. Returns the callback's status code.
    pub async fn post_callback(&self, url: &Url, outcome: &InvocationOutcome) -> Result<u16, DispatchError> {
        let mut req = self
            .client
            .post(url.clone())
            .headers(callback_headers(outcome))
            .body(outcome.body.clone())
            .build()
            .map_err(|e| DispatchError::Build {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        self.signer.sign(&mut req)?;

        let res = self
            .client
            .execute(req)
            .await
            .map_err(|e| DispatchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(res.status().as_u16())
    }

    /// Posts the async report. Returns the gateway's status code.
    pub async fn post_report(&self, report_url: &str, outcome: &InvocationOutcome) -> Result<u16, DispatchError> {
        let mut builder = self.client.post(report_url).json(&AsyncReport::from(outcome));
        if let Some(c) = &self.credentials {
            builder = builder.basic_auth(&c.user, Some(&c.password));
        }
        let req = builder.build().map_err(|e| DispatchError::Build {
            url: report_url.to_owned(),
            reason: e.to_string(),
        })?;

        let res = self
            .client
            .execute(req)
            .await
            .map_err(|e| DispatchError::Transport {
                url: report_url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(res.status().as_u16())
    }
}

/// Headers of the callback request: the function's response headers plus the
/// synthetic `X-*` set.
pub fn callback_headers(outcome: &InvocationOutcome) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in &outcome.headers {
        if SKIPPED.iter().any(|s| name.as_str() == *s) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    let mut set = |name: &'static str, value: &str| match HeaderValue::from_str(value) {
        Ok(v) => {
            out.insert(HeaderName::from_static(name), v);
        }
        Err(_) => tracing::warn!(header = name, "dropping invalid callback header"),
    };
    set("x-duration-seconds", &outcome.duration_seconds());
    set("x-function-status", &outcome.status.to_string());
    set("x-function-name", &outcome.function);
    if let Some(id) = &outcome.call_id {
        set("x-call-id", id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;

    fn outcome() -> InvocationOutcome {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("content-length", HeaderValue::from_static("2"));
        headers.insert("x-function-status", HeaderValue::from_static("spoofed"));
        InvocationOutcome {
            msg_seq: 1,
            function: "echo".into(),
            status: 200,
            body: Bytes::from_static(b"hi"),
            headers,
            duration: Duration::from_millis(20),
            time_taken: Duration::from_micros(1_500_250),
            callback_url: None,
            call_id: Some("call-1".into()),
            error: None,
        }
    }

    #[test]
    fn callback_headers_carry_synthetic_values() {
        let h = callback_headers(&outcome());
        assert_eq!(h["content-type"], "text/plain");
        assert!(!h.contains_key("content-length"));
        assert_eq!(h["x-duration-seconds"], "1.500250");
        assert_eq!(h["x-function-status"], "200");
        assert_eq!(h["x-function-name"], "echo");
        assert_eq!(h["x-call-id"], "call-1");
    }

    #[test]
    fn call_id_is_omitted_when_absent() {
        let mut o = outcome();
        o.call_id = None;
        assert!(!callback_headers(&o).contains_key("x-call-id"));
    }

    #[tokio::test]
    async fn unreachable_targets_become_events() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let d = Dispatcher::new(
            reqwest::Client::new(),
            Signer::Disabled,
            Some("http://127.0.0.1:1/system/async-report".into()),
            None,
            bus,
        );
        let mut o = outcome();
        o.callback_url = Some("http://127.0.0.1:1/cb".parse().unwrap());

        d.dispatch(&o).await;

        let cb = rx.recv().await.unwrap();
        assert_eq!(cb.kind, EventKind::CallbackFailed);
        assert_eq!(cb.target.as_deref(), Some("http://127.0.0.1:1/cb"));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ReportFailed);
    }
}
