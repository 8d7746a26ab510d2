//! Error types used by the bridge runtime.
//!
//! Every failure class of the bridge has its own enum:
//!
//! - [`BrokerError`] connection, subscription and acknowledgment failures.
//! - [`DecodeError`] malformed inbound message payloads.
//! - [`SignError`] failures while loading a signing key or signing a request.
//! - [`DispatchError`] callback/report delivery failures.
//! - [`HandleError`] the per-message outcome reported back to the worker pool.
//! - [`ConfigError`] invalid configuration that must abort startup.
//! - [`RuntimeError`] failures of the runtime itself (shutdown grace exceeded).
//!
//! All enums provide `as_label()` a short stable label for logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the bridge runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some deliveries were still being handled.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Deliveries that were still in flight.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use queue_worker::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors produced by a broker backend or the connection manager.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker could not be reached.
    #[error("can't connect to {url}: {reason}")]
    Connect {
        /// Broker address.
        url: String,
        /// Underlying error message.
        reason: String,
    },

    /// Connection was established but the subscription could not be created.
    #[error("couldn't subscribe to {subject} at {url}: {reason}")]
    Subscribe {
        /// Subject that was requested.
        subject: String,
        /// Broker address.
        url: String,
        /// Underlying error message.
        reason: String,
    },

    /// Acknowledgment could not be delivered.
    #[error("ack failed: {reason}")]
    Ack {
        /// Underlying error message.
        reason: String,
    },

    /// Closing the connection reported an error.
    #[error("close failed: {reason}")]
    Close {
        /// Underlying error message.
        reason: String,
    },

    /// No connection is currently established.
    #[error("no active broker connection")]
    NotConnected,

    /// The connection manager was already closed.
    #[error("connection closed")]
    Closed,
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Connect { .. } => "broker_connect",
            BrokerError::Subscribe { .. } => "broker_subscribe",
            BrokerError::Ack { .. } => "broker_ack",
            BrokerError::Close { .. } => "broker_close",
            BrokerError::NotConnected => "broker_not_connected",
            BrokerError::Closed => "broker_closed",
        }
    }
}

/// # Errors produced while decoding an inbound message.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not a valid queue request document.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Function name is missing or blank.
    #[error("function name is empty")]
    EmptyFunction,

    /// Callback URL could not be parsed.
    #[error("invalid callback url {url:?}: {reason}")]
    CallbackUrl {
        /// Raw value from the payload.
        url: String,
        /// Parser message.
        reason: String,
    },
}

impl DecodeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DecodeError::Json(_) => "decode_json",
            DecodeError::EmptyFunction => "decode_empty_function",
            DecodeError::CallbackUrl { .. } => "decode_callback_url",
        }
    }
}

/// # Errors produced by the request signer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SignError {
    /// Key file exists but could not be read.
    #[error("unable to read private key {path}: {reason}")]
    ReadKey {
        /// Key file path.
        path: String,
        /// I/O error message.
        reason: String,
    },

    /// Key material is not a supported RSA private key.
    #[error("unable to parse private key: {0}")]
    ParseKey(String),

    /// Signature computation failed.
    #[error("error signing request: {0}")]
    Sign(String),

    /// A computed header value could not be encoded.
    #[error("invalid header value for {0}")]
    Header(&'static str),
}

impl SignError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SignError::ReadKey { .. } => "sign_read_key",
            SignError::ParseKey(_) => "sign_parse_key",
            SignError::Sign(_) => "sign_failed",
            SignError::Header(_) => "sign_header",
        }
    }
}

/// # Errors produced while posting a callback or a report.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The outbound request could not be built.
    #[error("unable to build request for {url}: {reason}")]
    Build {
        /// Target URL.
        url: String,
        /// Builder message.
        reason: String,
    },

    /// Signing aborted the send.
    #[error(transparent)]
    Sign(#[from] SignError),

    /// The request could not be delivered.
    #[error("error posting to {url}: {reason}")]
    Transport {
        /// Target URL.
        url: String,
        /// Transport message.
        reason: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Build { .. } => "dispatch_build",
            DispatchError::Sign(_) => "dispatch_sign",
            DispatchError::Transport { .. } => "dispatch_transport",
        }
    }
}

/// # Per-message handling failure.
///
/// A handler returning one of these tells the worker pool **not** to
/// acknowledge the delivery; the broker redelivers it according to its own policy.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandleError {
    /// Payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Any other failure that leaves the message unhandled.
    #[error("handler failed: {0}")]
    Fail(String),
}

impl HandleError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandleError::Decode(e) => e.as_label(),
            HandleError::Fail(_) => "handle_failed",
        }
    }
}

/// # Errors produced while reading configuration.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value that must be valid could not be parsed.
    #[error("converting {key} {value:?} error: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_label_is_forwarded_through_handle_error() {
        let err = HandleError::from(DecodeError::EmptyFunction);
        assert_eq!(err.as_label(), "decode_empty_function");
        assert_eq!(err.to_string(), "function name is empty");
    }

    #[test]
    fn sign_error_is_transparent_in_dispatch_error() {
        let err = DispatchError::from(SignError::Sign("boom".into()));
        assert_eq!(err.as_label(), "dispatch_sign");
        assert_eq!(err.to_string(), "error signing request: boom");
    }
}
