//! # Worker configuration.
//!
//! Provides [`Config`] centralized settings for the bridge, read once at startup
//! from environment variables.
//!
//! Config is used in three places:
//! 1. **Broker subscription**: [`Config::subscription`] derives the [`SubscriptionSpec`]
//! 2. **Reconnect supervision**: [`Config::reconnect_policy`]
//! 3. **Invocation/reporting**: gateway address, invocation mode and debug flags
//!
//! ## Parsing rules
//! - Booleans are enabled by `1` or `true`; anything else disables them.
//! - Durations use Go syntax: `300ms`, `2s`, `1m30s`, `1.5s`.
//! - Invalid optional values are logged and the default is kept; an invalid
//!   `faas_gateway_port` is fatal ([`ConfigError`]).

use std::path::PathBuf;
use std::time::Duration;

use crate::broker::SubscriptionSpec;
use crate::error::ConfigError;
use crate::policies::ReconnectPolicy;
use crate::signing::SignatureScheme;

/// Default number of reconnect attempts after a lost connection.
pub const DEFAULT_MAX_RECONNECT: u32 = 120;

/// Default base delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Global configuration for the bridge.
///
/// ## Field semantics
/// - `max_in_flight`: worker count and per-process delivery bound (min 1)
/// - `max_ack_pending`: group-wide broker ack-pending limit (`None` = broker default)
/// - `max_reconnect`: reconnect budget after a lost connection (`0` = fail-stop immediately)
/// - `gateway_invoke`: route invocations through the gateway instead of calling functions directly
/// - `skip_report`: do not post the async report to the gateway
#[derive(Clone, Debug)]
pub struct Config {
    /// Broker host name.
    pub nats_address: String,
    /// Broker port.
    pub nats_port: u16,
    /// Cluster name, used to label the client connection.
    pub nats_cluster_name: String,
    /// Whether the subscription keeps its position across restarts.
    pub durable_queue_subscription: bool,
    /// Subject carrying invocation requests.
    pub nats_channel: String,
    /// Queue group shared by all replicas.
    pub nats_queue_group: String,
    /// Stream holding the subject.
    pub nats_stream: String,

    /// Gateway host name.
    pub gateway_address: String,
    /// Gateway port.
    pub gateway_port: u16,
    /// Suffix appended to the function name for direct invocation (e.g. `.openfaas-fn`).
    pub function_suffix: String,
    /// Invoke functions through the gateway rather than directly.
    pub gateway_invoke: bool,
    /// Skip posting the async report to the gateway.
    pub skip_report: bool,

    /// Maximum messages handled concurrently.
    pub max_in_flight: usize,
    /// Ack-pending limit shared by every replica of the queue group.
    pub max_ack_pending: Option<usize>,
    /// Reconnect attempts after a lost connection.
    pub max_reconnect: u32,
    /// Linear reconnect delay step.
    pub reconnect_delay: Duration,
    /// Time the broker waits for an acknowledgment before redelivering.
    pub ack_wait: Duration,
    /// Maximum time to wait for in-flight messages at shutdown.
    pub shutdown_grace: Duration,

    /// Log inbound request bodies.
    pub debug_print_body: bool,
    /// Log function response bodies and signing details.
    pub write_debug: bool,

    /// Send basic-auth credentials with the async report.
    pub basic_auth: bool,
    /// Directory holding `basic-auth-user` / `basic-auth-password`.
    pub secret_mount_path: PathBuf,
    /// Skip TLS verification for callbacks.
    pub tls_insecure: bool,
    /// Directory holding `http-signing-private-key`.
    pub signing_secret_path: PathBuf,
    /// Header that carries the callback signature.
    pub signature_scheme: SignatureScheme,
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - broker `nats:4222`, channel `faas-request`, queue group `faas`
    /// - gateway `gateway:8080`, direct invocation, reporting on
    /// - `max_in_flight = 1`, `ack_wait = 30s`
    /// - `max_reconnect = 120`, `reconnect_delay = 2s`
    fn default() -> Self {
        Self {
            nats_address: "nats".into(),
            nats_port: 4222,
            nats_cluster_name: "faas-cluster".into(),
            durable_queue_subscription: true,
            nats_channel: "faas-request".into(),
            nats_queue_group: "faas".into(),
            nats_stream: "faas-request".into(),
            gateway_address: "gateway".into(),
            gateway_port: 8080,
            function_suffix: String::new(),
            gateway_invoke: false,
            skip_report: false,
            max_in_flight: 1,
            max_ack_pending: None,
            max_reconnect: DEFAULT_MAX_RECONNECT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ack_wait: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
            debug_print_body: false,
            write_debug: false,
            basic_auth: false,
            secret_mount_path: PathBuf::from("/var/openfaas/secrets"),
            tls_insecure: false,
            signing_secret_path: PathBuf::from("/run/secrets"),
            signature_scheme: SignatureScheme::Authorization,
        }
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(v) = lookup("faas_nats_address") {
            cfg.nats_address = v;
        }
        if let Some(v) = lookup("faas_nats_port") {
            match v.parse() {
                Ok(port) => cfg.nats_port = port,
                Err(e) => tracing::warn!(value = %v, error = %e, "converting faas_nats_port to int"),
            }
        }
        if let Some(v) = lookup("faas_nats_cluster_name") {
            cfg.nats_cluster_name = v;
        }
        if let Some(v) = lookup("faas_nats_durable_queue_subscription") {
            cfg.durable_queue_subscription = parse_flag(&v);
        }
        if let Some(v) = lookup("faas_nats_channel").filter(|v| !v.is_empty()) {
            cfg.nats_channel = v;
        }
        if let Some(v) = lookup("faas_nats_queue_group").filter(|v| !v.is_empty()) {
            cfg.nats_queue_group = v;
        }
        cfg.nats_stream = match lookup("faas_nats_stream").filter(|v| !v.is_empty()) {
            Some(v) => v,
            None => cfg.durable_name(),
        };

        if let Some(v) = lookup("faas_gateway_address") {
            cfg.gateway_address = v;
        }
        if let Some(v) = lookup("faas_gateway_port") {
            cfg.gateway_port = v.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "faas_gateway_port",
                    value: v.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(v) = lookup("faas_function_suffix") {
            cfg.function_suffix = v;
        }

        if let Some(v) = lookup("faas_print_body") {
            cfg.debug_print_body = parse_flag(&v);
        }
        if let Some(v) = lookup("write_debug") {
            cfg.write_debug = parse_flag(&v);
        }

        if let Some(v) = lookup("max_inflight") {
            match v.parse::<usize>() {
                Ok(n) => cfg.max_in_flight = n.max(1),
                Err(e) => tracing::warn!(value = %v, error = %e, "max_inflight"),
            }
        }
        if let Some(v) = lookup("faas_max_ack_pending").filter(|v| !v.is_empty()) {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => cfg.max_ack_pending = Some(n),
                Ok(_) => tracing::warn!(value = %v, "faas_max_ack_pending must be positive"),
                Err(e) => tracing::warn!(value = %v, error = %e, "faas_max_ack_pending"),
            }
        }
        if let Some(v) = lookup("faas_max_reconnect") {
            match v.parse() {
                Ok(n) => cfg.max_reconnect = n,
                Err(e) => tracing::warn!(value = %v, error = %e, "converting faas_max_reconnect to int"),
            }
        }
        if let Some(v) = lookup("faas_reconnect_delay") {
            match parse_duration(&v) {
                Some(d) => cfg.reconnect_delay = d,
                None => tracing::warn!(value = %v, "parse env var faas_reconnect_delay as duration"),
            }
        }
        if let Some(v) = lookup("ack_wait") {
            match parse_duration(&v) {
                Some(d) => cfg.ack_wait = d,
                None => tracing::warn!(value = %v, "ack_wait"),
            }
        }
        if let Some(v) = lookup("shutdown_grace") {
            match parse_duration(&v) {
                Some(d) => cfg.shutdown_grace = d,
                None => tracing::warn!(value = %v, "shutdown_grace"),
            }
        }

        if let Some(v) = lookup("gateway_invoke") {
            cfg.gateway_invoke = parse_flag(&v);
        }
        if let Some(v) = lookup("skip_report") {
            cfg.skip_report = parse_flag(&v);
        }
        if let Some(v) = lookup("basic_auth") {
            cfg.basic_auth = parse_flag(&v);
        }
        if let Some(v) = lookup("secret_mount_path").filter(|v| !v.is_empty()) {
            cfg.secret_mount_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("tls_insecure") {
            cfg.tls_insecure = parse_flag(&v);
        }
        if let Some(v) = lookup("http_signing_secret_path").filter(|v| !v.is_empty()) {
            cfg.signing_secret_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("http_signature_header") {
            match v.parse() {
                Ok(scheme) => cfg.signature_scheme = scheme,
                Err(()) => tracing::warn!(value = %v, "http_signature_header"),
            }
        }

        Ok(cfg)
    }

    /// Returns the gateway address as `host:port`.
    #[inline]
    pub fn gateway_address_url(&self) -> String {
        format!("{}:{}", self.gateway_address, self.gateway_port)
    }

    /// Returns the broker URL.
    #[inline]
    pub fn nats_url(&self) -> String {
        format!("nats://{}:{}", self.nats_address, self.nats_port)
    }

    /// Returns the durable subscription name derived from the channel.
    ///
    /// Redelivery after a restart only replays messages not yet acknowledged
    /// under this name.
    #[inline]
    pub fn durable_name(&self) -> String {
        self.nats_channel.replace('.', "_")
    }

    /// Returns the report endpoint on the gateway.
    #[inline]
    pub fn report_url(&self) -> String {
        format!("http://{}/system/async-report", self.gateway_address_url())
    }

    /// Returns the reconnect policy.
    #[inline]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect,
            delay: self.reconnect_delay,
        }
    }

    /// Builds the broker subscription for a worker running on `hostname`.
    pub fn subscription(&self, hostname: &str) -> SubscriptionSpec {
        SubscriptionSpec {
            url: self.nats_url(),
            cluster: self.nats_cluster_name.clone(),
            client_id: client_id(hostname),
            stream: self.nats_stream.clone(),
            subject: self.nats_channel.clone(),
            queue_group: self.nats_queue_group.clone(),
            durable_name: self.durable_queue_subscription.then(|| self.durable_name()),
            ack_wait: self.ack_wait,
            max_in_flight: self.max_in_flight.max(1),
            max_ack_pending: self.max_ack_pending,
        }
    }
}

/// Returns the broker client id for a worker running on `hostname`.
///
/// Every run of characters outside `[a-zA-Z0-9-_]` is replaced by a single `_`.
///
/// # Example
/// ```
/// assert_eq!(queue_worker::client_id("computer-a.acme.com"), "faas-worker-computer-a_acme_com");
/// ```
pub fn client_id(hostname: &str) -> String {
    let mut id = String::from("faas-worker-");
    let mut in_run = false;
    for c in hostname.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            id.push(c);
            in_run = false;
        } else if !in_run {
            id.push('_');
            in_run = true;
        }
    }
    id
}

fn parse_flag(v: &str) -> bool {
    v == "1" || v == "true"
}

/// Parses a Go-style duration string (`1h`, `1m30s`, `250ms`, `1.5s`, `10us`).
///
/// Returns `None` for empty, negative or malformed input. A bare `0` is accepted.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return None;
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    let mut total_ns = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let ns_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_ns += value * ns_per_unit;
    }

    if !total_ns.is_finite() || total_ns > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_ns.round() as u64))
}
