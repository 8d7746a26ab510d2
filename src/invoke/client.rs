use std::time::Duration;

/// Dial timeout for every outbound request.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connections are dropped almost immediately.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(120);

/// Builds the HTTP client shared by all workers.
///
/// Connections are not pooled or kept alive, so consecutive calls spread across
/// function replicas instead of pinning one. `tls_insecure` disables certificate
/// verification for callbacks to internal services.
pub fn build_client(tls_insecure: bool) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(DIAL_TIMEOUT)
        .pool_idle_timeout(IDLE_TIMEOUT)
        .pool_max_idle_per_host(0)
        .tcp_keepalive(None)
        .danger_accept_invalid_certs(tls_insecure)
        .build()
}
