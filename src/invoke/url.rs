use crate::config::Config;

use super::QueueRequest;

/// Port functions listen on when invoked directly.
pub const FUNCTION_PORT: u16 = 8080;

/// Builds the invocation URL for `req`.
///
/// - gateway mode: `http://<gateway>:<port>/function/<name><path><?query>`
/// - direct mode: `http://<name><suffix>:8080<path><?query>`
///
/// An empty path becomes `/`; a leading `?` on the query string is not duplicated.
///
/// # Example
/// ```
/// use queue_worker::{Config, QueueRequest, function_url};
///
/// let cfg = Config { gateway_invoke: true, ..Config::default() };
/// let req = QueueRequest { function: "echo".into(), ..QueueRequest::default() };
/// assert_eq!(function_url(&req, &cfg), "http://gateway:8080/function/echo/");
/// ```
pub fn function_url(req: &QueueRequest, cfg: &Config) -> String {
    let query = req.query_string.trim_start_matches('?');
    let qs = if req.query_string.is_empty() {
        String::new()
    } else {
        format!("?{query}")
    };
    let path = if req.path.is_empty() { "/" } else { req.path.as_str() };

    if cfg.gateway_invoke {
        format!(
            "http://{}/function/{}{path}{qs}",
            cfg.gateway_address_url(),
            req.function.trim_matches('/'),
        )
    } else {
        format!(
            "http://{}{}:{FUNCTION_PORT}{path}{qs}",
            req.function, cfg.function_suffix,
        )
    }
}
