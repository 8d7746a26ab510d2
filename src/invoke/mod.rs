//! Function invocation: request decoding, URL construction, the shared HTTP
//! client and the [`Invoker`] pipeline.

mod client;
mod outcome;
mod pipeline;
mod request;
mod url;

pub use client::{DIAL_TIMEOUT, IDLE_TIMEOUT, build_client};
pub use outcome::{InvocationOutcome, UNAVAILABLE};
pub use pipeline::Invoker;
pub use request::{CALL_ID_HEADER, QueueRequest};
pub use url::{FUNCTION_PORT, function_url};
