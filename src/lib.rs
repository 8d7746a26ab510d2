//! # queue-worker
//!
//! **queue-worker** is the asynchronous invocation bridge of a function-as-a-service
//! platform. It consumes queued function calls from a durable broker, invokes each
//! function over HTTP and reports the outcome to an optional callback URL and to the
//! gateway.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                    ┌───────────────────────────────────────────┐
//!   broker ────────► │ ConnectionManager                         │
//!   (JetStream /     │ - owns Session under RwLock               │
//!    MemoryBroker)   │ - forwards deliveries into bounded queue  │
//!                    │ - bounded linear reconnect                │
//!                    └──────────────────┬────────────────────────┘
//!                                       ▼ delivery queue (cap = max_in_flight)
//!              ┌────────────────────────┼────────────────────────┐
//!              ▼                        ▼                        ▼
//!        ┌──────────┐             ┌──────────┐             ┌──────────┐
//!        │ worker 0 │             │ worker 1 │     ...     │ worker N │
//!        └────┬─────┘             └────┬─────┘             └────┬─────┘
//!             └────────────────────────┼────────────────────────┘
//!                                      ▼
//!                   QueueHandler: decode ─► Invoker ─► Dispatcher
//!                                      │        │           ├─► callback POST (signed)
//!                                      │        │           └─► async report POST
//!                                      │        └─► POST function
//!                                      ▼
//!                      ack through ConnectionManager (read lock)
//!
//!   every component ──publish(Event)──► Bus ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Message lifecycle
//! ```text
//! Delivery ──► MessageReceived
//!   ├─ decode error          ──► DecodeFailed           (no ack)
//!   └─ decoded ──► Invoking ──► Invoked | InvokeFailed (status 503)
//!                  ├─► CallbackPosted | CallbackFailed   (when a callback URL is set)
//!                  ├─► ReportPosted   | ReportFailed     (unless reporting is skipped)
//!                  └─► Acked | AckFailed | AckSkipped    (skipped once shutdown began)
//! ```
//!
//! ### Shutdown
//! ```text
//! signal ─► ShutdownRequested ─► ConnectionManager::close()
//!             ├─ cancel shutdown token (aborts reconnect wait, suppresses acks)
//!             ├─ close broker session
//!             └─ close delivery queue ─► WorkerPool::wait(grace) ─► AllStoppedWithin | GraceExceeded
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use queue_worker::{
//!     Bus, ConnectionManager, Delivery, HandleError, HandlerFn, HandlerRef, MemoryBroker,
//!     PoolParams, ReconnectPolicy, SubscriptionSpec, WorkerPool,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = MemoryBroker::new();
//!     let spec = SubscriptionSpec {
//!         url: "memory://local".into(),
//!         cluster: "local".into(),
//!         client_id: queue_worker::client_id("localhost"),
//!         stream: "faas-request".into(),
//!         subject: "faas-request".into(),
//!         queue_group: "faas".into(),
//!         durable_name: Some("faas-request".into()),
//!         ack_wait: Duration::from_secs(30),
//!         max_in_flight: 2,
//!         max_ack_pending: None,
//!     };
//!
//!     let bus = Bus::new(256);
//!     let (manager, queue) =
//!         ConnectionManager::new(Arc::new(broker.clone()), spec, ReconnectPolicy::default(), bus.clone());
//!     manager.connect().await?;
//!
//!     let handler: HandlerRef = HandlerFn::arc("print", |d: Delivery| async move {
//!         println!("got {}", d.label());
//!         Ok::<_, HandleError>(())
//!     });
//!     let params = PoolParams { workers: 2, shutdown: manager.shutdown_token(), print_body: false };
//!     let pool = WorkerPool::spawn(params, queue, handler, manager.clone(), bus);
//!
//!     broker.publish("faas-request", "hello");
//!     while broker.acked().is_empty() {
//!         tokio::time::sleep(Duration::from_millis(5)).await;
//!     }
//!
//!     manager.close().await?;
//!     pool.wait(Duration::from_secs(1)).await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod bridge;
mod broker;
mod config;
mod core;
mod dispatch;
mod error;
mod events;
mod invoke;
mod policies;
mod signing;
mod subscribers;

// ---- Public re-exports ----

pub use auth::{BasicAuthCredentials, PASSWORD_FILE, USER_FILE};
pub use bridge::QueueHandler;
pub use broker::{
    Broker, Connection, Delivery, DisconnectNotifier, LinkLost, MemoryBroker, Session, SubscriptionSpec,
};
pub use config::{Config, DEFAULT_MAX_RECONNECT, DEFAULT_RECONNECT_DELAY, client_id, parse_duration};
pub use core::{
    Acknowledge, ConnectionManager, ConnectionState, Handler, HandlerFn, HandlerRef, PoolParams, WorkerPool,
    wait_for_signal,
};
pub use dispatch::{AsyncReport, Dispatcher, callback_headers};
pub use error::{BrokerError, ConfigError, DecodeError, DispatchError, HandleError, RuntimeError, SignError};
pub use events::{Bus, Event, EventKind};
pub use invoke::{
    CALL_ID_HEADER, DIAL_TIMEOUT, FUNCTION_PORT, IDLE_TIMEOUT, InvocationOutcome, Invoker, QueueRequest,
    UNAVAILABLE, build_client, function_url,
};
pub use policies::ReconnectPolicy;
pub use signing::{KEY_FILE, KEY_ID, RsaSigner, SIGNED_HEADERS, SignatureScheme, Signer};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};

// JetStream backend.
// Enable with: `--features nats` (default)
#[cfg(feature = "nats")]
pub use broker::NatsBroker;
