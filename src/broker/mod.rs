//! # Broker backends.
//!
//! A [`Broker`] opens one subscription per call to [`Broker::connect`] and hands back a
//! [`Connection`]: a [`Session`] used for acknowledgments and shutdown, plus a
//! channel of [`Delivery`] values in broker order.
//!
//! ```text
//!   Broker::connect(spec, notifier)
//!        │
//!        ├──► Session ──── ack(&Delivery) / close()
//!        └──► mpsc::Receiver<Delivery> ──► ConnectionManager ──► delivery queue
//!
//!   link lost ──► DisconnectNotifier::notify ──► ConnectionManager watcher
//! ```
//!
//! Backends:
//! - [`MemoryBroker`] in-process broker with fault injection (tests, local runs)
//! - `NatsBroker` JetStream push consumer (feature `nats`)

mod memory;
#[cfg(feature = "nats")]
mod nats;

pub use memory::MemoryBroker;
#[cfg(feature = "nats")]
pub use nats::NatsBroker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::BrokerError;

/// Parameters of one subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionSpec {
    /// Broker URL (`nats://host:port`).
    pub url: String,
    /// Cluster label.
    pub cluster: String,
    /// Client id announced to the broker.
    pub client_id: String,
    /// Stream holding `subject`.
    pub stream: String,
    /// Subject carrying invocation requests.
    pub subject: String,
    /// Queue group shared by all replicas.
    pub queue_group: String,
    /// Durable consumer name; `None` for an ephemeral subscription.
    pub durable_name: Option<String>,
    /// Time the broker waits for an ack before redelivering.
    pub ack_wait: Duration,
    /// Maximum unacknowledged deliveries outstanding for this subscriber.
    pub max_in_flight: usize,
    /// Ack-pending limit of the consumer shared by the whole queue group;
    /// `None` keeps the broker default.
    pub max_ack_pending: Option<usize>,
}

/// One message handed out by the broker.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Subject the message was published on.
    pub subject: Arc<str>,
    /// Broker sequence number.
    pub sequence: u64,
    /// True when the broker already delivered this message before.
    pub redelivered: bool,
    /// Raw payload.
    pub payload: Bytes,
    /// Backend specific acknowledgment token (reply subject for NATS).
    pub ack_token: Option<Arc<str>>,
}

impl Delivery {
    /// Short label used in logs and shutdown reports.
    pub fn label(&self) -> String {
        format!("{}#{}", self.subject, self.sequence)
    }
}

/// Link-loss signal sent by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkLost {
    /// Generation of the connection that was lost.
    pub generation: u64,
    /// Backend message.
    pub reason: String,
}

/// Handle a backend uses to report that its connection dropped.
///
/// Each notifier is bound to the connection generation it was created for, so
/// signals from superseded sessions can be told apart.
#[derive(Clone, Debug)]
pub struct DisconnectNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<LinkLost>,
}

impl DisconnectNotifier {
    /// Creates a notifier for connection `generation`.
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<LinkLost>) -> Self {
        Self { generation, tx }
    }

    /// Generation this notifier belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Reports the link as lost. Never blocks.
    pub fn notify(&self, reason: impl Into<String>) {
        let _ = self.tx.send(LinkLost {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}

/// Live subscription returned by [`Broker::connect`].
pub struct Connection {
    /// Acknowledgment and shutdown handle.
    pub session: Arc<dyn Session>,
    /// Deliveries in broker order; closes when the session ends.
    pub deliveries: mpsc::Receiver<Delivery>,
}

/// Broker-side handle of an open subscription.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Acknowledges `delivery` so the broker does not redeliver it.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Closes the subscription and the underlying connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Factory of broker subscriptions.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Connects and subscribes according to `spec`.
    ///
    /// Link loss after this returns must be reported through `notifier`.
    async fn connect(
        &self,
        spec: &SubscriptionSpec,
        notifier: DisconnectNotifier,
    ) -> Result<Connection, BrokerError>;
}
