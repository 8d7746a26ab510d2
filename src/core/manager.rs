//! # ConnectionManager: broker session ownership and bounded reconnect.
//!
//! The manager owns the only live [`Session`] and swaps it under an exclusive lock.
//! Deliveries of every session are forwarded into one bounded delivery queue that
//! outlives individual sessions; the [`WorkerPool`](crate::WorkerPool) drains it.
//!
//! ## Architecture
//! ```text
//!              connect() ──► establish() ──► Broker::connect(spec, notifier(gen))
//!                                 │
//!                                 ├─► link.session = session        (write lock)
//!                                 └─► forwarder: deliveries ──► delivery queue ──► workers
//!
//!   notifier(gen) ──► watcher ──► gen current? ──► Reconnecting ──► reconnect():
//!                                                   for i in 0..max_attempts {
//!                                                     select! { shutdown → abort,
//!                                                               sleep(i × delay) → establish() }
//!                                                   }
//!                                                   budget spent → Disconnected (fail-stop)
//!
//!   ack(delivery)  ── read lock ──► link.session.ack()
//!   close()        ── write lock ─► cancel shutdown, close session, drop queue sender
//! ```
//!
//! ## Rules
//! - Acknowledgments always go through the session current at ack time.
//! - Link-loss signals from superseded sessions are ignored (generation check).
//! - A shutdown signal aborts the reconnect wait immediately.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use super::pool::Acknowledge;
use super::state::ConnectionState;
use crate::broker::{Broker, Delivery, DisconnectNotifier, LinkLost, Session, SubscriptionSpec};
use crate::error::BrokerError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::ReconnectPolicy;

struct Link {
    state: ConnectionState,
    session: Option<Arc<dyn Session>>,
    generation: u64,
    ever_connected: bool,
    forwarder: Option<CancellationToken>,
    queue: Option<mpsc::Sender<Delivery>>,
}

/// Owns the broker connection and supervises reconnects.
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    spec: SubscriptionSpec,
    policy: ReconnectPolicy,
    bus: Bus,
    link: RwLock<Link>,
    shutdown: CancellationToken,
    lost_tx: mpsc::UnboundedSender<LinkLost>,
    lost_rx: Mutex<Option<mpsc::UnboundedReceiver<LinkLost>>>,
}

impl ConnectionManager {
    /// Creates a manager and the receiving end of its delivery queue.
    ///
    /// The queue holds up to `spec.max_in_flight` deliveries and closes after [`close`](Self::close).
    pub fn new(
        broker: Arc<dyn Broker>,
        spec: SubscriptionSpec,
        policy: ReconnectPolicy,
        bus: Bus,
    ) -> (Arc<Self>, mpsc::Receiver<Delivery>) {
        let (queue_tx, queue_rx) = mpsc::channel(spec.max_in_flight.max(1));
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let mgr = Arc::new(Self {
            broker,
            spec,
            policy,
            bus,
            link: RwLock::new(Link {
                state: ConnectionState::Disconnected,
                session: None,
                generation: 0,
                ever_connected: false,
                forwarder: None,
                queue: Some(queue_tx),
            }),
            shutdown: CancellationToken::new(),
            lost_tx,
            lost_rx: Mutex::new(Some(lost_rx)),
        });
        (mgr, queue_rx)
    }

    /// Opens the session and subscription.
    ///
    /// Errors if the broker is unreachable or the subscription is refused.
    pub async fn connect(self: &Arc<Self>) -> Result<(), BrokerError> {
        self.ensure_watcher();
        self.establish().await
    }

    /// Acknowledges `delivery` through the current session.
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let link = self.link.read().await;
        match &link.session {
            Some(session) => session.ack(delivery).await,
            None => Err(BrokerError::NotConnected),
        }
    }

    /// Shuts the connection down for good.
    ///
    /// Aborts any reconnect wait, closes the session and the delivery queue.
    /// Fails with [`BrokerError::NotConnected`] if no connection was ever established.
    pub async fn close(&self) -> Result<(), BrokerError> {
        let mut link = self.link.write().await;
        self.shutdown.cancel();
        if !link.ever_connected {
            return Err(BrokerError::NotConnected);
        }
        if link.state == ConnectionState::Closed {
            return Err(BrokerError::Closed);
        }

        if let Some(fwd) = link.forwarder.take() {
            fwd.cancel();
        }
        let session = link.session.take();
        link.queue = None;
        link.state = ConnectionState::Closed;

        let res = match session {
            Some(session) => session.close().await,
            None => Ok(()),
        };
        drop(link);

        let mut ev = Event::new(EventKind::ConnectionClosed).with_target(self.spec.url.as_str());
        if let Err(e) = &res {
            ev = ev.with_reason(e.to_string());
        }
        self.bus.publish(ev);
        res
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.link.read().await.state
    }

    /// Generation of the current (or last) session; increments on every connect attempt.
    pub async fn generation(&self) -> u64 {
        self.link.read().await.generation
    }

    /// True once shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn ensure_watcher(self: &Arc<Self>) {
        let rx = self.lost_rx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(rx) = rx {
            tokio::spawn(Arc::clone(self).watch(rx));
        }
    }

    async fn establish(&self) -> Result<(), BrokerError> {
        let mut link = self.link.write().await;
        if self.shutdown.is_cancelled() || link.state == ConnectionState::Closed {
            return Err(BrokerError::Closed);
        }

        let Some(queue) = link.queue.clone() else {
            return Err(BrokerError::Closed);
        };

        link.state = ConnectionState::Connecting;
        link.generation += 1;
        let generation = link.generation;
        self.bus
            .publish(Event::new(EventKind::Connecting).with_target(self.spec.url.as_str()));

        let notifier = DisconnectNotifier::new(generation, self.lost_tx.clone());
        let conn = match self.broker.connect(&self.spec, notifier).await {
            Ok(conn) => conn,
            Err(e) => {
                link.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        if let Some(old) = link.forwarder.take() {
            old.cancel();
        }
        let token = self.shutdown.child_token();
        tokio::spawn(forward(conn.deliveries, queue, token.clone()));

        link.session = Some(conn.session);
        link.forwarder = Some(token);
        link.ever_connected = true;
        link.state = ConnectionState::Subscribed;

        let group = match &self.spec.durable_name {
            Some(durable) => format!("{}/{durable}", self.spec.queue_group),
            None => self.spec.queue_group.clone(),
        };
        self.bus.publish(
            Event::new(EventKind::Subscribed)
                .with_target(self.spec.subject.as_str())
                .with_group(group)
                .with_limit(self.spec.max_in_flight),
        );
        Ok(())
    }

    async fn watch(self: Arc<Self>, mut lost: mpsc::UnboundedReceiver<LinkLost>) {
        loop {
            let sig = select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                sig = lost.recv() => match sig {
                    Some(sig) => sig,
                    None => return,
                },
            };

            {
                let mut link = self.link.write().await;
                if sig.generation != link.generation || link.state != ConnectionState::Subscribed {
                    continue;
                }
                link.state = ConnectionState::Reconnecting;
                if let Some(fwd) = link.forwarder.take() {
                    fwd.cancel();
                }
                link.session = None;
            }
            self.bus.publish(
                Event::new(EventKind::Disconnected)
                    .with_target(self.spec.url.as_str())
                    .with_reason(sig.reason),
            );
            self.reconnect().await;
        }
    }

    /// Bounded linear reconnect; see [`ReconnectPolicy`].
    async fn reconnect(&self) {
        for (i, delay) in self.policy.schedule() {
            let attempt = i + 1;
            self.bus.publish(
                Event::new(EventKind::ReconnectScheduled)
                    .with_attempt(attempt)
                    .with_delay(delay),
            );

            select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.bus.publish(Event::new(EventKind::ReconnectAborted).with_attempt(attempt));
                    return;
                }
                _ = time::sleep(delay) => {}
            }

            match self.establish().await {
                Ok(()) => {
                    self.bus
                        .publish(Event::new(EventKind::Reconnected).with_attempt(attempt));
                    return;
                }
                Err(BrokerError::Closed) => {
                    self.bus
                        .publish(Event::new(EventKind::ReconnectAborted).with_attempt(attempt));
                    return;
                }
                Err(e) => {
                    self.bus.publish(
                        Event::new(EventKind::ReconnectFailed)
                            .with_attempt(attempt)
                            .with_reason(e.to_string()),
                    );
                }
            }
        }

        {
            let mut link = self.link.write().await;
            if link.state != ConnectionState::Closed {
                link.state = ConnectionState::Disconnected;
            }
        }
        self.bus.publish(
            Event::new(EventKind::ReconnectExhausted).with_attempt(self.policy.max_attempts),
        );
    }
}

#[async_trait]
impl Acknowledge for ConnectionManager {
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        ConnectionManager::ack(self, delivery).await
    }
}

async fn forward(
    mut from: mpsc::Receiver<Delivery>,
    to: mpsc::Sender<Delivery>,
    token: CancellationToken,
) {
    loop {
        let delivery = select! {
            biased;
            _ = token.cancelled() => return,
            d = from.recv() => match d {
                Some(d) => d,
                None => return,
            },
        };
        select! {
            biased;
            _ = token.cancelled() => return,
            sent = to.send(delivery) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use std::time::Duration;

    fn spec() -> SubscriptionSpec {
        SubscriptionSpec {
            url: "memory://local".into(),
            cluster: "test".into(),
            client_id: "faas-worker-test".into(),
            stream: "faas-request".into(),
            subject: "faas-request".into(),
            queue_group: "faas".into(),
            durable_name: Some("faas-request".into()),
            ack_wait: Duration::from_secs(30),
            max_in_flight: 2,
            max_ack_pending: None,
        }
    }

    fn manager(broker: &MemoryBroker, policy: ReconnectPolicy) -> (Arc<ConnectionManager>, mpsc::Receiver<Delivery>) {
        ConnectionManager::new(Arc::new(broker.clone()), spec(), policy, Bus::new(64))
    }

    #[tokio::test]
    async fn close_without_connection_fails() {
        let broker = MemoryBroker::new();
        let (mgr, _rx) = manager(&broker, ReconnectPolicy::default());
        assert_eq!(mgr.close().await, Err(BrokerError::NotConnected));
    }

    #[tokio::test]
    async fn delivers_acks_and_closes_queue() {
        let broker = MemoryBroker::new();
        let (mgr, mut rx) = manager(&broker, ReconnectPolicy::default());
        mgr.connect().await.unwrap();
        assert_eq!(mgr.state().await, ConnectionState::Subscribed);

        broker.publish("faas-request", "x");
        let d = rx.recv().await.unwrap();
        mgr.ack(&d).await.unwrap();
        assert_eq!(broker.acked(), vec![1]);

        mgr.close().await.unwrap();
        assert_eq!(mgr.state().await, ConnectionState::Closed);
        assert!(mgr.is_shutting_down());
        assert!(rx.recv().await.is_none());
        assert_eq!(mgr.close().await, Err(BrokerError::Closed));
    }

    #[tokio::test]
    async fn subscribed_event_names_group_and_limit() {
        let broker = MemoryBroker::new();
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let (mgr, _rx) = ConnectionManager::new(Arc::new(broker.clone()), spec(), ReconnectPolicy::default(), bus);
        mgr.connect().await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind, EventKind::Connecting);
        let ev = events.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::Subscribed);
        assert_eq!(ev.target.as_deref(), Some("faas-request"));
        assert_eq!(ev.group.as_deref(), Some("faas/faas-request"));
        assert_eq!(ev.limit, Some(2));
        assert_eq!(ev.attempt, None);
        assert_eq!(ev.reason, None);
    }

    #[tokio::test]
    async fn establish_after_close_never_dials() {
        let broker = MemoryBroker::new();
        let (mgr, _rx) = manager(&broker, ReconnectPolicy::default());
        mgr.connect().await.unwrap();
        mgr.close().await.unwrap();

        assert_eq!(mgr.establish().await, Err(BrokerError::Closed));
        assert_eq!(broker.connect_attempts(), 1);
        assert_eq!(mgr.state().await, ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_link_loss_is_ignored() {
        let broker = MemoryBroker::new();
        let (mgr, _rx) = manager(&broker, ReconnectPolicy::default());
        mgr.connect().await.unwrap();

        mgr.lost_tx
            .send(LinkLost {
                generation: 0,
                reason: "old".into(),
            })
            .unwrap();
        time::sleep(Duration::from_millis(10)).await;

        assert_eq!(mgr.state().await, ConnectionState::Subscribed);
        assert_eq!(mgr.generation().await, 1);
        assert_eq!(broker.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_triggers_immediate_reconnect() {
        let broker = MemoryBroker::new();
        let (mgr, _rx) = manager(&broker, ReconnectPolicy::default());
        mgr.connect().await.unwrap();

        broker.disconnect("boom");
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(broker.connect_attempts(), 2);
        assert_eq!(mgr.state().await, ConnectionState::Subscribed);
        assert_eq!(mgr.generation().await, 2);
    }
}
