//! In-process broker.
//!
//! Keeps messages in memory and honors the same contract as a real backend:
//! an ack-pending limit, redelivery of unacknowledged messages after a
//! disconnect, and link-loss notifications. Fault injection hooks let tests
//! refuse connects and drop the link on demand.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Notify, mpsc};

use super::{Broker, Connection, Delivery, DisconnectNotifier, Session, SubscriptionSpec};
use crate::error::BrokerError;

/// In-memory broker. Clones share the same message store.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    wake: Notify,
}

#[derive(Default)]
struct State {
    next_seq: u64,
    pending: VecDeque<Stored>,
    unacked: BTreeMap<u64, Stored>,
    acked: Vec<u64>,
    connects: u32,
    refuse: u32,
    sessions: u64,
    live: Option<Live>,
}

struct Live {
    id: u64,
    max_ack_pending: usize,
    notifier: DisconnectNotifier,
}

#[derive(Clone)]
struct Stored {
    seq: u64,
    subject: Arc<str>,
    payload: Bytes,
    deliveries: u32,
}

enum Next {
    Deliver(Delivery),
    Wait,
    Stop,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a message and returns its sequence number (starting at 1).
    pub fn publish(&self, subject: &str, payload: impl Into<Bytes>) -> u64 {
        let seq = {
            let mut st = self.lock();
            st.next_seq += 1;
            let seq = st.next_seq;
            st.pending.push_back(Stored {
                seq,
                subject: subject.into(),
                payload: payload.into(),
                deliveries: 0,
            });
            seq
        };
        self.inner.wake.notify_waiters();
        seq
    }

    /// Drops the live session as if the network failed.
    ///
    /// Unacknowledged messages return to the queue and the session's notifier fires.
    pub fn disconnect(&self, reason: &str) {
        let live = {
            let mut st = self.lock();
            let live = st.live.take();
            st.requeue_unacked();
            live
        };
        if let Some(live) = live {
            live.notifier.notify(reason);
        }
        self.inner.wake.notify_waiters();
    }

    /// Makes the next `n` connect attempts fail.
    pub fn refuse_next_connects(&self, n: u32) {
        self.lock().refuse = n;
    }

    /// Sequences acknowledged so far, in ack order.
    pub fn acked(&self) -> Vec<u64> {
        self.lock().acked.clone()
    }

    /// Total connect attempts, including refused ones.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connects
    }

    /// Messages delivered but not yet acknowledged.
    pub fn unacked(&self) -> usize {
        self.lock().unacked.len()
    }

    /// Messages waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// True while a session is open.
    pub fn is_connected(&self) -> bool {
        self.lock().live.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_for(&self, id: u64) -> Next {
        let mut st = self.lock();
        let limit = match &st.live {
            Some(live) if live.id == id => live.max_ack_pending,
            _ => return Next::Stop,
        };
        if st.unacked.len() >= limit {
            return Next::Wait;
        }
        let Some(mut msg) = st.pending.pop_front() else {
            return Next::Wait;
        };
        msg.deliveries += 1;
        let delivery = Delivery {
            subject: Arc::clone(&msg.subject),
            sequence: msg.seq,
            redelivered: msg.deliveries > 1,
            payload: msg.payload.clone(),
            ack_token: None,
        };
        st.unacked.insert(msg.seq, msg);
        Next::Deliver(delivery)
    }

    async fn pump(self, id: u64, tx: mpsc::Sender<Delivery>) {
        loop {
            let notified = self.inner.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.next_for(id) {
                Next::Stop => return,
                Next::Deliver(d) => {
                    if tx.send(d).await.is_err() {
                        return;
                    }
                }
                Next::Wait => notified.await,
            }
        }
    }
}

impl State {
    fn requeue_unacked(&mut self) {
        let unacked = std::mem::take(&mut self.unacked);
        for (_, msg) in unacked.into_iter().rev() {
            self.pending.push_front(msg);
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(
        &self,
        spec: &SubscriptionSpec,
        notifier: DisconnectNotifier,
    ) -> Result<Connection, BrokerError> {
        let id = {
            let mut st = self.lock();
            st.connects += 1;
            if st.refuse > 0 {
                st.refuse -= 1;
                return Err(BrokerError::Connect {
                    url: spec.url.clone(),
                    reason: "connection refused".into(),
                });
            }
            if st.live.is_some() {
                st.requeue_unacked();
            }
            st.sessions += 1;
            let id = st.sessions;
            st.live = Some(Live {
                id,
                max_ack_pending: spec.max_in_flight.max(1),
                notifier,
            });
            id
        };
        self.inner.wake.notify_waiters();

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.clone().pump(id, tx));

        Ok(Connection {
            session: Arc::new(MemorySession {
                broker: self.clone(),
                id,
            }),
            deliveries: rx,
        })
    }
}

struct MemorySession {
    broker: MemoryBroker,
    id: u64,
}

#[async_trait]
impl Session for MemorySession {
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        {
            let mut st = self.broker.lock();
            if !st.live.as_ref().is_some_and(|l| l.id == self.id) {
                return Err(BrokerError::Ack {
                    reason: "session is no longer live".into(),
                });
            }
            let seq = delivery.sequence;
            let known = st.unacked.remove(&seq).is_some() || {
                let before = st.pending.len();
                st.pending.retain(|m| m.seq != seq);
                st.pending.len() != before
            };
            if known {
                st.acked.push(seq);
            }
        }
        self.broker.inner.wake.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        {
            let mut st = self.broker.lock();
            if st.live.as_ref().is_some_and(|l| l.id == self.id) {
                st.live = None;
                st.requeue_unacked();
            }
        }
        self.broker.inner.wake.notify_waiters();
        Ok(())
    }
}
