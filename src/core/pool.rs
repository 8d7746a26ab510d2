//! # WorkerPool: bounded concurrent handling with ack-after-handle.
//!
//! Exactly `workers` long-lived tasks share one delivery queue. Each worker takes a
//! delivery, runs the [`Handler`](super::Handler) to completion and only then
//! acknowledges it.
//!
//! ```text
//! delivery queue ──► worker 0 ─┐
//!                ──► worker 1 ─┼─► handler.handle(&d) ─┬─ Ok  ─► shutting down? ─┬─ no  ─► ack
//!                ──► worker N ─┘                       │                        └─ yes ─► skip
//!                                                      └─ Err ─► no ack (broker redelivers)
//! ```
//!
//! ## Rules
//! - At most `workers` deliveries are handled concurrently.
//! - A delivery is never acknowledged before its handler returns.
//! - No acknowledgment once shutdown has begun.
//! - Panicking handlers are caught; the delivery stays unacknowledged.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::handler::HandlerRef;
use crate::broker::Delivery;
use crate::error::{BrokerError, HandleError, RuntimeError};
use crate::events::{Bus, Event, EventKind};

/// Acknowledgment sink used by workers.
#[async_trait]
pub trait Acknowledge: Send + Sync + 'static {
    /// Acknowledges `delivery`.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}

/// Worker pool parameters.
#[derive(Clone, Debug)]
pub struct PoolParams {
    /// Number of workers (min 1).
    pub workers: usize,
    /// Cancelled when shutdown begins; suppresses acknowledgments.
    pub shutdown: CancellationToken,
    /// Include message bodies in `MessageReceived` events.
    pub print_body: bool,
}

#[derive(Default)]
struct InFlight {
    by_worker: Mutex<BTreeMap<u32, String>>,
}

impl InFlight {
    fn begin(&self, worker: u32, label: String) {
        self.by_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker, label);
    }

    fn end(&self, worker: u32) {
        self.by_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&worker);
    }

    fn snapshot(&self) -> Vec<String> {
        self.by_worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

/// Fixed set of workers draining the delivery queue.
pub struct WorkerPool {
    set: JoinSet<()>,
    in_flight: Arc<InFlight>,
    bus: Bus,
}

struct Worker {
    id: u32,
    queue: Arc<AsyncMutex<mpsc::Receiver<Delivery>>>,
    handler: HandlerRef,
    acker: Arc<dyn Acknowledge>,
    in_flight: Arc<InFlight>,
    shutdown: CancellationToken,
    print_body: bool,
    bus: Bus,
}

impl WorkerPool {
    /// Spawns the workers. Must be called inside a Tokio runtime.
    pub fn spawn(
        params: PoolParams,
        queue: mpsc::Receiver<Delivery>,
        handler: HandlerRef,
        acker: Arc<dyn Acknowledge>,
        bus: Bus,
    ) -> Self {
        let queue = Arc::new(AsyncMutex::new(queue));
        let in_flight = Arc::new(InFlight::default());
        let mut set = JoinSet::new();

        for id in 0..params.workers.max(1) {
            let worker = Worker {
                id: u32::try_from(id).unwrap_or(u32::MAX),
                queue: Arc::clone(&queue),
                handler: Arc::clone(&handler),
                acker: Arc::clone(&acker),
                in_flight: Arc::clone(&in_flight),
                shutdown: params.shutdown.clone(),
                print_body: params.print_body,
                bus: bus.clone(),
            };
            set.spawn(worker.run());
        }

        Self { set, in_flight, bus }
    }

    /// Number of live workers.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// True if every worker has exited.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Labels of deliveries currently being handled.
    pub fn in_flight(&self) -> Vec<String> {
        self.in_flight.snapshot()
    }

    /// Waits for the workers to drain after the delivery queue closed.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] with the stuck deliveries if `grace`
    /// runs out; remaining workers are aborted.
    pub async fn wait(mut self, grace: Duration) -> Result<(), RuntimeError> {
        let done = async { while self.set.join_next().await.is_some() {} };
        match time::timeout(grace, done).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.in_flight.snapshot();
                self.bus
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")));
                self.set.abort_all();
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

impl Worker {
    async fn run(self) {
        loop {
            let next = {
                let mut rx = self.queue.lock().await;
                rx.recv().await
            };
            let Some(delivery) = next else {
                return;
            };

            self.in_flight.begin(self.id, delivery.label());
            self.handle(&delivery).await;
            self.in_flight.end(self.id);
        }
    }

    async fn handle(&self, d: &Delivery) {
        let body = if self.print_body {
            String::from_utf8_lossy(&d.payload).into_owned()
        } else {
            format!("<redacted {} bytes>", d.payload.len())
        };
        let mut received = Event::new(EventKind::MessageReceived)
            .with_msg_seq(d.sequence)
            .with_target(Arc::clone(&d.subject))
            .with_worker(self.id)
            .with_bytes(d.payload.len())
            .with_reason(body);
        if d.redelivered {
            received = received.with_attempt(2);
        }
        self.bus.publish(received);

        let res = std::panic::AssertUnwindSafe(self.handler.handle(d))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(HandleError::Fail(format!("{} panicked", self.handler.name()))));

        match res {
            Ok(()) if self.shutdown.is_cancelled() => {
                self.bus
                    .publish(Event::new(EventKind::AckSkipped).with_msg_seq(d.sequence));
            }
            Ok(()) => {
                let ev = match self.acker.ack(d).await {
                    Ok(()) => Event::new(EventKind::Acked),
                    Err(e) => Event::new(EventKind::AckFailed).with_reason(e.to_string()),
                };
                self.bus
                    .publish(ev.with_msg_seq(d.sequence).with_worker(self.id));
            }
            Err(HandleError::Decode(e)) => {
                self.bus.publish(
                    Event::new(EventKind::DecodeFailed)
                        .with_msg_seq(d.sequence)
                        .with_worker(self.id)
                        .with_reason(e.to_string()),
                );
            }
            Err(e) => {
                self.bus.publish(
                    Event::new(EventKind::HandleFailed)
                        .with_msg_seq(d.sequence)
                        .with_worker(self.id)
                        .with_reason(e.to_string()),
                );
            }
        }
    }
}
