//! # SubscriberSet: non-blocking fan-out over multiple subscribers
//!
//! [`SubscriberSet`] distributes each [`Event`] to multiple subscribers
//! **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow.
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event};

use super::Subscribe;

/// Per-subscriber channel with metadata
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        tracing::error!(
                            subscriber = s.name(),
                            seq = ev.seq,
                            info = %panic_message(panic_err.as_ref()),
                            "subscriber panicked"
                        );
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self { channels, workers }
    }

    /// Fan-out one event to all subscribers (non-blocking).
    ///
    /// If a subscriber's queue is **full** or **closed**, the event is dropped for it.
    pub fn emit(&self, event: &Event) {
        let ev = Arc::new(event.clone());
        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&ev)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            tracing::warn!(
                subscriber = channel.name,
                reason,
                dropped_seq = event.seq,
                "subscriber dropped event"
            );
        }
    }

    /// Subscribes to `bus` and forwards every event to this set until the bus closes.
    ///
    /// Lagged receivers skip the missed events and keep going.
    pub fn listen(self: &Arc<Self>, bus: &Bus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let set = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Graceful shutdown: close all queues and await worker completion.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _ev: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Panicker;

    #[async_trait]
    impl Subscribe for Panicker {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "panicker"
        }
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_affect_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(vec![
            Arc::new(Panicker) as Arc<dyn Subscribe>,
            Arc::new(Counter(hits.clone())),
        ]);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::Connecting));
        set.emit(&Event::new(EventKind::Subscribed));
        set.shutdown().await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    struct Narrow(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Narrow {
        async fn on_event(&self, _ev: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "narrow"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let hits = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(vec![Arc::new(Narrow(hits.clone())) as Arc<dyn Subscribe>]);

        for _ in 0..5 {
            set.emit(&Event::new(EventKind::Acked));
        }
        set.shutdown().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_payload_text() {
        let s: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(s.as_ref()), "boom");
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("bad state"));
        assert_eq!(panic_message(owned.as_ref()), "bad state");
        let other: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "unknown");
    }

    #[tokio::test]
    async fn listener_forwards_bus_events() {
        let hits = Arc::new(AtomicUsize::new(0));
        let set = Arc::new(SubscriberSet::new(vec![
            Arc::new(Counter(hits.clone())) as Arc<dyn Subscribe>,
        ]));
        let bus = Bus::new(16);
        let listener = set.listen(&bus);

        bus.publish(Event::new(EventKind::ShutdownRequested));
        drop(bus);
        listener.await.unwrap();

        let set = Arc::try_unwrap(set).ok().expect("listener released the set");
        set.shutdown().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
