mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time;

use common::wait_until;
use queue_worker::{
    Bus, ConnectionManager, Delivery, HandleError, HandlerFn, HandlerRef, MemoryBroker, PoolParams,
    ReconnectPolicy, SubscriptionSpec, WorkerPool,
};

fn spec(max_in_flight: usize) -> SubscriptionSpec {
    SubscriptionSpec {
        url: "memory://local".into(),
        cluster: "test".into(),
        client_id: "faas-worker-test".into(),
        stream: "faas-request".into(),
        subject: "faas-request".into(),
        queue_group: "faas".into(),
        durable_name: Some("faas-request".into()),
        ack_wait: Duration::from_secs(30),
        max_in_flight,
        max_ack_pending: None,
    }
}

async fn run(broker: &MemoryBroker, workers: usize, handler: HandlerRef) -> (Arc<ConnectionManager>, WorkerPool) {
    let bus = Bus::new(4096);
    let (mgr, queue) = ConnectionManager::new(
        Arc::new(broker.clone()),
        spec(workers),
        ReconnectPolicy::default(),
        bus.clone(),
    );
    mgr.connect().await.unwrap();
    let params = PoolParams {
        workers,
        shutdown: mgr.shutdown_token(),
        print_body: false,
    };
    let pool = WorkerPool::spawn(params, queue, handler, mgr.clone(), bus);
    (mgr, pool)
}

#[tokio::test(start_paused = true)]
async fn burst_never_exceeds_max_in_flight() {
    const N: usize = 3;
    let broker = MemoryBroker::new();
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
    let handler = HandlerFn::arc("gauge", move |_d: Delivery| {
        let (c, p) = (Arc::clone(&c), Arc::clone(&p));
        async move {
            let now = c.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            time::sleep(Duration::from_millis(20)).await;
            c.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, HandleError>(())
        }
    });
    let (mgr, pool) = run(&broker, N, handler).await;

    for i in 0..10 * N {
        broker.publish("faas-request", format!("msg-{i}"));
    }
    wait_until(|| broker.acked().len() == 10 * N).await;

    assert!(peak.load(Ordering::SeqCst) <= N);
    assert!(peak.load(Ordering::SeqCst) >= 1);
    assert_eq!(pool.len(), N);

    mgr.close().await.unwrap();
    pool.wait(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ack_follows_handler_across_disconnect() {
    let broker = MemoryBroker::new();
    let handled = Arc::new(AtomicUsize::new(0));
    let early_acks = Arc::new(AtomicUsize::new(0));

    let (b, h, e) = (broker.clone(), Arc::clone(&handled), Arc::clone(&early_acks));
    let handler = HandlerFn::arc("flaky-link", move |d: Delivery| {
        let (b, h, e) = (b.clone(), Arc::clone(&h), Arc::clone(&e));
        async move {
            if h.fetch_add(1, Ordering::SeqCst) == 0 {
                b.disconnect("link dropped mid-flight");
            }
            time::sleep(Duration::from_millis(50)).await;
            if !d.redelivered && b.acked().contains(&d.sequence) {
                e.fetch_add(1, Ordering::SeqCst);
            }
            Ok::<_, HandleError>(())
        }
    });
    let (mgr, pool) = run(&broker, 1, handler).await;

    broker.publish("faas-request", "payload");
    wait_until(|| broker.acked() == vec![1]).await;
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(broker.acked(), vec![1]);
    assert!(handled.load(Ordering::SeqCst) >= 1);
    assert_eq!(early_acks.load(Ordering::SeqCst), 0);
    assert_eq!(broker.unacked() + broker.pending(), 0);

    mgr.close().await.unwrap();
    pool.wait(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn handler_error_leaves_message_for_redelivery() {
    let broker = MemoryBroker::new();
    let handler = HandlerFn::arc("reject", |_d: Delivery| async {
        Err::<(), _>(HandleError::Fail("downstream refused".into()))
    });
    let (mgr, pool) = run(&broker, 1, handler).await;

    broker.publish("faas-request", "payload");
    wait_until(|| broker.unacked() == 1).await;
    time::sleep(Duration::from_millis(100)).await;
    assert!(broker.acked().is_empty());

    mgr.close().await.unwrap();
    pool.wait(Duration::from_secs(1)).await.unwrap();
    assert_eq!(broker.pending(), 1);
}
