use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use queue_worker::{
    BasicAuthCredentials, Bus, Config, ConnectionManager, Event, EventKind, LogWriter, NatsBroker, PoolParams,
    QueueHandler, Signer, Subscribe, SubscriberSet, WorkerPool, build_client, wait_for_signal,
};

const BUS_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env().context("reading configuration")?);
    let hostname = hostname();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway = %config.gateway_address_url(),
        gateway_invoke = config.gateway_invoke,
        max_in_flight = config.max_in_flight,
        "starting queue worker"
    );

    let credentials = if config.basic_auth {
        match BasicAuthCredentials::read_from(&config.secret_mount_path) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::warn!(path = %config.secret_mount_path.display(), error = %e, "basic auth credentials");
                None
            }
        }
    } else {
        None
    };

    let signer = Signer::from_secrets(&config.signing_secret_path, config.signature_scheme, config.write_debug)
        .context("loading signing key")?;
    tracing::info!(enabled = signer.is_enabled(), "callback signing");

    let client = build_client(config.tls_insecure).context("building http client")?;

    let bus = Bus::new(BUS_CAPACITY);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let subscribers = Arc::new(SubscriberSet::new(subs));
    let listener = subscribers.listen(&bus);

    let (manager, queue) = ConnectionManager::new(
        Arc::new(NatsBroker::new()),
        config.subscription(&hostname),
        config.reconnect_policy(),
        bus.clone(),
    );
    manager.connect().await.context("connecting to broker")?;

    let handler = Arc::new(QueueHandler::from_config(
        Arc::clone(&config),
        client,
        signer,
        credentials,
        bus.clone(),
    ));
    let params = PoolParams {
        workers: config.max_in_flight,
        shutdown: manager.shutdown_token(),
        print_body: config.debug_print_body,
    };
    let pool = WorkerPool::spawn(params, queue, handler, manager.clone(), bus.clone());

    let signal = wait_for_signal().await.context("installing signal handlers")?;
    bus.publish(Event::new(EventKind::ShutdownRequested).with_reason(signal));

    if let Err(e) = manager.close().await {
        tracing::warn!(error = %e, "closing broker connection");
    }
    let drained = pool.wait(config.shutdown_grace).await;

    drop(manager);
    drop(bus);
    let _ = tokio::time::timeout(Duration::from_secs(1), listener).await;
    if let Ok(set) = Arc::try_unwrap(subscribers) {
        set.shutdown().await;
    }

    drained?;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}
