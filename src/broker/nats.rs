//! NATS JetStream backend.
//!
//! Binds a push consumer to the configured queue group with explicit acks.
//! The stream uses interest retention, so a message leaves the stream once the
//! consumer acknowledges it. The consumer's ack-pending limit is shared by every
//! replica of the group and comes from `max_ack_pending`; each process bounds its
//! own in-flight work through the delivery queue and worker pool.
//! Ephemeral consumers start at new messages; durable ones resume where the group stopped.
//! Client disconnect events are forwarded to the [`DisconnectNotifier`].

use std::sync::Arc;

use async_nats::jetstream::{
    self,
    consumer::{AckPolicy, Consumer, DeliverPolicy, push},
    stream::{self, RetentionPolicy},
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::{Broker, Connection, Delivery, DisconnectNotifier, Session, SubscriptionSpec};
use crate::error::BrokerError;

const ACK: &[u8] = b"+ACK";

/// JetStream broker.
#[derive(Clone, Debug, Default)]
pub struct NatsBroker;

impl NatsBroker {
    /// Creates the backend.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn connect(
        &self,
        spec: &SubscriptionSpec,
        notifier: DisconnectNotifier,
    ) -> Result<Connection, BrokerError> {
        let client = async_nats::ConnectOptions::new()
            .name(format!("{}/{}", spec.cluster, spec.client_id))
            .event_callback(move |event| {
                let notifier = notifier.clone();
                async move {
                    if let async_nats::Event::Disconnected = event {
                        notifier.notify("disconnected from broker");
                    }
                }
            })
            .connect(spec.url.as_str())
            .await
            .map_err(|e| BrokerError::Connect {
                url: spec.url.clone(),
                reason: e.to_string(),
            })?;

        let subscribe_err = |reason: String| BrokerError::Subscribe {
            subject: spec.subject.clone(),
            url: spec.url.clone(),
            reason,
        };

        let js = jetstream::new(client.clone());
        let stream = js
            .get_or_create_stream(stream_config(spec))
            .await
            .map_err(|e| subscribe_err(e.to_string()))?;

        let config = consumer_config(spec, client.new_inbox());
        let consumer: Consumer<push::Config> = match &spec.durable_name {
            Some(name) => stream
                .get_or_create_consumer(name, config)
                .await
                .map_err(|e| subscribe_err(e.to_string()))?,
            None => stream
                .create_consumer(config)
                .await
                .map_err(|e| subscribe_err(e.to_string()))?,
        };
        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| subscribe_err(e.to_string()))?;

        let (tx, rx) = mpsc::channel(1);
        let pump = tokio::spawn(async move {
            while let Some(next) = messages.next().await {
                let msg = match next {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "broker delivery error");
                        continue;
                    }
                };
                let (sequence, redelivered) = match msg.info() {
                    Ok(info) => (info.stream_sequence, info.delivered > 1),
                    Err(_) => (0, false),
                };
                let delivery = Delivery {
                    subject: msg.subject.as_str().into(),
                    sequence,
                    redelivered,
                    payload: msg.payload.clone(),
                    ack_token: msg.reply.as_ref().map(|r| Arc::from(r.as_str())),
                };
                if tx.send(delivery).await.is_err() {
                    break;
                }
            }
        });

        Ok(Connection {
            session: Arc::new(NatsSession {
                client,
                pump: pump.abort_handle(),
            }),
            deliveries: rx,
        })
    }
}

fn stream_config(spec: &SubscriptionSpec) -> stream::Config {
    stream::Config {
        name: spec.stream.clone(),
        subjects: vec![spec.subject.clone()],
        retention: RetentionPolicy::Interest,
        ..Default::default()
    }
}

fn consumer_config(spec: &SubscriptionSpec, deliver_subject: String) -> push::Config {
    let deliver_policy = match spec.durable_name {
        Some(_) => DeliverPolicy::All,
        None => DeliverPolicy::New,
    };
    push::Config {
        durable_name: spec.durable_name.clone(),
        deliver_subject,
        deliver_group: Some(spec.queue_group.clone()),
        deliver_policy,
        ack_policy: AckPolicy::Explicit,
        ack_wait: spec.ack_wait,
        // 0 lets the server apply its default
        max_ack_pending: spec
            .max_ack_pending
            .map_or(0, |n| i64::try_from(n).unwrap_or(i64::MAX)),
        ..Default::default()
    }
}

struct NatsSession {
    client: async_nats::Client,
    pump: AbortHandle,
}

#[async_trait]
impl Session for NatsSession {
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let Some(reply) = &delivery.ack_token else {
            return Err(BrokerError::Ack {
                reason: format!("delivery {} has no reply subject", delivery.label()),
            });
        };
        self.client
            .publish(reply.to_string(), Bytes::from_static(ACK))
            .await
            .map_err(|e| BrokerError::Ack {
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.pump.abort();
        self.client.flush().await.map_err(|e| BrokerError::Close {
            reason: e.to_string(),
        })
    }
}

impl Drop for NatsSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn spec(durable: bool, max_ack_pending: Option<usize>) -> SubscriptionSpec {
        SubscriptionSpec {
            url: "nats://nats:4222".into(),
            cluster: "faas-cluster".into(),
            client_id: "faas-worker-a".into(),
            stream: "faas-request".into(),
            subject: "faas-request".into(),
            queue_group: "faas".into(),
            durable_name: durable.then(|| "faas-request".into()),
            ack_wait: Duration::from_secs(30),
            max_in_flight: 5,
            max_ack_pending,
        }
    }

    #[test]
    fn ack_pending_is_not_tied_to_local_workers() {
        let cfg = consumer_config(&spec(true, None), "_INBOX.a".into());
        assert_eq!(cfg.max_ack_pending, 0);
        assert_eq!(cfg.deliver_group.as_deref(), Some("faas"));
        assert_eq!(cfg.ack_policy, AckPolicy::Explicit);
        assert_eq!(cfg.ack_wait, Duration::from_secs(30));

        let shared = consumer_config(&spec(true, Some(15)), "_INBOX.a".into());
        assert_eq!(shared.max_ack_pending, 15);
    }

    #[test]
    fn ephemeral_consumers_skip_history() {
        let durable = consumer_config(&spec(true, None), "_INBOX.a".into());
        assert_eq!(durable.durable_name.as_deref(), Some("faas-request"));
        assert_eq!(durable.deliver_policy, DeliverPolicy::All);

        let ephemeral = consumer_config(&spec(false, None), "_INBOX.b".into());
        assert!(ephemeral.durable_name.is_none());
        assert_eq!(ephemeral.deliver_policy, DeliverPolicy::New);
    }

    #[test]
    fn acked_messages_leave_the_stream() {
        let cfg = stream_config(&spec(true, None));
        assert_eq!(cfg.retention, RetentionPolicy::Interest);
        assert_eq!(cfg.subjects, vec!["faas-request".to_string()]);
    }
}
