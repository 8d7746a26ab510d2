//! # QueueHandler: the bridge's delivery handler.
//!
//! ```text
//! Delivery ─► QueueRequest::decode ─┬─ Err ─► HandleError::Decode (not acknowledged)
//!                                   └─ Ok  ─► Invoker::invoke ─► Dispatcher::dispatch ─► Ok
//! ```
//!
//! Every decoded request ends in `Ok`: transport failures and non-2xx statuses are
//! reportable outcomes, and callback/report failures are best-effort.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::auth::BasicAuthCredentials;
use crate::broker::Delivery;
use crate::config::Config;
use crate::core::Handler;
use crate::dispatch::Dispatcher;
use crate::error::HandleError;
use crate::events::Bus;
use crate::invoke::{Invoker, QueueRequest};
use crate::signing::Signer;

/// Decodes, invokes and dispatches one queued function call.
#[derive(Clone)]
pub struct QueueHandler {
    invoker: Invoker,
    dispatcher: Dispatcher,
}

impl QueueHandler {
    /// Creates a handler from its two stages.
    pub fn new(invoker: Invoker, dispatcher: Dispatcher) -> Self {
        Self { invoker, dispatcher }
    }

    /// Wires both stages from `config` over one shared client.
    ///
    /// The async report is disabled when `config.skip_report` is set.
    pub fn from_config(
        config: Arc<Config>,
        client: reqwest::Client,
        signer: Signer,
        credentials: Option<BasicAuthCredentials>,
        bus: Bus,
    ) -> Self {
        let report_url = (!config.skip_report).then(|| config.report_url());
        let dispatcher = Dispatcher::new(client.clone(), signer, report_url, credentials, bus.clone());
        let invoker = Invoker::new(client, config, bus);
        Self::new(invoker, dispatcher)
    }
}

#[async_trait]
impl Handler for QueueHandler {
    fn name(&self) -> &str {
        "queue"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<(), HandleError> {
        let started = Instant::now();
        let req = QueueRequest::decode(&delivery.payload)?;
        let outcome = self.invoker.invoke(&req, delivery.sequence, started).await;
        self.dispatcher.dispatch(&outcome).await;
        Ok(())
    }
}
