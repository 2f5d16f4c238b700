//! Receive-side wiring: consume the queue, forward to Buildbot.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::consume::{BrokerConsumer, DeliveryHandler};
use crate::publish::BuildbotPublisher;

/// Consumes change records from the queue and forwards each to the
/// Buildbot change hook, acknowledging only after successful delivery.
pub struct Server {
    consumer: BrokerConsumer,
    queue: String,
    handler: ForwardHandler,
}

impl Server {
    pub fn new(consumer: BrokerConsumer, queue: impl Into<String>, buildbot: BuildbotPublisher) -> Self {
        Server {
            consumer,
            queue: queue.into(),
            handler: ForwardHandler { buildbot },
        }
    }

    /// Run the consume loop until it terminates or `shutdown` fires.
    pub async fn run(&self, shutdown: &CancellationToken) {
        self.consumer
            .consume(&self.queue, &self.handler, shutdown)
            .await;
    }
}

/// Forwards one queue delivery to Buildbot.
///
/// Failure leaves the message on the queue via nack-requeue, preserving
/// at-least-once semantics; Buildbot tolerates the resulting duplicates.
pub struct ForwardHandler {
    buildbot: BuildbotPublisher,
}

impl ForwardHandler {
    pub fn new(buildbot: BuildbotPublisher) -> Self {
        ForwardHandler { buildbot }
    }
}

#[async_trait]
impl DeliveryHandler for ForwardHandler {
    async fn handle(&self, body: &[u8]) -> bool {
        let change: Value = match serde_json::from_slice(body) {
            Ok(change) => change,
            Err(err) => {
                error!(error = %err, "received malformed change message");
                return false;
            }
        };
        info!(revision = change.get("revision").and_then(serde_json::Value::as_str), "received change");
        if self.buildbot.is_available().await && self.buildbot.publish(&change).await {
            debug!("sent to buildbot");
            true
        } else {
            error!("failed to send to buildbot");
            false
        }
    }
}
