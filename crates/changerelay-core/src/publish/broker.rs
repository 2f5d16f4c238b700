//! Publishes change records to the durable queue.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::broker::BrokerConnector;
use crate::change::ChangeRecord;
use crate::error::BrokerError;

/// Queue publisher for change records.
///
/// Every publish opens its own connection, declares the queue durable,
/// sends the record with persistent delivery mode, and closes the
/// connection again.
pub struct BrokerPublisher {
    connector: Arc<dyn BrokerConnector>,
    queue: String,
}

impl BrokerPublisher {
    pub fn new(connector: Arc<dyn BrokerConnector>, queue: impl Into<String>) -> Self {
        BrokerPublisher {
            connector,
            queue: queue.into(),
        }
    }

    /// Publish one change record to the queue.
    ///
    /// Transport failures never propagate: the error chain is logged and
    /// the record is reported as not accepted, so the caller can fall back
    /// to direct webhook delivery.
    pub async fn publish(&self, change: &ChangeRecord) -> bool {
        match self.try_publish(change).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, revision = %change.revision, "failed to publish change to broker");
                false
            }
        }
    }

    async fn try_publish(&self, change: &ChangeRecord) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(change)?;
        let connection = self.connector.connect().await?;
        info!(queue = %self.queue, revision = %change.revision, "publishing change");
        connection.declare_queue(&self.queue).await?;
        connection.publish(&self.queue, &body).await?;
        connection.close().await?;
        debug!("message published, connection closed");
        Ok(())
    }
}
