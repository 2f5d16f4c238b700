//! Queue consumption with reconnect backoff.
//!
//! The consume loop is an explicit state machine so shutdown is
//! deterministic: the cancellation token is checked at every transition
//! and during the backoff sleep, instead of relying on process exit.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::broker::{BrokerConnection, BrokerConnector};
use crate::error::BrokerError;

/// Longest reconnect backoff in seconds.
const MAX_BACKOFF_SECS: u64 = 30;

/// Connection lifecycle states of the consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Consuming,
    Terminated,
}

/// Decides the fate of one delivery: `true` acknowledges the message,
/// `false` negative-acknowledges it with requeue.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> bool;
}

/// Consumes a queue and feeds each delivery to a handler.
///
/// Runs until cancelled, or until the first disconnect when
/// `retry_on_disconnect` is off (single-shot test and administrative runs).
pub struct BrokerConsumer {
    connector: Arc<dyn BrokerConnector>,
    retry_on_disconnect: bool,
}

impl BrokerConsumer {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        BrokerConsumer {
            connector,
            retry_on_disconnect: true,
        }
    }

    pub fn with_retry_on_disconnect(mut self, retry: bool) -> Self {
        self.retry_on_disconnect = retry;
        self
    }

    /// Run the consume loop until it terminates.
    pub async fn consume(
        &self,
        queue: &str,
        handler: &dyn DeliveryHandler,
        shutdown: &CancellationToken,
    ) {
        let mut retries: u32 = 0;
        let mut connection: Option<Box<dyn BrokerConnection>> = None;
        let mut state = ConsumerState::Disconnected;

        while state != ConsumerState::Terminated {
            debug!(?state, "consumer state");
            state = match state {
                ConsumerState::Disconnected => {
                    if shutdown.is_cancelled() {
                        ConsumerState::Terminated
                    } else {
                        ConsumerState::Connecting
                    }
                }
                ConsumerState::Connecting => match self.open(queue).await {
                    Ok(conn) => {
                        connection = Some(conn);
                        retries = 0;
                        ConsumerState::Consuming
                    }
                    Err(err) => self.after_disconnect(err, &mut retries, shutdown).await,
                },
                ConsumerState::Consuming => match connection.take() {
                    Some(conn) => match self.drain(conn.as_ref(), handler, shutdown).await {
                        Ok(()) => ConsumerState::Terminated,
                        Err(err) => self.after_disconnect(err, &mut retries, shutdown).await,
                    },
                    None => ConsumerState::Connecting,
                },
                ConsumerState::Terminated => ConsumerState::Terminated,
            };
        }
    }

    async fn open(&self, queue: &str) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let connection = self.connector.connect().await?;
        connection.start_consumer(queue).await?;
        Ok(connection)
    }

    /// Deliver messages until the broker drops the stream or shutdown is
    /// requested. `Ok` means a clean cancellation.
    async fn drain(
        &self,
        connection: &dyn BrokerConnection,
        handler: &dyn DeliveryHandler,
        shutdown: &CancellationToken,
    ) -> Result<(), BrokerError> {
        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = connection.close().await;
                    return Ok(());
                }
                next = connection.next_delivery() => next?,
            };
            debug!(tag = delivery.tag, "received message");
            if handler.handle(&delivery.body).await {
                connection.ack(delivery.tag).await?;
            } else {
                connection.nack_requeue(delivery.tag).await?;
            }
        }
    }

    async fn after_disconnect(
        &self,
        err: BrokerError,
        retries: &mut u32,
        shutdown: &CancellationToken,
    ) -> ConsumerState {
        if !self.retry_on_disconnect {
            error!(error = %err, "connection closed by broker, exiting");
            return ConsumerState::Terminated;
        }
        *retries += 1;
        let wait = backoff_secs(*retries);
        warn!(error = %err, wait_secs = wait, "connection closed by broker, reconnecting");
        tokio::select! {
            _ = shutdown.cancelled() => ConsumerState::Terminated,
            _ = tokio::time::sleep(Duration::from_secs(wait)) => ConsumerState::Disconnected,
        }
    }
}

/// Capped exponential backoff: `min(2^retries, 30)` seconds.
fn backoff_secs(retries: u32) -> u64 {
    (1u64 << retries.min(6)).min(MAX_BACKOFF_SECS)
}
