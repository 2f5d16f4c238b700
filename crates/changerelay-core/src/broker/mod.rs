//! Message broker capability traits.
//!
//! The delivery pipeline only depends on these traits; the production
//! implementation in [`amqp`] speaks AMQP 0.9.1, and `fakes::MemoryBroker`
//! provides the in-memory double the tests run against.

pub mod amqp;

pub use amqp::AmqpConnector;

use async_trait::async_trait;

use crate::error::BrokerError;

/// One message handed to a consumer, acknowledged by tag.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
}

/// Opens broker connections.
///
/// Each publish or consume operation acquires its own connection; a
/// connection is never shared across tasks.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// One open broker connection with its channel.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Declare the queue as durable, creating it if needed.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publish a message with persistent delivery mode.
    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError>;

    /// Register this connection as a consumer of the queue.
    async fn start_consumer(&self, queue: &str) -> Result<(), BrokerError>;

    /// Wait for the next delivery. Returns [`BrokerError::Disconnected`]
    /// when the broker drops the stream.
    async fn next_delivery(&self) -> Result<Delivery, BrokerError>;

    /// Acknowledge a delivery, removing it from the queue.
    async fn ack(&self, tag: u64) -> Result<(), BrokerError>;

    /// Negative-acknowledge a delivery, requeueing it for redelivery.
    async fn nack_requeue(&self, tag: u64) -> Result<(), BrokerError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}
