//! AMQP implementation of the broker traits, backed by lapin.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tokio::sync::Mutex;
use tracing::debug;

use crate::broker::{BrokerConnection, BrokerConnector, Delivery};
use crate::error::BrokerError;

const CONSUMER_TAG: &str = "changerelay";

/// Connects to an AMQP broker with plain credentials.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl AmqpConnector {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        AmqpConnector {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.username, self.password, self.host, self.port
        )
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        debug!(host = %self.host, port = self.port, user = %self.username, "connecting to broker");
        let connection = Connection::connect(&self.uri(), ConnectionProperties::default())
            .await
            .map_err(|err| BrokerError::Connect(err.to_string()))?;
        let channel = connection.create_channel().await?;
        Ok(Box::new(AmqpConnection {
            connection,
            channel,
            consumer: Mutex::new(None),
        }))
    }
}

/// One open AMQP connection with a single channel.
pub struct AmqpConnection {
    connection: Connection,
    channel: Channel,
    consumer: Mutex<Option<Consumer>>,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), BrokerError> {
        // Delivery mode 2 marks the message persistent.
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn start_consumer(&self, queue: &str) -> Result<(), BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        *self.consumer.lock().await = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Delivery, BrokerError> {
        let mut guard = self.consumer.lock().await;
        let consumer = guard.as_mut().ok_or(BrokerError::Disconnected)?;
        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Delivery {
                tag: delivery.delivery_tag,
                body: delivery.data,
            }),
            Some(Err(err)) => Err(err.into()),
            None => Err(BrokerError::Disconnected),
        }
    }

    async fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        self.channel.basic_ack(tag, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack_requeue(&self, tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                tag,
                BasicNackOptions {
                    requeue: true,
                    ..BasicNackOptions::default()
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(0, "").await?;
        Ok(())
    }
}
