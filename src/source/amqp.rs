//! RabbitMQ transport (requires the `amqp` feature).
//!
//! Each channel has its own durable queue. [`AmqpSource`] consumes one queue
//! with manual acknowledgement and a prefetch of one, so a reading is only
//! removed from the broker after the monitor has processed it.
//! [`AmqpPublisher`] is the producer side used to feed a replay into the
//! broker.

use std::fmt;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info};

use super::{Delivery, ReadingSource};
use crate::error::SourceError;

/// Open a connection to the broker at `url`.
pub async fn connect(url: &str) -> Result<Connection, SourceError> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    info!("Connected to {}", url);
    Ok(connection)
}

async fn declare(channel: &Channel, queue: &str) -> Result<(), SourceError> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Consumer tag registered with the broker for `queue`.
pub fn consumer_tag(queue: &str) -> String {
    format!("smokewatch-{}", queue)
}

/// Consumes one queue.
pub struct AmqpSource {
    channel: Channel,
    consumer: Consumer,
    description: String,
}

impl AmqpSource {
    /// Declare `queue` and start consuming it.
    ///
    /// With `purge` set the queue is deleted first, so readings left over
    /// from a previous cook are not replayed into fresh windows.
    pub async fn open(connection: &Connection, queue: &str, purge: bool) -> Result<Self, SourceError> {
        let channel = connection.create_channel().await?;

        if purge {
            let dropped = channel.queue_delete(queue, QueueDeleteOptions::default()).await?;
            debug!("Deleted queue '{}' ({} messages dropped)", queue, dropped);
        }
        declare(&channel, queue).await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let consumer = channel
            .basic_consume(
                queue,
                &consumer_tag(queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Self {
            channel,
            consumer,
            description: format!("amqp: {}", queue),
        })
    }
}

impl fmt::Debug for AmqpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSource")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReadingSource for AmqpSource {
    async fn recv(&mut self) -> Result<Option<Delivery>, SourceError> {
        match self.consumer.next().await {
            Some(Ok(delivery)) => Ok(Some(Delivery {
                tag: delivery.delivery_tag,
                payload: String::from_utf8_lossy(&delivery.data).into_owned(),
            })),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), SourceError> {
        self.channel.basic_ack(tag, BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        self.channel.close(200, "Bye").await?;
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Publishes reading messages to one queue through the default exchange.
pub struct AmqpPublisher {
    channel: Channel,
    queue: String,
}

impl AmqpPublisher {
    /// Declare `queue` and prepare to publish to it.
    pub async fn open(connection: &Connection, queue: &str) -> Result<Self, SourceError> {
        let channel = connection.create_channel().await?;
        declare(&channel, queue).await?;
        Ok(Self {
            channel,
            queue: queue.to_string(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Publish one message and wait for the broker to take it.
    pub async fn publish(&self, message: &str) -> Result<(), SourceError> {
        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                message.as_bytes(),
                BasicProperties::default(),
            )
            .await?
            .await?;
        debug!(" [x] Sent {} to '{}'", message, self.queue);
        Ok(())
    }

    pub async fn close(&self) -> Result<(), SourceError> {
        self.channel.close(200, "Bye").await?;
        Ok(())
    }
}

impl fmt::Debug for AmqpPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpPublisher")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
