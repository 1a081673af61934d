use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};

use super::{Acker, BusError, Delivery, MessageBus, MessageStream, Queue, EXCHANGE_NAME};

/// AMQP 0.9.1 implementation of the message bus: one durable direct
/// exchange, seven durable queues, persistent messages, manual acks.
pub struct AmqpBus {
    connection: Connection,
    publish_channel: Channel,
}

impl AmqpBus {
    /// Connect to the broker and declare the exchange and all queues.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let publish_channel = connection.create_channel().await?;

        declare_topology(&publish_channel).await?;

        Ok(Self {
            connection,
            publish_channel,
        })
    }

    pub async fn close(&self) -> Result<(), BusError> {
        self.connection.close(200, "shutdown").await?;
        Ok(())
    }
}

async fn declare_topology(channel: &Channel) -> Result<(), BusError> {
    channel
        .exchange_declare(
            EXCHANGE_NAME,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    for queue in Queue::ALL {
        channel
            .queue_declare(
                queue.name(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                queue.name(),
                EXCHANGE_NAME,
                queue.routing_key(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    Ok(())
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish(&self, queue: Queue, body: &[u8]) -> Result<(), BusError> {
        self.publish_channel
            .basic_publish(
                EXCHANGE_NAME,
                queue.routing_key(),
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persistent
            )
            .await?
            .await?;

        Ok(())
    }

    async fn subscribe(
        &self,
        queue: Queue,
        prefetch: u16,
    ) -> Result<Box<dyn MessageStream>, BusError> {
        // A dedicated channel per consumer so prefetch limits are independent.
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        let consumer = channel
            .basic_consume(
                queue.name(),
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Box::new(AmqpStream {
            consumer,
            _channel: channel,
        }))
    }
}

struct AmqpStream {
    consumer: lapin::Consumer,
    _channel: Channel,
}

#[async_trait]
impl MessageStream for AmqpStream {
    async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.consumer.next().await? {
                Ok(delivery) => {
                    let body = delivery.data.clone();
                    return Some(Delivery::new(body, Box::new(AmqpAcker { delivery })));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "AMQP consumer error, continuing");
                    continue;
                }
            }
        }
    }
}

struct AmqpAcker {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        self.delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), BusError> {
        self.delivery
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}
