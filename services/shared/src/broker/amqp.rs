//! RabbitMQ adapter built on `lapin`

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    uri::AMQPUri,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::{
    Acknowledger, AutoAcked, BrokerChannel, BrokerError, Connector, Delivery, DeliveryStream,
    OutboundMessage,
};
use crate::config::BrokerConfig;
use crate::constants::DELIVERY_BUFFER_SIZE;

/// Opens AMQP connections from a `BrokerConfig`
pub struct AmqpConnector {
    uri: AMQPUri,
    endpoint: String,
}

impl AmqpConnector {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            uri: config.amqp_uri(),
            endpoint: config.redacted_uri(),
        }
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let connection =
            Connection::connect_uri(self.uri.clone(), ConnectionProperties::default())
                .await
                .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(Arc::new(AmqpChannel {
            _connection: connection,
            channel,
            publish_lock: Mutex::new(()),
        }))
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// One connection with a single channel
///
/// The consumer task and concurrent callers publish through the same
/// channel, so publishes are serialized by `publish_lock`.
pub struct AmqpChannel {
    _connection: Connection,
    channel: Channel,
    publish_lock: Mutex<()>,
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }

    async fn reject(&self) -> Result<(), BrokerError> {
        self.0
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Acknowledge(e.to_string()))
    }
}

fn into_delivery(delivery: lapin::message::Delivery, auto_ack: bool) -> Delivery {
    let correlation_id = delivery
        .properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string());
    let reply_to = delivery
        .properties
        .reply_to()
        .as_ref()
        .map(|queue| queue.as_str().to_string());

    let acker: Arc<dyn Acknowledger> = if auto_ack {
        Arc::new(AutoAcked)
    } else {
        Arc::new(AmqpAcker(delivery.acker.clone()))
    };

    Delivery::new(
        delivery.delivery_tag,
        correlation_id,
        reply_to,
        delivery.data,
        acker,
    )
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_declare(name, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| BrokerError::Declare {
                queue: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare {
                queue: "<server-named>".to_string(),
                reason: e.to_string(),
            })?;

        Ok(queue.name().as_str().to_string())
    }

    async fn consume(&self, queue: &str, auto_ack: bool) -> Result<DeliveryStream, BrokerError> {
        let consumer_tag = format!("odds-{}", Uuid::new_v4());
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions {
                    no_ack: auto_ack,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER_SIZE);
        let queue = queue.to_string();

        tokio::spawn(async move {
            while let Some(item) = consumer.next().await {
                match item {
                    Ok(delivery) => {
                        if tx.send(into_delivery(delivery, auto_ack)).await.is_err() {
                            tracing::debug!(queue = %queue, "Delivery receiver dropped");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(queue = %queue, error = %e, "Consumer stream failed");
                        break;
                    }
                }
            }
            tracing::debug!(queue = %queue, consumer_tag = %consumer_tag, "Consumer stopped");
        });

        Ok(rx)
    }

    async fn publish(&self, routing_key: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default();
        if let Some(correlation_id) = message.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }
        if let Some(content_type) = message.content_type {
            properties = properties.with_content_type(content_type.into());
        }
        if let Some(expiration) = message.expiration {
            properties = properties.with_expiration(expiration.as_millis().to_string().into());
        }

        let publish_error = |e: lapin::Error| BrokerError::Publish {
            routing_key: routing_key.to_string(),
            reason: e.to_string(),
        };

        let _guard = self.publish_lock.lock().await;
        self.channel
            .basic_publish(
                "",
                routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        Ok(())
    }
}
