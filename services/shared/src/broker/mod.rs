//! Broker abstraction
//!
//! The RPC client and the processor only need a small slice of AMQP: named
//! queues on the default exchange, an exclusive broker-named reply queue,
//! publishing with `correlation_id` / `reply_to`, and consuming with manual or
//! automatic acknowledgement. `BrokerChannel` captures that slice so the same
//! code runs against RabbitMQ (`AmqpConnector`) and the in-process
//! `MemoryBroker` used by tests.

mod amqp;
mod memory;

pub use amqp::{AmqpChannel, AmqpConnector};
pub use memory::{AckOutcome, MemoryBroker};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::retry_strategy::RetryStrategy;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Could not connect to {endpoint} after {attempts} attempts: {reason}")]
    Unreachable {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error("Queue declaration failed for '{queue}': {reason}")]
    Declare { queue: String, reason: String },

    #[error("Consume on '{queue}' failed: {reason}")]
    Consume { queue: String, reason: String },

    #[error("Publish to '{routing_key}' failed: {reason}")]
    Publish { routing_key: String, reason: String },

    #[error("Acknowledgement failed: {0}")]
    Acknowledge(String),
}

/// A message to publish on the default exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub content_type: Option<String>,
    /// Per-message TTL; the broker discards the message once it expires
    pub expiration: Option<Duration>,
}

impl OutboundMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

/// Settles a single delivery with the broker
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Reject without requeue
    async fn reject(&self) -> Result<(), BrokerError>;
}

/// Acknowledger for deliveries consumed in auto-ack mode
pub(crate) struct AutoAcked;

#[async_trait]
impl Acknowledger for AutoAcked {
    async fn ack(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn reject(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// A message received from a queue
pub struct Delivery {
    pub delivery_tag: u64,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub body: Vec<u8>,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        delivery_tag: u64,
        correlation_id: Option<String>,
        reply_to: Option<String>,
        body: Vec<u8>,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            correlation_id,
            reply_to,
            body,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn reject(&self) -> Result<(), BrokerError> {
        self.acker.reject().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("correlation_id", &self.correlation_id)
            .field("reply_to", &self.reply_to)
            .field("body_len", &self.body.len())
            .finish()
    }
}

pub type DeliveryStream = mpsc::Receiver<Delivery>;

/// One channel on an open broker connection
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a named queue; declaring an existing queue is a no-op
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError>;

    /// Declare an exclusive queue named by the broker and return its name
    async fn declare_reply_queue(&self) -> Result<String, BrokerError>;

    /// Start consuming `queue`; with `auto_ack` deliveries need no settlement
    async fn consume(&self, queue: &str, auto_ack: bool) -> Result<DeliveryStream, BrokerError>;

    /// Publish on the default exchange, routed by queue name
    async fn publish(&self, routing_key: &str, message: OutboundMessage) -> Result<(), BrokerError>;
}

/// Opens broker channels
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    /// Human-readable endpoint for logs (no credentials)
    fn endpoint(&self) -> String;
}

/// Connect with bounded, fixed-delay retries
///
/// Exhausting the budget yields `BrokerError::Unreachable`; callers treat it
/// as fatal.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    strategy: &RetryStrategy,
) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
    let endpoint = connector.endpoint();

    let channel = strategy
        .run(|attempt| {
            tracing::debug!(endpoint = %endpoint, attempt, "Connecting to broker");
            connector.connect()
        })
        .await
        .map_err(|exhausted| {
            tracing::error!(
                endpoint = %endpoint,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "Broker unreachable"
            );
            BrokerError::Unreachable {
                endpoint: endpoint.clone(),
                attempts: exhausted.attempts,
                reason: exhausted.last_error.to_string(),
            }
        })?;

    tracing::info!(endpoint = %endpoint, "Broker connected");
    Ok(channel)
}
