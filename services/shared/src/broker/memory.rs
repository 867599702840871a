//! In-process broker with AMQP default-exchange semantics
//!
//! Queues are bounded channels keyed by name. Publishing to a queue nobody
//! declared drops the message, like an unroutable publish on the default
//! exchange. Each queue has at most one consumer.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{
    Acknowledger, BrokerChannel, BrokerError, Connector, Delivery, DeliveryStream,
    OutboundMessage,
};
use crate::constants::DELIVERY_BUFFER_SIZE;

/// How a delivery was settled by its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    Rejected,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, MemoryQueue>,
    next_reply_queue: u64,
    next_delivery_tag: u64,
    connections: u32,
    settlements: Vec<(u64, AckOutcome)>,
    unroutable: Vec<(String, OutboundMessage)>,
}

struct MemoryQueue {
    sender: mpsc::Sender<Delivery>,
    receiver: Option<mpsc::Receiver<Delivery>>,
}

impl MemoryQueue {
    fn new() -> Self {
        let (sender, receiver) = mpsc::channel(DELIVERY_BUFFER_SIZE);
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

struct MemoryAcker {
    delivery_tag: u64,
    inner: Arc<Mutex<Inner>>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.inner
            .lock()
            .settlements
            .push((self.delivery_tag, AckOutcome::Acked));
        Ok(())
    }

    async fn reject(&self) -> Result<(), BrokerError> {
        self.inner
            .lock()
            .settlements
            .push((self.delivery_tag, AckOutcome::Rejected));
        Ok(())
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `connect` calls
    pub fn connection_count(&self) -> u32 {
        self.inner.lock().connections
    }

    pub fn queue_exists(&self, name: &str) -> bool {
        self.inner.lock().queues.contains_key(name)
    }

    /// Settlements recorded so far, in order
    pub fn settlements(&self) -> Vec<(u64, AckOutcome)> {
        self.inner.lock().settlements.clone()
    }

    /// Messages published to queues that did not exist
    pub fn unroutable(&self) -> Vec<(String, OutboundMessage)> {
        self.inner.lock().unroutable.clone()
    }

    /// Enqueue a message and return its delivery tag, or `None` if unroutable
    pub async fn deliver(
        &self,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<Option<u64>, BrokerError> {
        let (sender, delivery_tag) = {
            let mut inner = self.inner.lock();
            let Some(sender) = inner.queues.get(routing_key).map(|q| q.sender.clone()) else {
                tracing::debug!(routing_key, "Dropping unroutable message");
                inner.unroutable.push((routing_key.to_string(), message));
                return Ok(None);
            };
            inner.next_delivery_tag += 1;
            (sender, inner.next_delivery_tag)
        };

        let delivery = Delivery::new(
            delivery_tag,
            message.correlation_id,
            message.reply_to,
            message.body,
            Arc::new(MemoryAcker {
                delivery_tag,
                inner: self.inner.clone(),
            }),
        );

        sender
            .send(delivery)
            .await
            .map_err(|_| BrokerError::Publish {
                routing_key: routing_key.to_string(),
                reason: "queue consumer is gone".to_string(),
            })?;

        Ok(Some(delivery_tag))
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        self.inner.lock().connections += 1;
        Ok(Arc::new(self.clone()))
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

#[async_trait]
impl BrokerChannel for MemoryBroker {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.inner
            .lock()
            .queues
            .entry(name.to_string())
            .or_insert_with(MemoryQueue::new);
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        let mut inner = self.inner.lock();
        inner.next_reply_queue += 1;
        let name = format!("amq.gen-{}", inner.next_reply_queue);
        inner.queues.insert(name.clone(), MemoryQueue::new());
        Ok(name)
    }

    async fn consume(&self, queue: &str, _auto_ack: bool) -> Result<DeliveryStream, BrokerError> {
        let mut inner = self.inner.lock();
        let entry = inner.queues.get_mut(queue).ok_or_else(|| BrokerError::Consume {
            queue: queue.to_string(),
            reason: "no such queue".to_string(),
        })?;

        entry.receiver.take().ok_or_else(|| BrokerError::Consume {
            queue: queue.to_string(),
            reason: "queue already has a consumer".to_string(),
        })
    }

    async fn publish(&self, routing_key: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        self.deliver(routing_key, message).await.map(|_| ())
    }
}
