//! The broker primitives [`BrokerQueue`](super::BrokerQueue) is built on.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Broker-level failures. Translated to `QueueError` before leaving the crate.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("topology declaration failed: {0}")]
    Declare(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("consume failed: {0}")]
    Consume(String),

    #[error("acknowledgement failed: {0}")]
    Ack(String),
}

/// Exchange, queue and dead-letter names for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub dead_letter_exchange: String,
    pub dead_letter_queue: String,
    pub dead_letter_routing_key: String,
}

impl Topology {
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            exchange: namespace.to_string(),
            queue: format!("{namespace}.jobs"),
            routing_key: format!("{namespace}.job"),
            dead_letter_exchange: format!("{namespace}.dlx"),
            dead_letter_queue: format!("{namespace}.dlq"),
            dead_letter_routing_key: format!("{namespace}.dead"),
        }
    }
}

/// A message ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    pub message_id: String,
    pub content_type: String,
    /// Survive a broker restart (AMQP delivery mode 2).
    pub persistent: bool,
    pub body: Vec<u8>,
}

/// Settles one delivery.
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;

    /// Reject without requeue; the broker routes the message to the
    /// dead-letter exchange.
    async fn reject(&self) -> BrokerResult<()>;
}

/// A delivery as received, before the body is decoded.
pub struct RawDelivery {
    pub message_id: Option<String>,
    pub body: Vec<u8>,
    pub redelivered: bool,
    pub acker: Box<dyn DeliveryAcker>,
}

pub type RawDeliveryStream = BoxStream<'static, BrokerResult<RawDelivery>>;

#[async_trait]
pub trait BrokerTransport: Send + Sync + 'static {
    /// Declare exchanges, queues and bindings. Idempotent.
    async fn declare(&self, topology: &Topology) -> BrokerResult<()>;

    async fn publish(&self, message: OutgoingMessage) -> BrokerResult<()>;

    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<RawDeliveryStream>;
}
