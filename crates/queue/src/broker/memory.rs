//! In-process [`BrokerTransport`] with broker-like routing and dead-lettering.
//!
//! Messages published to a declared exchange/routing key land on the bound
//! queue; rejected deliveries move to that queue's dead-letter queue.
//! Publishing to an undeclared route drops the message, like an unroutable
//! publish on a real broker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, Notify};

use super::transport::{
    BrokerError, BrokerResult, BrokerTransport, DeliveryAcker, OutgoingMessage, RawDelivery,
    RawDeliveryStream, Topology,
};

#[derive(Debug, Default)]
struct State {
    topologies: Vec<Topology>,
    queues: HashMap<String, VecDeque<OutgoingMessage>>,
    published: Vec<OutgoingMessage>,
    acked: Vec<String>,
}

impl State {
    fn route(&self, message: &OutgoingMessage) -> Option<String> {
        self.topologies
            .iter()
            .find(|t| t.exchange == message.exchange && t.routing_key == message.routing_key)
            .map(|t| t.queue.clone())
    }

    fn dead_letter_queue_of(&self, queue: &str) -> Option<String> {
        self.topologies
            .iter()
            .find(|t| t.queue == queue)
            .map(|t| t.dead_letter_queue.clone())
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    arrived: Notify,
    unavailable: AtomicBool,
}

/// Cheap to clone; clones share the same broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the broker were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every message accepted by `publish`, in order.
    pub async fn published(&self) -> Vec<OutgoingMessage> {
        self.inner.state.lock().await.published.clone()
    }

    pub async fn topologies(&self) -> Vec<Topology> {
        self.inner.state.lock().await.topologies.clone()
    }

    /// Messages waiting on `queue` (not yet delivered).
    pub async fn queue_depth(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .await
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    /// Message ids acknowledged so far.
    pub async fn acked(&self) -> Vec<String> {
        self.inner.state.lock().await.acked.clone()
    }

    /// Put an arbitrary body directly on `queue`.
    pub async fn inject(&self, queue: &str, message_id: &str, body: Vec<u8>) {
        let message = OutgoingMessage {
            exchange: String::new(),
            routing_key: queue.to_string(),
            message_id: message_id.to_string(),
            content_type: "application/octet-stream".into(),
            persistent: false,
            body,
        };
        self.inner
            .state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        self.inner.arrived.notify_waiters();
    }

    fn check_available(&self) -> BrokerResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(BrokerError::Connection("broker is unavailable".into()))
        } else {
            Ok(())
        }
    }
}

async fn next_delivery(inner: Arc<Inner>, queue: String) -> RawDelivery {
    loop {
        let notified = inner.arrived.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let popped = inner
            .state
            .lock()
            .await
            .queues
            .get_mut(&queue)
            .and_then(VecDeque::pop_front);

        if let Some(message) = popped {
            return RawDelivery {
                message_id: Some(message.message_id.clone()),
                body: message.body.clone(),
                redelivered: false,
                acker: Box::new(MemoryAcker {
                    inner: Arc::clone(&inner),
                    queue: queue.clone(),
                    message,
                }),
            };
        }
        notified.await;
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn declare(&self, topology: &Topology) -> BrokerResult<()> {
        self.check_available()?;
        let mut state = self.inner.state.lock().await;
        if !state.topologies.contains(topology) {
            state.topologies.push(topology.clone());
        }
        state.queues.entry(topology.queue.clone()).or_default();
        state
            .queues
            .entry(topology.dead_letter_queue.clone())
            .or_default();
        Ok(())
    }

    async fn publish(&self, message: OutgoingMessage) -> BrokerResult<()> {
        self.check_available()?;
        {
            let mut state = self.inner.state.lock().await;
            state.published.push(message.clone());
            if let Some(queue) = state.route(&message) {
                state.queues.entry(queue).or_default().push_back(message);
            }
        }
        self.inner.arrived.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> BrokerResult<RawDeliveryStream> {
        self.check_available()?;
        let inner = Arc::clone(&self.inner);
        let queue = queue.to_string();

        let stream = futures::stream::unfold((inner, queue), |(inner, queue)| async move {
            let delivery = next_delivery(Arc::clone(&inner), queue.clone()).await;
            Some((Ok(delivery), (inner, queue)))
        });
        Ok(stream.boxed())
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    queue: String,
    message: OutgoingMessage,
}

#[async_trait]
impl DeliveryAcker for MemoryAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.inner
            .state
            .lock()
            .await
            .acked
            .push(self.message.message_id.clone());
        Ok(())
    }

    async fn reject(&self) -> BrokerResult<()> {
        let mut state = self.inner.state.lock().await;
        if let Some(dlq) = state.dead_letter_queue_of(&self.queue) {
            state
                .queues
                .entry(dlq)
                .or_default()
                .push_back(self.message.clone());
        }
        Ok(())
    }
}
