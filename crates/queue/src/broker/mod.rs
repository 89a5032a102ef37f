//! Broker-backed queue backend.
//!
//! Jobs are published as persistent JSON messages to a durable exchange and
//! consumed with explicit acknowledgement. Retry and dead-letter bookkeeping
//! belong to the broker: a rejected delivery is routed through the
//! namespace's dead-letter exchange. The backend keeps no job records, so
//! `dequeue_job`, `get_job`, `update_job_status`, `retry_job` and
//! `cancel_job` fail with [`QueueError::UnsupportedOperation`]; workers use
//! [`Consumable::subscribe`] instead.

pub mod amqp;
pub mod memory;
pub mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

pub use self::amqp::AmqpTransport;
pub use self::memory::MemoryBroker;
pub use self::transport::{BrokerError, BrokerTransport, OutgoingMessage, Topology};

use self::transport::DeliveryAcker;
use crate::config::QueueConfig;
use crate::contract::{Consumable, JobQueue, JobSubscription, QueueCapabilities};
use crate::error::{QueueError, QueueResult};
use crate::events::{JobEvent, JobEventBus};
use crate::job::{Job, StatusUpdate};

const BACKEND: &str = "amqp";

pub const CONTENT_TYPE_JSON: &str = "application/json";

impl From<BrokerError> for QueueError {
    fn from(err: BrokerError) -> Self {
        Self::QueueUnavailable(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// A job handed to a consumer. Settle it with [`ack`](Self::ack) or
/// [`reject`](Self::reject); an unsettled delivery is redelivered by the
/// broker once the consumer goes away.
pub struct Delivery {
    pub job: Job,
    pub redelivered: bool,
    acker: Box<dyn DeliveryAcker>,
}

impl Delivery {
    pub async fn ack(self) -> QueueResult<()> {
        self.acker.ack().await?;
        Ok(())
    }

    /// Reject without requeue; the broker dead-letters the message.
    pub async fn reject(self) -> QueueResult<()> {
        self.acker.reject().await?;
        Ok(())
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("job_id", &self.job.id)
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// BrokerQueue
// ---------------------------------------------------------------------------

pub struct BrokerQueue {
    transport: Arc<dyn BrokerTransport>,
    topology: Topology,
    default_max_retries: u32,
    events: Arc<JobEventBus>,
}

impl BrokerQueue {
    /// Declare the namespace's topology on `transport` and return the queue.
    pub async fn declare(
        transport: Arc<dyn BrokerTransport>,
        config: &QueueConfig,
    ) -> QueueResult<Self> {
        let topology = Topology::for_namespace(&config.namespace);
        transport.declare(&topology).await?;

        Ok(Self {
            transport,
            topology,
            default_max_retries: config.default_max_retries,
            events: Arc::new(JobEventBus::default()),
        })
    }

    /// Share an existing event bus instead of the queue's own.
    pub fn with_event_bus(mut self, events: Arc<JobEventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}

#[async_trait]
impl JobQueue for BrokerQueue {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities {
            poll: false,
            consume: true,
            records: false,
            dead_letter_exchange: true,
        }
    }

    fn events(&self) -> &JobEventBus {
        &self.events
    }

    async fn enqueue_job(&self, mut job: Job) -> QueueResult<Job> {
        job.prepare_for_enqueue(self.default_max_retries);
        let body = serde_json::to_vec(&job)?;

        self.transport
            .publish(OutgoingMessage {
                exchange: self.topology.exchange.clone(),
                routing_key: self.topology.routing_key.clone(),
                message_id: job.id.clone(),
                content_type: CONTENT_TYPE_JSON.to_string(),
                persistent: true,
                body,
            })
            .await?;

        tracing::info!(
            job_id = %job.id,
            user_id = job.user_id,
            kind = job.payload.kind(),
            exchange = %self.topology.exchange,
            "Job published",
        );
        self.events.publish(JobEvent::for_job(&job, None));
        Ok(job)
    }

    async fn dequeue_job(&self, _timeout: Duration) -> QueueResult<Option<Job>> {
        Err(QueueError::unsupported("dequeue_job", BACKEND))
    }

    async fn get_job(&self, _id: &str) -> QueueResult<Job> {
        Err(QueueError::unsupported("get_job", BACKEND))
    }

    async fn update_job_status(&self, _id: &str, _update: StatusUpdate) -> QueueResult<Job> {
        Err(QueueError::unsupported("update_job_status", BACKEND))
    }

    async fn retry_job(&self, _id: &str) -> QueueResult<Job> {
        Err(QueueError::unsupported("retry_job", BACKEND))
    }

    async fn cancel_job(&self, _id: &str) -> QueueResult<Job> {
        Err(QueueError::unsupported("cancel_job", BACKEND))
    }

    fn as_consumable(&self) -> Option<&dyn Consumable> {
        Some(self)
    }
}

#[async_trait]
impl Consumable for BrokerQueue {
    async fn subscribe(&self, consumer_tag: &str) -> QueueResult<JobSubscription> {
        let raw = self
            .transport
            .consume(&self.topology.queue, consumer_tag)
            .await?;

        tracing::info!(queue = %self.topology.queue, consumer_tag, "Consuming jobs");

        let deliveries = raw.filter_map(|item| async move {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => return Some(Err(QueueError::from(e))),
            };
            match serde_json::from_slice::<Job>(&raw.body) {
                Ok(job) => Some(Ok(Delivery {
                    job,
                    redelivered: raw.redelivered,
                    acker: raw.acker,
                })),
                Err(e) => {
                    tracing::warn!(
                        message_id = raw.message_id.as_deref().unwrap_or("-"),
                        error = %e,
                        "Dead-lettering undecodable delivery",
                    );
                    if let Err(e) = raw.acker.reject().await {
                        tracing::error!(error = %e, "Failed to reject undecodable delivery");
                    }
                    None
                }
            }
        });
        Ok(deliveries.boxed())
    }
}
