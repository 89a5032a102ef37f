//! The backend-agnostic queue contract.
//!
//! [`JobQueue`] is the shared interface every backend implements. Backends
//! differ in how workers consume: the list-backed backend supports blocking
//! polls, the broker-backed backend pushes deliveries through
//! [`Consumable`]. Wiring code probes [`QueueCapabilities`] at startup so a
//! mismatch fails there instead of on the first request.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::broker::Delivery;
use crate::error::{QueueError, QueueResult};
use crate::events::JobEventBus;
use crate::job::{ErrorKind, Job, JobStatus, StatusUpdate};

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// What a backend can actually do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueCapabilities {
    /// `dequeue_job` blocks for the next job.
    pub poll: bool,
    /// `as_consumable` returns a push/ack entry point.
    pub consume: bool,
    /// Job records are stored: get, update, retry and cancel work.
    pub records: bool,
    /// Dead-lettering is performed by the backend itself.
    pub dead_letter_exchange: bool,
}

/// A single capability to probe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Poll,
    Consume,
    Records,
}

impl Capability {
    fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Consume => "consume",
            Self::Records => "records",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl QueueCapabilities {
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Poll => self.poll,
            Capability::Consume => self.consume,
            Capability::Records => self.records,
        }
    }
}

/// Fail with [`QueueError::UnsupportedOperation`] unless `queue` has `capability`.
///
/// Intended for startup wiring, where a mismatch is a configuration error.
pub fn require_capability(queue: &dyn JobQueue, capability: Capability) -> QueueResult<()> {
    if queue.capabilities().supports(capability) {
        Ok(())
    } else {
        Err(QueueError::unsupported(capability.as_str(), queue.backend_name()))
    }
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Short backend identifier used in logs and errors.
    fn backend_name(&self) -> &'static str;

    fn capabilities(&self) -> QueueCapabilities;

    /// Bus carrying every status change written by this queue.
    fn events(&self) -> &JobEventBus;

    /// Store a new job as `pending` and make it available to workers.
    ///
    /// Returns the stored record, including the assigned id.
    async fn enqueue_job(&self, job: Job) -> QueueResult<Job>;

    /// Wait up to `timeout` for the next job and claim it (`processing`).
    ///
    /// `Ok(None)` means nothing arrived in time. Never call this from a
    /// request-serving path.
    async fn dequeue_job(&self, timeout: Duration) -> QueueResult<Option<Job>>;

    async fn get_job(&self, id: &str) -> QueueResult<Job>;

    /// Merge `update` into the stored record and return the result.
    ///
    /// Updates against a terminal job are discarded and the stored record is
    /// returned unchanged.
    async fn update_job_status(&self, id: &str, update: StatusUpdate) -> QueueResult<Job>;

    async fn mark_job_complete(&self, id: &str) -> QueueResult<Job> {
        self.update_job_status(id, StatusUpdate::new(JobStatus::Completed))
            .await
    }

    async fn mark_job_failed(&self, id: &str, message: &str) -> QueueResult<Job> {
        self.update_job_status(
            id,
            StatusUpdate::new(JobStatus::Failed).with_error(message, ErrorKind::Transient),
        )
        .await
    }

    /// Reset a `failed`/`dead_letter` job and make it available again.
    async fn retry_job(&self, id: &str) -> QueueResult<Job>;

    /// Cancel a `pending`/`processing` job. Cooperative: running workers
    /// are not interrupted, their later writes are discarded.
    async fn cancel_job(&self, id: &str) -> QueueResult<Job>;

    /// Push/ack consumption entry point, for backends that have one.
    fn as_consumable(&self) -> Option<&dyn Consumable> {
        None
    }
}

// ---------------------------------------------------------------------------
// Consumable
// ---------------------------------------------------------------------------

/// Stream of deliveries handed to a push-style consumer.
pub type JobSubscription = BoxStream<'static, QueueResult<Delivery>>;

#[async_trait]
pub trait Consumable: Send + Sync {
    /// Start consuming; each item must be acked or rejected.
    async fn subscribe(&self, consumer_tag: &str) -> QueueResult<JobSubscription>;
}
