//! List-backed queue backend.
//!
//! Each job is a JSON record at `<ns>:job:<id>` with a TTL; job ids are
//! pushed onto `<ns>:queue` and popped from the other end, giving FIFO
//! order. Every status write is a compare-and-swap against the record that
//! was read, retried a few times before giving up with
//! [`QueueError::ConcurrentModification`]. Writes that make a job claimable
//! again (`retrying`, manual retry) push its id in the same atomic step.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::QueueConfig;
use crate::contract::{JobQueue, QueueCapabilities};
use crate::error::{QueueError, QueueResult};
use crate::events::{JobEvent, JobEventBus};
use crate::job::{Applied, Job, JobStatus, StatusUpdate};
use crate::store::{ListStore, StoreError, Swap, SwapOutcome};

/// Attempts at a conditional write before reporting a conflict.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

const BACKEND: &str = "redis";

impl From<StoreError> for QueueError {
    fn from(err: StoreError) -> Self {
        Self::QueueUnavailable(err.to_string())
    }
}

/// How a read-modify-write should be persisted.
#[derive(Debug, Clone, Copy)]
enum Refresh {
    /// Keep the record's remaining TTL.
    KeepTtl,
    /// Restart the TTL (the job is starting over).
    ResetTtl,
}

pub struct ListQueue {
    store: Arc<dyn ListStore>,
    namespace: String,
    job_ttl: Duration,
    default_max_retries: u32,
    events: Arc<JobEventBus>,
}

impl ListQueue {
    pub fn new(store: Arc<dyn ListStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            namespace: config.namespace.clone(),
            job_ttl: config.job_ttl,
            default_max_retries: config.default_max_retries,
            events: Arc::new(JobEventBus::default()),
        }
    }

    /// Share an existing event bus instead of the queue's own.
    pub fn with_event_bus(mut self, events: Arc<JobEventBus>) -> Self {
        self.events = events;
        self
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{}", self.namespace, id)
    }

    fn list_key(&self) -> String {
        format!("{}:queue", self.namespace)
    }

    fn events_channel(&self) -> String {
        format!("{}:events", self.namespace)
    }

    /// Read the raw record and its decoded form.
    ///
    /// A record that no longer decodes is treated like a missing one.
    async fn load(&self, id: &str) -> QueueResult<(String, Job)> {
        let raw = self
            .store
            .get(&self.job_key(id))
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        match serde_json::from_str::<Job>(&raw) {
            Ok(job) => Ok((raw, job)),
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Discarding unreadable job record");
                Err(QueueError::JobNotFound(id.to_string()))
            }
        }
    }

    /// Read, mutate and conditionally write back a job.
    ///
    /// `mutate` returns the status before the change, or `None` when it left
    /// the job untouched (nothing is written). The id is re-pushed when the
    /// job became claimable again.
    async fn modify<F>(&self, id: &str, refresh: Refresh, mut mutate: F) -> QueueResult<Job>
    where
        F: FnMut(&mut Job) -> QueueResult<Option<JobStatus>> + Send,
    {
        let key = self.job_key(id);
        let list = self.list_key();

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (raw, mut job) = self.load(id).await?;
            let Some(previous) = mutate(&mut job)? else {
                return Ok(job);
            };

            let value = serde_json::to_string(&job)?;
            let requeue = job.status.is_claimable() && !previous.is_claimable();
            let swap = Swap {
                key: &key,
                expected: &raw,
                value: &value,
                ttl: match refresh {
                    Refresh::KeepTtl => None,
                    Refresh::ResetTtl => Some(self.job_ttl),
                },
                push: requeue.then_some((list.as_str(), id)),
            };

            match self.store.compare_and_swap(swap).await? {
                SwapOutcome::Swapped => {
                    tracing::debug!(
                        job_id = %id,
                        from = %previous,
                        to = %job.status,
                        requeued = requeue,
                        "Job status written",
                    );
                    self.emit(&job, Some(previous)).await;
                    return Ok(job);
                }
                SwapOutcome::Missing => return Err(QueueError::JobNotFound(id.to_string())),
                SwapOutcome::Conflict => {
                    tracing::debug!(job_id = %id, attempt, "Job changed concurrently, re-reading");
                }
            }
        }

        tracing::warn!(job_id = %id, "Giving up on job write after repeated conflicts");
        Err(QueueError::ConcurrentModification(id.to_string()))
    }

    /// Claim a popped id. `Ok(None)` when the job is no longer claimable.
    async fn claim(&self, id: &str) -> QueueResult<Option<Job>> {
        let mut claimed = false;
        let job = self
            .modify(id, Refresh::KeepTtl, |job| {
                claimed = job.status.is_claimable();
                if claimed {
                    job.claim().map(Some)
                } else {
                    Ok(None)
                }
            })
            .await?;

        Ok(claimed.then_some(job))
    }

    /// Publish on the in-process bus and the store channel. Best-effort.
    async fn emit(&self, job: &Job, previous: Option<JobStatus>) {
        let event = JobEvent::for_job(job, previous);
        match serde_json::to_string(&event) {
            Ok(message) => {
                if let Err(e) = self.store.publish(&self.events_channel(), &message).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to publish job event");
                }
            }
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Failed to encode job event"),
        }
        self.events.publish(event);
    }
}

#[async_trait]
impl JobQueue for ListQueue {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn capabilities(&self) -> QueueCapabilities {
        QueueCapabilities {
            poll: true,
            consume: false,
            records: true,
            dead_letter_exchange: false,
        }
    }

    fn events(&self) -> &JobEventBus {
        &self.events
    }

    async fn enqueue_job(&self, mut job: Job) -> QueueResult<Job> {
        job.prepare_for_enqueue(self.default_max_retries);
        let value = serde_json::to_string(&job)?;

        self.store
            .put_and_push(
                &self.job_key(&job.id),
                &value,
                self.job_ttl,
                &self.list_key(),
                &job.id,
            )
            .await?;

        tracing::info!(
            job_id = %job.id,
            user_id = job.user_id,
            kind = job.payload.kind(),
            "Job enqueued",
        );
        self.emit(&job, None).await;
        Ok(job)
    }

    async fn dequeue_job(&self, timeout: Duration) -> QueueResult<Option<Job>> {
        let deadline = Instant::now() + timeout;
        let list = self.list_key();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let Some(id) = self.store.pop_blocking(&list, remaining).await? else {
                return Ok(None);
            };

            match self.claim(&id).await {
                Ok(Some(job)) => return Ok(Some(job)),
                Ok(None) => {
                    tracing::debug!(job_id = %id, "Skipping popped job that is no longer claimable");
                }
                Err(QueueError::JobNotFound(_)) => {
                    tracing::warn!(job_id = %id, "Popped job has no record; treating it as lost");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_job(&self, id: &str) -> QueueResult<Job> {
        self.load(id).await.map(|(_, job)| job)
    }

    async fn update_job_status(&self, id: &str, update: StatusUpdate) -> QueueResult<Job> {
        self.modify(id, Refresh::KeepTtl, |job| {
            match job.apply(update.clone())? {
                Applied::Changed { previous } => Ok(Some(previous)),
                Applied::Ignored => {
                    tracing::info!(
                        job_id = %job.id,
                        status = %job.status,
                        requested = %update.status,
                        "Ignoring status write to a terminal job",
                    );
                    Ok(None)
                }
            }
        })
        .await
    }

    async fn retry_job(&self, id: &str) -> QueueResult<Job> {
        let job = self
            .modify(id, Refresh::ResetTtl, |job| job.reset_for_retry().map(Some))
            .await?;
        tracing::info!(job_id = %id, "Job reset for retry");
        Ok(job)
    }

    async fn cancel_job(&self, id: &str) -> QueueResult<Job> {
        let job = self
            .modify(id, Refresh::KeepTtl, |job| job.cancel().map(Some))
            .await?;
        tracing::info!(job_id = %id, "Job cancelled");
        Ok(job)
    }
}
