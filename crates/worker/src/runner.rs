//! Worker loops.
//!
//! [`Runner::run`] picks the loop from the queue's capabilities:
//!
//! - **poll** (list-backed): dequeue with a timeout, run the job, report the
//!   outcome with `update_job_status`. Transient failures go `failed` →
//!   `retrying`; the queue re-enqueues and dead-letters once the retry
//!   budget is spent. Permanent failures are dead-lettered immediately.
//! - **consume** (broker-backed): take deliveries from the subscription, run
//!   the job with bounded in-process retries, `ack` on success and `reject`
//!   (dead-letter) on permanent failure or exhausted retries.

use std::sync::Arc;
use std::time::Duration;

use careerline_queue::{
    Consumable, Delivery, Job, JobQueue, JobResult, JobStatus, QueueError, StatusUpdate,
};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::callback::ArtifactUploader;
use crate::handler::{HandlerError, JobHandler, JobOutput};

/// Pause after a queue error before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Delay between in-process attempts in the consume loop.
const CONSUME_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The queue offers neither blocking polls nor push consumption.
    #[error("The {backend} backend supports neither polling nor consuming")]
    NoConsumption { backend: &'static str },
}

/// How a job run ended, once reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// The job completed (directly or through the completion callback).
    Completed,
    /// The API refused the result because the job is already terminal.
    Discarded,
    /// The job failed; carries the status it was left in.
    Failed(JobStatus),
}

pub struct Runner {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    uploader: Arc<dyn ArtifactUploader>,
    poll_timeout: Duration,
    consumer_tag: String,
}

impl Runner {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        uploader: Arc<dyn ArtifactUploader>,
    ) -> Self {
        Self {
            queue,
            handler,
            uploader,
            poll_timeout: Duration::from_secs(5),
            consumer_tag: "careerline-worker".into(),
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_consumer_tag(mut self, consumer_tag: impl Into<String>) -> Self {
        self.consumer_tag = consumer_tag.into();
        self
    }

    /// Check the queue can feed this worker at all.
    pub fn check_capabilities(&self) -> Result<(), WorkerError> {
        let caps = self.queue.capabilities();
        if caps.poll || (caps.consume && self.queue.as_consumable().is_some()) {
            Ok(())
        } else {
            Err(WorkerError::NoConsumption {
                backend: self.queue.backend_name(),
            })
        }
    }

    /// Process jobs until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), WorkerError> {
        self.check_capabilities()?;

        if self.queue.capabilities().poll {
            self.poll_loop(&cancel).await;
            return Ok(());
        }
        match self.queue.as_consumable() {
            Some(consumable) => self.consume_loop(consumable, &cancel).await,
            None => Err(WorkerError::NoConsumption {
                backend: self.queue.backend_name(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Poll
    // -----------------------------------------------------------------------

    async fn poll_loop(&self, cancel: &CancellationToken) {
        tracing::info!(
            backend = self.queue.backend_name(),
            poll_timeout_secs = self.poll_timeout.as_secs_f64(),
            "Polling for jobs",
        );

        // Cancellation is checked between polls so a popped job is never
        // abandoned mid-dequeue.
        while !cancel.is_cancelled() {
            match self.queue.dequeue_job(self.poll_timeout).await {
                Ok(Some(job)) => {
                    self.process_claimed(job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Dequeue failed");
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Poll loop stopped");
    }

    /// Run a job claimed by `dequeue_job` and record the outcome.
    pub async fn process_claimed(&self, job: Job) -> Settled {
        tracing::info!(
            job_id = %job.id,
            kind = job.payload.kind(),
            retry_count = job.retry_count,
            "Processing job",
        );

        match self.execute(&job).await {
            Ok(Some(result)) => {
                match self
                    .queue
                    .update_job_status(
                        &job.id,
                        StatusUpdate::new(JobStatus::Completed).with_result(result),
                    )
                    .await
                {
                    Ok(stored) if stored.status == JobStatus::Completed => Settled::Completed,
                    Ok(stored) => {
                        tracing::warn!(
                            job_id = %job.id,
                            status = %stored.status,
                            "Result discarded, job already terminal",
                        );
                        Settled::Discarded
                    }
                    Err(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "Failed to record completion");
                        Settled::Failed(job.status)
                    }
                }
            }
            Ok(None) => Settled::Completed,
            Err(Outcome::Discarded) => Settled::Discarded,
            Err(Outcome::Failed(err)) => self.report_failure(&job, &err).await,
        }
    }

    async fn report_failure(&self, job: &Job, err: &HandlerError) -> Settled {
        let update = if err.is_permanent() {
            StatusUpdate::new(JobStatus::DeadLetter).with_error(err.to_string(), err.kind())
        } else {
            StatusUpdate::new(JobStatus::Failed).with_error(err.to_string(), err.kind())
        };

        let stored = match self.queue.update_job_status(&job.id, update).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
                return Settled::Failed(job.status);
            }
        };

        // Transient: ask for another attempt. The queue bumps the counter and
        // dead-letters once the budget is spent.
        let stored = if stored.status == JobStatus::Failed && !stored.is_cancelled() {
            match self
                .queue
                .update_job_status(&job.id, StatusUpdate::new(JobStatus::Retrying))
                .await
            {
                Ok(stored) => stored,
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to schedule retry");
                    stored
                }
            }
        } else {
            stored
        };

        match stored.status {
            JobStatus::DeadLetter => tracing::error!(
                job_id = %job.id,
                retry_count = stored.retry_count,
                error = %err,
                "Job dead-lettered",
            ),
            status => tracing::warn!(
                job_id = %job.id,
                status = %status,
                retry_count = stored.retry_count,
                max_retries = stored.retry_budget(),
                error = %err,
                "Job failed",
            ),
        }
        Settled::Failed(stored.status)
    }

    // -----------------------------------------------------------------------
    // Consume
    // -----------------------------------------------------------------------

    async fn consume_loop(
        &self,
        consumable: &dyn Consumable,
        cancel: &CancellationToken,
    ) -> Result<(), WorkerError> {
        let mut deliveries = consumable.subscribe(&self.consumer_tag).await?;
        tracing::info!(
            backend = self.queue.backend_name(),
            consumer_tag = %self.consumer_tag,
            "Consuming jobs",
        );

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = deliveries.next() => next,
            };
            match next {
                Some(Ok(delivery)) => {
                    self.process_delivery(delivery).await;
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Delivery failed");
                }
                None => {
                    tracing::warn!("Subscription closed by the broker");
                    break;
                }
            }
        }

        tracing::info!("Consume loop stopped");
        Ok(())
    }

    /// Run a pushed delivery and settle it with the broker.
    pub async fn process_delivery(&self, delivery: Delivery) -> Settled {
        let job = delivery.job.clone();
        let attempts = job.retry_budget().saturating_add(1);
        tracing::info!(
            job_id = %job.id,
            kind = job.payload.kind(),
            redelivered = delivery.redelivered,
            "Processing delivery",
        );

        let mut attempt = 1;
        let outcome = loop {
            match self.execute(&job).await {
                Ok(_) => break Ok(Settled::Completed),
                Err(Outcome::Discarded) => break Ok(Settled::Discarded),
                Err(Outcome::Failed(err)) if err.is_permanent() || attempt >= attempts => {
                    break Err(err)
                }
                Err(Outcome::Failed(err)) => {
                    tracing::warn!(job_id = %job.id, attempt, error = %err, "Attempt failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(CONSUME_RETRY_DELAY).await;
                }
            }
        };

        match outcome {
            Ok(settled) => {
                if let Err(e) = delivery.ack().await {
                    tracing::error!(job_id = %job.id, error = %e, "Ack failed");
                }
                settled
            }
            Err(err) => {
                tracing::error!(job_id = %job.id, attempt, error = %err, "Dead-lettering job");
                if let Err(e) = delivery.reject().await {
                    tracing::error!(job_id = %job.id, error = %e, "Reject failed");
                }
                Settled::Failed(JobStatus::DeadLetter)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Run the handler and deliver artifacts.
    ///
    /// `Ok(Some(result))` must still be written to the queue; `Ok(None)`
    /// means the completion callback already completed the job.
    async fn execute(&self, job: &Job) -> Result<Option<JobResult>, Outcome> {
        let output = self.handler.handle(job).await.map_err(Outcome::Failed)?;

        match output {
            JobOutput::Artifact(artifact) => {
                let file_name = artifact.file_name.clone();
                match self.uploader.upload(job, artifact).await {
                    Ok(resume_id) => {
                        tracing::info!(job_id = %job.id, resume_id, file_name = %file_name, "Artifact uploaded");
                        Ok(None)
                    }
                    Err(e) if e.is_discarded() => {
                        tracing::warn!(job_id = %job.id, error = %e, "Upload refused, job already terminal");
                        Err(Outcome::Discarded)
                    }
                    Err(e) if e.is_permanent() => {
                        Err(Outcome::Failed(HandlerError::Permanent(e.to_string())))
                    }
                    Err(e) => Err(Outcome::Failed(HandlerError::Transient(e.to_string()))),
                }
            }
            JobOutput::Details(details) => Ok(Some(JobResult {
                details: (!details.is_null()).then_some(details),
                ..JobResult::default()
            })),
        }
    }
}

/// Why [`Runner::execute`] did not produce a result.
enum Outcome {
    Discarded,
    Failed(HandlerError),
}
