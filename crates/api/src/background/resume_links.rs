//! Retry outbox for resume links that failed during the completion callback.
//!
//! The callback links a new resume to its job application best-effort. When
//! that write fails the resume still exists, so the link is handed to this
//! outbox instead of being dropped: a bounded channel drained by one task
//! that retries with exponential backoff and logs the final outcome.

use std::sync::Arc;
use std::time::Duration;

use careerline_core::types::DbId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::services::JobApplicationService;

/// A resume that still has to be attached to its application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLink {
    pub job_id: String,
    pub job_application_id: DbId,
    pub user_id: DbId,
    pub resume_id: DbId,
}

/// Backoff schedule for link retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Sending half of the outbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct LinkOutbox {
    sender: mpsc::Sender<PendingLink>,
}

impl LinkOutbox {
    /// Create an outbox holding at most `capacity` pending links.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PendingLink>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a link for retry without waiting. Returns `false` (and logs)
    /// when the outbox is full or its worker has stopped.
    pub fn submit(&self, link: PendingLink) -> bool {
        match self.sender.try_send(link) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(link)) => {
                tracing::error!(
                    job_id = %link.job_id,
                    job_application_id = link.job_application_id,
                    resume_id = link.resume_id,
                    "Resume link outbox full; link dropped",
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(link)) => {
                tracing::error!(
                    job_id = %link.job_id,
                    job_application_id = link.job_application_id,
                    resume_id = link.resume_id,
                    "Resume link outbox closed; link dropped",
                );
                false
            }
        }
    }
}

/// Drain the outbox until `cancel` fires or every sender is gone.
pub async fn run(
    mut receiver: mpsc::Receiver<PendingLink>,
    applications: Arc<dyn JobApplicationService>,
    policy: RetryPolicy,
    cancel: CancellationToken,
) {
    tracing::info!(max_attempts = policy.max_attempts, "Resume link outbox started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Resume link outbox stopping");
                break;
            }
            next = receiver.recv() => match next {
                Some(link) => {
                    deliver(&link, applications.as_ref(), policy, &cancel).await;
                }
                None => break,
            }
        }
    }
}

async fn deliver(
    link: &PendingLink,
    applications: &dyn JobApplicationService,
    policy: RetryPolicy,
    cancel: &CancellationToken,
) -> bool {
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts {
        match applications
            .link_resume(link.job_application_id, link.user_id, link.resume_id)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    job_id = %link.job_id,
                    job_application_id = link.job_application_id,
                    resume_id = link.resume_id,
                    attempt,
                    "Resume linked from outbox",
                );
                return true;
            }
            Err(e) if attempt == policy.max_attempts => {
                tracing::error!(
                    job_id = %link.job_id,
                    job_application_id = link.job_application_id,
                    resume_id = link.resume_id,
                    error = %e,
                    "Giving up on resume link",
                );
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %link.job_id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Resume link failed, retrying",
                );
                tokio::select! {
                    _ = cancel.cancelled() => return false,
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(policy.max_delay);
            }
        }
    }
    false
}
