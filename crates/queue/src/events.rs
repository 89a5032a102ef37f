//! In-process job status-change bus backed by a `tokio::sync::broadcast` channel.
//!
//! Every backend publishes a [`JobEvent`] whenever it writes a new status.
//! Observers (log shippers, tests, a future push channel) subscribe
//! independently; nobody is required to listen.

use careerline_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{Job, JobStatus};

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A status change observed on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: String,
    pub user_id: DbId,
    /// `job_application` or `resume_generation`.
    pub kind: String,
    /// `None` for the initial enqueue.
    pub previous: Option<JobStatus>,
    pub status: JobStatus,
    pub retry_count: u32,
    pub timestamp: Timestamp,
}

impl JobEvent {
    pub fn for_job(job: &Job, previous: Option<JobStatus>) -> Self {
        Self {
            job_id: job.id.clone(),
            user_id: job.user_id,
            kind: job.payload.kind().to_string(),
            previous,
            status: job.status,
            retry_count: job.retry_count,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// JobEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for [`JobEvent`]s.
///
/// Slow receivers that fall more than the channel capacity behind observe
/// `RecvError::Lagged` and lose the oldest events.
#[derive(Debug)]
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; dropped silently when there are none.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
