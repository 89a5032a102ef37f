//! Job record and lifecycle state machine.
//!
//! ```text
//! pending ──► processing ──► completed
//!    │            │
//!    │ (cancel)   ├──► failed ──► retrying ──► processing ...
//!    ▼            │       │
//!  failed ◄───────┘       └──► dead_letter   (retry budget exhausted)
//! ```
//!
//! `completed`, `dead_letter` and a cancelled `failed` are terminal: status
//! writes against them are ignored. Only an explicit manual retry (from
//! `failed` or `dead_letter`) brings a job back to `pending`.

use std::fmt;

use careerline_core::types::{DbId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{QueueError, QueueResult};

/// Retry budget applied when the enqueuer does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
    DeadLetter,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Whether a worker may move a job from `self` to `next`.
    ///
    /// Self-transitions are allowed so callers can attach fields (error,
    /// result, retry count) without changing state. Dead-lettering is
    /// reachable from every non-terminal state because an exhausted retry
    /// budget must never be silently ignored.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        if next == DeadLetter {
            return !matches!(self, Completed | DeadLetter);
        }
        matches!(
            (self, next),
            (Pending, Pending | Processing | Failed)
                | (Processing, Processing | Completed | Failed)
                | (Failed, Failed | Retrying)
                | (Retrying, Retrying | Processing)
        )
    }

    /// Statuses a job can be dequeued from.
    pub fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status name that is not one of [`JobStatus`]'s wire names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown job status '{0}'")]
pub struct UnknownStatus(pub String);

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            "dead_letter" => Ok(Self::DeadLetter),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors recorded on the job
// ---------------------------------------------------------------------------

/// Classification of the last failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Cancelled by the owner. Never retried automatically.
    Cancelled,
    /// Temporary failure (network, target site down); worth retrying.
    Transient,
    /// The task can never succeed with this payload.
    Permanent,
    /// The worker gave up waiting on the task.
    Timeout,
    /// Failure inside the platform itself (enqueue, storage).
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub kind: ErrorKind,
    pub at: Timestamp,
}

// ---------------------------------------------------------------------------
// Payload and result
// ---------------------------------------------------------------------------

/// Fields needed by the browser-automation worker to submit an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub job_application_id: DbId,
    pub company: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Fields needed by the document worker to render a tailored resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeGeneration {
    pub job_application_id: DbId,
    pub job_description: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Kind-specific work description. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    JobApplication(ApplicationSubmission),
    ResumeGeneration(ResumeGeneration),
}

impl JobPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobApplication(_) => "job_application",
            Self::ResumeGeneration(_) => "resume_generation",
        }
    }

    /// The job application this work originates from.
    pub fn job_application_id(&self) -> DbId {
        match self {
            Self::JobApplication(p) => p.job_application_id,
            Self::ResumeGeneration(p) => p.job_application_id,
        }
    }
}

/// Output reported by the worker once the job completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_id: Option<DbId>,
    /// Free-form worker output (e.g. confirmation number of a submission).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque identifier; assigned at enqueue when empty.
    #[serde(default)]
    pub id: String,
    pub user_id: DbId,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub retry_count: u32,
    /// Retry budget. `None` until enqueue applies the queue's default;
    /// `Some(0)` means a single attempt.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Bumped on every write; used for optimistic concurrency.
    #[serde(default)]
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// What [`Job::apply`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The record changed and must be written back.
    Changed { previous: JobStatus },
    /// The job was already terminal; the update was discarded.
    Ignored,
}

impl Job {
    /// A new, not-yet-enqueued job for `user_id`.
    pub fn new(user_id: DbId, payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            user_id,
            payload,
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: None,
            last_error: None,
            result: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// The effective retry budget.
    pub fn retry_budget(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Whether the last failure was an owner cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.status == JobStatus::Failed
            && matches!(&self.last_error, Some(e) if e.kind == ErrorKind::Cancelled)
    }

    /// Terminal jobs reject every status write except a manual retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::DeadLetter) || self.is_cancelled()
    }

    /// Stamp the fields every backend sets at enqueue time.
    ///
    /// Assigns an id when absent, resets the status to `pending`, applies
    /// `default_max_retries` when no budget was set and starts the version
    /// counter.
    pub fn prepare_for_enqueue(&mut self, default_max_retries: u32) {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        let budget = *self.max_retries.get_or_insert(default_max_retries);
        let now = Utc::now();
        self.status = JobStatus::Pending;
        self.retry_count = self.retry_count.min(budget);
        self.created_at = now;
        self.updated_at = now;
        self.version = 1;
    }

    /// Merge a status update into the record.
    ///
    /// Only the optional fields present in `update` are touched. Moving to
    /// `retrying` without an explicit count bumps `retry_count`; a count past
    /// `max_retries` forces `dead_letter` and is clamped to the budget.
    pub fn apply(&mut self, update: StatusUpdate) -> QueueResult<Applied> {
        if self.is_terminal() {
            return Ok(Applied::Ignored);
        }

        let budget = self.retry_budget();
        let mut target = update.status;
        let mut retry_count = update.retry_count.unwrap_or(self.retry_count);
        if target == JobStatus::Retrying && update.retry_count.is_none() {
            retry_count = self.retry_count.saturating_add(1);
        }
        if retry_count > budget {
            target = JobStatus::DeadLetter;
            retry_count = budget;
        }

        if !self.status.can_transition_to(target) {
            return Err(QueueError::InvalidStateTransition(format!(
                "cannot move job {} from {} to {target}",
                self.id, self.status
            )));
        }

        let previous = self.status;
        let now = Utc::now();
        self.status = target;
        self.retry_count = retry_count;
        if let Some(message) = update.error_message {
            self.last_error = Some(JobError {
                message,
                kind: update.error_kind.unwrap_or(ErrorKind::Transient),
                at: now,
            });
        } else if let (Some(kind), Some(error)) = (update.error_kind, self.last_error.as_mut()) {
            error.kind = kind;
            error.at = now;
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        self.touch(now);
        Ok(Applied::Changed { previous })
    }

    /// Owner cancellation: `pending`/`processing` → cancelled `failed`.
    pub fn cancel(&mut self) -> QueueResult<JobStatus> {
        if !matches!(self.status, JobStatus::Pending | JobStatus::Processing) {
            return Err(QueueError::InvalidStateTransition(format!(
                "job {} is {} and can only be cancelled while pending or processing",
                self.id, self.status
            )));
        }
        let previous = self.status;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.last_error = Some(JobError {
            message: "Cancelled by user".into(),
            kind: ErrorKind::Cancelled,
            at: now,
        });
        self.touch(now);
        Ok(previous)
    }

    /// Manual retry: `failed`/`dead_letter` → fresh `pending`.
    ///
    /// Clears the retry counter, the error fields and any stale result.
    pub fn reset_for_retry(&mut self) -> QueueResult<JobStatus> {
        if !matches!(self.status, JobStatus::Failed | JobStatus::DeadLetter) {
            return Err(QueueError::InvalidStateTransition(format!(
                "job {} is {} and can only be retried after failing",
                self.id, self.status
            )));
        }
        let previous = self.status;
        self.status = JobStatus::Pending;
        self.retry_count = 0;
        self.last_error = None;
        self.result = None;
        self.touch(Utc::now());
        Ok(previous)
    }

    /// Move a claimable job to `processing` after a dequeue.
    pub fn claim(&mut self) -> QueueResult<JobStatus> {
        if !self.status.is_claimable() {
            return Err(QueueError::InvalidStateTransition(format!(
                "job {} is {} and cannot be claimed",
                self.id, self.status
            )));
        }
        let previous = self.status;
        self.status = JobStatus::Processing;
        self.touch(Utc::now());
        Ok(previous)
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
        self.version += 1;
    }
}

// ---------------------------------------------------------------------------
// StatusUpdate
// ---------------------------------------------------------------------------

/// Partial update applied by `update_job_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub retry_count: Option<u32>,
    pub result: Option<JobResult>,
}

impl StatusUpdate {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error_message: None,
            error_kind: None,
            retry_count: None,
            result: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>, kind: ErrorKind) -> Self {
        self.error_message = Some(message.into());
        self.error_kind = Some(kind);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_result(mut self, result: JobResult) -> Self {
        self.result = Some(result);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
