//! Shared fixtures for the worker integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use careerline_core::types::DbId;
use careerline_queue::{
    ApplicationSubmission, BackendKind, BrokerQueue, Job, JobPayload, JobQueue, JobResult,
    JobStatus, ListQueue, MemoryBroker, MemoryStore, QueueConfig, ResumeGeneration,
    StatusUpdate,
};
use careerline_worker::callback::{ArtifactUploader, CallbackError};
use careerline_worker::handler::{Artifact, HandlerError, JobHandler, JobOutput};
use careerline_worker::runner::Runner;

pub const NAMESPACE: &str = "worker-test";
pub const POLL: Duration = Duration::from_millis(200);
pub const RESUME_ID: DbId = 500;

// ---------------------------------------------------------------------------
// Jobs and queues
// ---------------------------------------------------------------------------

pub fn resume_job() -> Job {
    Job::new(
        1,
        JobPayload::ResumeGeneration(ResumeGeneration {
            job_application_id: 10,
            job_description: "Rust engineer".into(),
            language: "en".into(),
            template: None,
        }),
    )
}

pub fn application_job() -> Job {
    Job::new(
        1,
        JobPayload::JobApplication(ApplicationSubmission {
            job_application_id: 10,
            company: "Acme".into(),
            title: "Backend Engineer".into(),
            url: "https://jobs.acme.test/42".into(),
            website: None,
        }),
    )
}

pub fn list_queue() -> Arc<ListQueue> {
    let config = QueueConfig::new(BackendKind::Redis, NAMESPACE);
    Arc::new(ListQueue::new(Arc::new(MemoryStore::new()), &config))
}

pub async fn broker_queue() -> (MemoryBroker, Arc<BrokerQueue>) {
    let broker = MemoryBroker::new();
    let config = QueueConfig::new(BackendKind::Amqp, NAMESPACE);
    let queue = BrokerQueue::declare(Arc::new(broker.clone()), &config)
        .await
        .expect("declare topology");
    (broker, Arc::new(queue))
}

// ---------------------------------------------------------------------------
// Handler double
// ---------------------------------------------------------------------------

/// Returns scripted outcomes in order, then succeeds with empty details.
#[derive(Default)]
pub struct ScriptedHandler {
    outcomes: Mutex<VecDeque<Result<JobOutput, HandlerError>>>,
    calls: AtomicUsize,
}

impl ScriptedHandler {
    pub fn new(outcomes: Vec<Result<JobOutput, HandlerError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for ScriptedHandler {
    async fn handle(&self, _job: &Job) -> Result<JobOutput, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(JobOutput::Details(serde_json::Value::Null)))
    }
}

pub fn artifact() -> JobOutput {
    JobOutput::Artifact(Artifact {
        file_name: "cv.pdf".into(),
        data: b"%PDF-1.7".to_vec(),
        title: Some("Acme".into()),
        tags: vec!["rust".into()],
    })
}

pub fn transient(msg: &str) -> Result<JobOutput, HandlerError> {
    Err(HandlerError::Transient(msg.into()))
}

pub fn permanent(msg: &str) -> Result<JobOutput, HandlerError> {
    Err(HandlerError::Permanent(msg.into()))
}

// ---------------------------------------------------------------------------
// Uploader double
// ---------------------------------------------------------------------------

/// Stands in for the API: completes the job on the queue like the
/// completion endpoint does, or answers with a fixed HTTP status.
pub struct FakeApi {
    queue: Option<Arc<dyn JobQueue>>,
    fail_status: Option<u16>,
    uploads: Mutex<Vec<(String, Artifact)>>,
}

impl FakeApi {
    pub fn completing(queue: Arc<dyn JobQueue>) -> Arc<Self> {
        Arc::new(Self {
            queue: Some(queue),
            fail_status: None,
            uploads: Mutex::default(),
        })
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Arc::new(Self {
            queue: None,
            fail_status: Some(status),
            uploads: Mutex::default(),
        })
    }

    pub fn uploads(&self) -> Vec<(String, Artifact)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactUploader for FakeApi {
    async fn upload(&self, job: &Job, artifact: Artifact) -> Result<DbId, CallbackError> {
        self.uploads
            .lock()
            .unwrap()
            .push((job.id.clone(), artifact.clone()));

        if let Some(status) = self.fail_status {
            return Err(CallbackError::HttpStatus {
                status,
                body: String::new(),
            });
        }
        if let Some(queue) = &self.queue {
            let result = JobResult {
                file_name: Some(artifact.file_name),
                resume_id: Some(RESUME_ID),
                ..JobResult::default()
            };
            queue
                .update_job_status(
                    &job.id,
                    StatusUpdate::new(JobStatus::Completed).with_result(result),
                )
                .await
                .unwrap();
        }
        Ok(RESUME_ID)
    }
}

pub fn runner(
    queue: Arc<dyn JobQueue>,
    handler: Arc<ScriptedHandler>,
    api: Arc<FakeApi>,
) -> Runner {
    Runner::new(queue, handler, api).with_poll_timeout(Duration::from_millis(50))
}
