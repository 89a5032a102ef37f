//! Shared fixtures for the API integration tests.
//!
//! The app runs against the real router and middleware stack, with the
//! Postgres-backed services swapped for in-memory doubles, the resume queue
//! on a [`ListQueue`] over [`MemoryStore`] and the application queue on a
//! [`BrokerQueue`] over [`MemoryBroker`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use careerline_api::auth::jwt::{issue_access_token, JwtConfig};
use careerline_api::background::resume_links::{LinkOutbox, PendingLink};
use careerline_api::config::ServerConfig;
use careerline_api::error::{AppError, AppResult};
use careerline_api::router::build_app_router;
use careerline_api::services::{JobApplicationService, ResumeService};
use careerline_api::state::AppState;
use careerline_core::api_keys::{hash_api_key, API_KEY_HEADER};
use careerline_core::error::CoreError;
use careerline_core::storage::LocalFileStorage;
use careerline_core::types::DbId;
use careerline_db::models::job_application::{ApplicationTask, JobApplication};
use careerline_db::models::resume::{CreateResume, Resume};
use careerline_db::models::status::{ApplicationStatus, ProcessingStatus};
use careerline_queue::{
    BackendKind, BrokerQueue, JobQueue, ListQueue, MemoryBroker, MemoryStore, QueueConfig,
};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const INTERNAL_API_KEY: &str = "test-internal-key";
pub const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";
pub const BOUNDARY: &str = "careerline-test-boundary";

// ---------------------------------------------------------------------------
// In-memory collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryApplications {
    rows: Mutex<HashMap<DbId, JobApplication>>,
    fail_links: AtomicBool,
}

impl InMemoryApplications {
    pub fn insert(&self, application: JobApplication) {
        self.rows.lock().unwrap().insert(application.id, application);
    }

    pub fn get(&self, id: DbId) -> JobApplication {
        self.rows.lock().unwrap()[&id].clone()
    }

    /// Make every `link_resume` call fail.
    pub fn fail_links(&self, fail: bool) {
        self.fail_links.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobApplicationService for InMemoryApplications {
    async fn find_for_user(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> AppResult<Option<JobApplication>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn set_task_status(
        &self,
        id: DbId,
        task: ApplicationTask,
        status: ProcessingStatus,
        job_id: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("JobApplication", id))?;
        let (status_field, job_field, error_field) = match task {
            ApplicationTask::ResumeGeneration => (
                &mut row.resume_generation_status_id,
                &mut row.resume_generation_job_id,
                &mut row.resume_generation_error,
            ),
            ApplicationTask::Submission => (
                &mut row.submission_status_id,
                &mut row.submission_job_id,
                &mut row.submission_error,
            ),
        };
        *status_field = Some(status.id());
        if let Some(job_id) = job_id {
            *job_field = Some(job_id.to_string());
        }
        *error_field = error.map(str::to_string);
        Ok(())
    }

    async fn link_resume(&self, id: DbId, user_id: DbId, resume_id: DbId) -> AppResult<()> {
        if self.fail_links.load(Ordering::SeqCst) {
            return Err(AppError::InternalError("link store offline".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&id).filter(|a| a.user_id == user_id) {
            Some(row) => {
                row.resume_id = Some(resume_id);
                Ok(())
            }
            None => Err(CoreError::not_found("JobApplication", id).into()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryResumes {
    rows: Mutex<Vec<Resume>>,
    next_id: AtomicI64,
    cancel_on_create: Mutex<Option<(Arc<ListQueue>, String)>>,
}

impl InMemoryResumes {
    pub fn all(&self) -> Vec<Resume> {
        self.rows.lock().unwrap().clone()
    }

    /// Cancel `job_id` on `queue` during the next `create`, as if the owner
    /// cancelled while the worker's upload was being stored.
    pub fn cancel_on_create(&self, queue: Arc<ListQueue>, job_id: &str) {
        *self.cancel_on_create.lock().unwrap() = Some((queue, job_id.to_string()));
    }
}

#[async_trait]
impl ResumeService for InMemoryResumes {
    async fn create(&self, input: CreateResume) -> AppResult<Resume> {
        let cancel = self.cancel_on_create.lock().unwrap().take();
        if let Some((queue, job_id)) = cancel {
            queue.cancel_job(&job_id).await.unwrap();
        }

        let now = chrono::Utc::now();
        let resume = Resume {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 100,
            user_id: input.user_id,
            job_application_id: input.job_application_id,
            title: input.title,
            file_path: input.file_path,
            file_name: input.file_name,
            file_size: input.file_size,
            tags: input.tags,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(resume.clone());
        Ok(resume)
    }
}

/// An application row owned by `user_id`.
pub fn application(id: DbId, user_id: DbId) -> JobApplication {
    let now = chrono::Utc::now();
    JobApplication {
        id,
        user_id,
        company: "Acme".into(),
        title: "Backend Engineer".into(),
        url: "https://jobs.acme.test/42".into(),
        website: Some("https://acme.test".into()),
        job_description: Some("Build async services in Rust".into()),
        status_id: ApplicationStatus::Draft.id(),
        resume_id: None,
        resume_generation_status_id: None,
        resume_generation_job_id: None,
        resume_generation_error: None,
        submission_status_id: None,
        submission_job_id: None,
        submission_error: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Test app
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub config: ServerConfig,
    pub applications: Arc<InMemoryApplications>,
    pub resumes: Arc<InMemoryResumes>,
    pub resume_store: Arc<MemoryStore>,
    pub resume_queue: Arc<ListQueue>,
    pub broker: MemoryBroker,
    pub application_queue: Arc<BrokerQueue>,
    pub link_receiver: mpsc::Receiver<PendingLink>,
    pub storage_dir: TempDir,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Bearer token for `user_id`.
    pub fn token(&self, user_id: DbId) -> String {
        issue_access_token(user_id, "user", &self.config.jwt).unwrap()
    }

    /// Number of files written under the storage root.
    pub fn stored_files(&self) -> usize {
        walk(self.storage_dir.path())
    }
}

fn walk(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() {
                        walk(&path)
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

pub fn test_config(storage_dir: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        storage_dir: storage_dir.to_string(),
        internal_api_key_hash: hash_api_key(INTERNAL_API_KEY),
        link_outbox_capacity: 8,
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
            issuer: None,
        },
    }
}

/// Build the full application router over in-memory collaborators.
pub async fn build_test_app() -> TestApp {
    let storage_dir = tempfile::tempdir().unwrap();
    let config = test_config(&storage_dir.path().to_string_lossy());

    let resume_store = Arc::new(MemoryStore::new());
    let resume_queue = Arc::new(ListQueue::new(
        resume_store.clone(),
        &QueueConfig::new(BackendKind::Redis, "resume"),
    ));

    let broker = MemoryBroker::new();
    let application_queue = Arc::new(
        BrokerQueue::declare(
            Arc::new(broker.clone()),
            &QueueConfig::new(BackendKind::Amqp, "application"),
        )
        .await
        .unwrap(),
    );

    let applications = Arc::new(InMemoryApplications::default());
    let resumes = Arc::new(InMemoryResumes::default());
    let (link_outbox, link_receiver) = LinkOutbox::channel(config.link_outbox_capacity);

    let state = AppState {
        config: Arc::new(config.clone()),
        resume_queue: resume_queue.clone(),
        application_queue: application_queue.clone(),
        applications: applications.clone(),
        resumes: resumes.clone(),
        storage: Arc::new(LocalFileStorage::new(storage_dir.path())),
        link_outbox,
    };

    TestApp {
        router: build_app_router(state, &config),
        config,
        applications,
        resumes,
        resume_store,
        resume_queue,
        broker,
        application_queue,
        link_receiver,
        storage_dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_empty(uri: &str, token: &str) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A `multipart/form-data` body under [`BOUNDARY`].
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.bytes
    }
}

/// Completion callback request; `api_key` of `None` omits the header.
pub fn completion_request(body: MultipartBody, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/internal/resumes/complete").header(
        "content-type",
        format!("multipart/form-data; boundary={BOUNDARY}"),
    );
    if let Some(key) = api_key {
        builder = builder.header(API_KEY_HEADER, key);
    }
    builder.body(Body::from(body.finish())).unwrap()
}

/// A complete, valid completion form for `job_id`.
pub fn completion_form(job_id: &str, job_application_id: DbId, user_id: DbId) -> MultipartBody {
    MultipartBody::default()
        .text("jobId", job_id)
        .text("jobApplicationId", &job_application_id.to_string())
        .text("userId", &user_id.to_string())
        .text("title", "Acme tailored")
        .text("tags", "rust, backend")
        .file("file", "cv.pdf", b"%PDF-1.7 test")
}
