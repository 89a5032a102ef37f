//! Client for the API's completion callback.

use std::time::Duration;

use async_trait::async_trait;
use careerline_core::api_keys::API_KEY_HEADER;
use careerline_core::types::DbId;
use careerline_queue::{Job, JobPayload};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::handler::Artifact;

/// Path of the resume completion endpoint, relative to the API base URL.
pub const COMPLETE_RESUME_PATH: &str = "/internal/resumes/complete";

/// HTTP request timeout for one upload.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The request never got a response (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-2xx status.
    #[error("Completion callback returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The job is not a resume generation job.
    #[error("Job {0} has no resume to upload")]
    NotResumeJob(String),
}

impl CallbackError {
    /// The API already holds a terminal status for the job; the upload
    /// was refused and must not be retried.
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::HttpStatus { status, .. } if *status == StatusCode::CONFLICT.as_u16())
    }

    /// Retrying the same upload cannot succeed.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Request(_) => false,
            Self::HttpStatus { status, .. } => (400..500).contains(status),
            Self::NotResumeJob(_) => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Uploader
// ---------------------------------------------------------------------------

/// Hands a finished resume back to the API.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Upload `artifact` for `job`; returns the created resume id.
    async fn upload(&self, job: &Job, artifact: Artifact) -> Result<DbId, CallbackError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResponse {
    resume_id: DbId,
}

/// Posts artifacts to `POST /internal/resumes/complete` with `X-API-Key`.
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(api_base_url: &str, api_key: impl Into<String>) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{COMPLETE_RESUME_PATH}", api_base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Multipart form the completion endpoint expects.
fn completion_form(job: &Job, job_application_id: DbId, artifact: Artifact) -> Form {
    let mut form = Form::new()
        .text("jobId", job.id.clone())
        .text("jobApplicationId", job_application_id.to_string())
        .text("userId", job.user_id.to_string());
    if let Some(title) = artifact.title {
        form = form.text("title", title);
    }
    if !artifact.tags.is_empty() {
        form = form.text("tags", artifact.tags.join(","));
    }
    form.part("file", Part::bytes(artifact.data).file_name(artifact.file_name))
}

#[async_trait]
impl ArtifactUploader for CompletionClient {
    async fn upload(&self, job: &Job, artifact: Artifact) -> Result<DbId, CallbackError> {
        let job_application_id = match &job.payload {
            JobPayload::ResumeGeneration(p) => p.job_application_id,
            JobPayload::JobApplication(_) => return Err(CallbackError::NotResumeJob(job.id.clone())),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(completion_form(job, job_application_id, artifact))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallbackError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: CompletionResponse = response.json().await?;
        Ok(body.resume_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
