//! Handlers for resume generation jobs.
//!
//! All endpoints require authentication via [`AuthUser`] and only ever
//! expose jobs owned by the caller.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use careerline_core::error::CoreError;
use careerline_core::language::{normalize_language, DEFAULT_LANGUAGE};
use careerline_core::types::{DbId, Timestamp};
use careerline_db::models::job_application::ApplicationTask;
use careerline_queue::{Job, JobPayload, JobQueue, JobResult, QueueError, ResumeGeneration};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::enqueue_for_application;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResumeRequest {
    pub job_application_id: DbId,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

/// Body of a 202 response for an accepted job.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub status: &'static str,
}

impl From<&Job> for JobAccepted {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status.as_str(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorView {
    pub message: String,
    pub kind: &'static str,
    pub at: Timestamp,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResultView {
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub tags: Vec<String>,
    pub resume_id: Option<DbId>,
}

impl From<JobResult> for JobResultView {
    fn from(result: JobResult) -> Self {
        Self {
            file_path: result.file_path,
            file_name: result.file_name,
            file_size: result.file_size,
            tags: result.tags,
            resume_id: result.resume_id,
        }
    }
}

/// Job status payload returned to the owner.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub kind: &'static str,
    pub job_application_id: DbId,
    pub status: &'static str,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<JobErrorView>,
    pub result: Option<JobResultView>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Job> for JobStatusView {
    fn from(job: Job) -> Self {
        Self {
            kind: job.payload.kind(),
            job_application_id: job.payload.job_application_id(),
            status: job.status.as_str(),
            retry_count: job.retry_count,
            max_retries: job.retry_budget(),
            error: job.last_error.map(|e| JobErrorView {
                message: e.message,
                kind: e.kind.as_str(),
                at: e.at,
            }),
            result: job.result.map(JobResultView::from),
            created_at: job.created_at,
            updated_at: job.updated_at,
            job_id: job.id,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID and verify the caller owns it.
///
/// Returns `NotFound` if the job does not exist or expired, `Forbidden` if
/// the caller is not the owner. `action` is used in the error message
/// (e.g. "view", "cancel", "retry").
async fn find_and_authorize(
    queue: &dyn JobQueue,
    job_id: &str,
    auth: &AuthUser,
    action: &str,
) -> AppResult<Job> {
    let job = queue.get_job(job_id).await.map_err(|e| match e {
        QueueError::JobNotFound(_) => AppError::Core(CoreError::not_found("Job", job_id)),
        other => other.into(),
    })?;

    if job.user_id != auth.user_id {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Cannot {action} another user's job"
        ))));
    }

    Ok(job)
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

/// POST /resumes/generate
///
/// Enqueue a resume generation job for one of the caller's applications.
/// Returns 202 with the job id; progress is read from `GET /resumes/jobs/{id}`.
pub async fn generate_resume(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<GenerateResumeRequest>,
) -> AppResult<impl IntoResponse> {
    let language = normalize_language(input.language.as_deref().unwrap_or(DEFAULT_LANGUAGE))?;

    let application = state
        .applications
        .find_for_user(input.job_application_id, auth.user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("JobApplication", input.job_application_id))?;

    let job = Job::new(
        auth.user_id,
        JobPayload::ResumeGeneration(ResumeGeneration {
            job_application_id: application.id,
            job_description: application.description_for_generation(),
            language,
            template: input.template.filter(|t| !t.trim().is_empty()),
        }),
    );

    let job = enqueue_for_application(
        state.resume_queue.as_ref(),
        state.applications.as_ref(),
        application.id,
        ApplicationTask::ResumeGeneration,
        job,
    )
    .await?;

    tracing::info!(
        job_id = %job.id,
        user_id = auth.user_id,
        job_application_id = application.id,
        "Resume generation enqueued",
    );

    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /resumes/jobs/{id}
pub async fn get_job_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(state.resume_queue.as_ref(), &job_id, &auth, "view").await?;
    Ok(Json(JobStatusView::from(job)))
}

// ---------------------------------------------------------------------------
// Retry / cancel
// ---------------------------------------------------------------------------

/// POST /resumes/jobs/{id}/retry
///
/// Only `failed` and `dead_letter` jobs can be retried; anything else is a
/// 400 carrying the transition error.
pub async fn retry_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    find_and_authorize(state.resume_queue.as_ref(), &job_id, &auth, "retry").await?;
    let job = state.resume_queue.retry_job(&job_id).await?;

    tracing::info!(job_id = %job_id, user_id = auth.user_id, "Resume job retried");
    Ok(Json(JobStatusView::from(job)))
}

/// POST /resumes/jobs/{id}/cancel
///
/// Cooperative: a worker already running the job is not interrupted, but
/// whatever it reports afterwards is discarded.
pub async fn cancel_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    find_and_authorize(state.resume_queue.as_ref(), &job_id, &auth, "cancel").await?;
    let job = state.resume_queue.cancel_job(&job_id).await?;

    tracing::info!(job_id = %job_id, user_id = auth.user_id, "Resume job cancelled");
    Ok(Json(JobStatusView::from(job)))
}
