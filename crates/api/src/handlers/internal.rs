//! Internal endpoints called by workers, authenticated by [`InternalCaller`].

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use careerline_core::error::CoreError;
use careerline_core::storage::FALLBACK_FILE_NAME;
use careerline_core::types::DbId;
use careerline_db::models::job_application::ApplicationTask;
use careerline_db::models::resume::CreateResume;
use careerline_db::models::status::ProcessingStatus;
use careerline_queue::{JobPayload, JobResult, JobStatus, QueueError, StatusUpdate};
use serde::Serialize;

use crate::background::resume_links::PendingLink;
use crate::error::{AppError, AppResult};
use crate::middleware::api_key::InternalCaller;
use crate::state::AppState;

/// Title given to a generated resume when the worker sends none.
const DEFAULT_RESUME_TITLE: &str = "Generated resume";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub resume_id: DbId,
}

/// Fields of the completion form, collected from the multipart stream.
#[derive(Debug, Default)]
struct CompletionForm {
    job_id: Option<String>,
    job_application_id: Option<DbId>,
    user_id: Option<DbId>,
    title: Option<String>,
    tags: Vec<String>,
    file: Option<(String, Vec<u8>)>,
}

impl CompletionForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or(FALLBACK_FILE_NAME).to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                form.file = Some((file_name, data.to_vec()));
                continue;
            }

            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            match name.as_str() {
                "jobId" => form.job_id = Some(text.trim().to_string()),
                "jobApplicationId" => form.job_application_id = Some(parse_id(&name, &text)?),
                "userId" => form.user_id = Some(parse_id(&name, &text)?),
                "title" => form.title = Some(text.trim().to_string()).filter(|t| !t.is_empty()),
                "tags" => form.tags = parse_tags(&text),
                _ => {} // ignore unknown fields
            }
        }

        Ok(form)
    }
}

fn parse_id(field: &str, raw: &str) -> AppResult<DbId> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Field '{field}' must be an integer id")))
}

/// Comma-separated tags, trimmed, empties dropped.
fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn missing(field: &str) -> AppError {
    AppError::BadRequest(format!("Missing required '{field}' field"))
}

/// The job moved on while the resume was being created; the resume stays.
fn orphaned(job_id: &str, resume_id: DbId, state: &str) -> AppError {
    tracing::warn!(
        job_id,
        resume_id,
        state,
        "Job left processing during completion; resume is orphaned",
    );
    AppError::Core(CoreError::Conflict(format!(
        "Job {job_id} changed state during completion"
    )))
}

/// POST /internal/resumes/complete
///
/// Completion callback for resume generation. Stores the uploaded file,
/// creates the resume, links it to the application and completes the job.
///
/// Nothing is persisted unless the job is `processing`: a terminal job gets
/// 409, any other state 400. Resume creation and linking are separate
/// writes. A failed link does not fail the request: the resume exists, and
/// the link is handed to the outbox for retry.
pub async fn complete_resume(
    _caller: InternalCaller,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = CompletionForm::read(multipart).await?;
    let job_id = form
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| missing("jobId"))?;
    let job_application_id = form
        .job_application_id
        .ok_or_else(|| missing("jobApplicationId"))?;
    let user_id = form.user_id.ok_or_else(|| missing("userId"))?;
    let (file_name, data) = form.file.ok_or_else(|| missing("file"))?;

    let job = state.resume_queue.get_job(&job_id).await.map_err(|e| match e {
        QueueError::JobNotFound(_) => AppError::Core(CoreError::not_found("Job", &job_id)),
        other => other.into(),
    })?;

    if job.user_id != user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Job belongs to a different user".into(),
        )));
    }
    match &job.payload {
        JobPayload::ResumeGeneration(p) if p.job_application_id == job_application_id => {}
        JobPayload::ResumeGeneration(_) => {
            return Err(AppError::BadRequest(
                "jobApplicationId does not match the job".into(),
            ))
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "Job {job_id} is a {} job, not resume generation",
                other.kind()
            )))
        }
    }
    if job.is_terminal() {
        tracing::warn!(
            job_id = %job_id,
            status = %job.status,
            "Discarding completion for terminal job",
        );
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} is already {}",
            job.status
        ))));
    }
    if !job.status.can_transition_to(JobStatus::Completed) {
        tracing::warn!(
            job_id = %job_id,
            status = %job.status,
            "Rejecting completion for job that is not processing",
        );
        return Err(QueueError::InvalidStateTransition(format!(
            "cannot complete job {job_id} while it is {}",
            job.status
        ))
        .into());
    }

    let stored = state.storage.save(user_id, &file_name, &data).await?;

    let resume = state
        .resumes
        .create(CreateResume {
            user_id,
            job_application_id: Some(job_application_id),
            title: form.title.unwrap_or_else(|| DEFAULT_RESUME_TITLE.to_string()),
            file_path: stored.path.clone(),
            file_name: stored.file_name.clone(),
            file_size: stored.size as i64,
            tags: form.tags.clone(),
        })
        .await?;

    // Best-effort: the resume exists whether or not the link lands.
    if let Err(err) = state
        .applications
        .link_resume(job_application_id, user_id, resume.id)
        .await
    {
        tracing::warn!(
            job_id = %job_id,
            job_application_id,
            resume_id = resume.id,
            error = %err,
            "Resume link failed, deferring to outbox",
        );
        state.link_outbox.submit(PendingLink {
            job_id: job_id.clone(),
            job_application_id,
            user_id,
            resume_id: resume.id,
        });
    }

    let result = JobResult {
        file_path: Some(stored.path),
        file_name: Some(stored.file_name),
        file_size: Some(stored.size),
        tags: form.tags,
        resume_id: Some(resume.id),
        details: None,
    };
    let completed = state
        .resume_queue
        .update_job_status(
            &job_id,
            StatusUpdate::new(JobStatus::Completed).with_result(result),
        )
        .await;
    // The job may have been cancelled or failed while the file was stored.
    let job = match completed {
        Ok(job) if job.status == JobStatus::Completed => job,
        Ok(job) => return Err(orphaned(&job_id, resume.id, job.status.as_str())),
        Err(QueueError::InvalidStateTransition(reason)) => {
            return Err(orphaned(&job_id, resume.id, &reason))
        }
        Err(err) => return Err(err.into()),
    };

    if let Err(err) = state
        .applications
        .set_task_status(
            job_application_id,
            ApplicationTask::ResumeGeneration,
            ProcessingStatus::Completed,
            Some(&job_id),
            None,
        )
        .await
    {
        tracing::warn!(job_id = %job_id, error = %err, "Failed to record generation status");
    }

    tracing::info!(
        job_id = %job_id,
        user_id,
        resume_id = resume.id,
        status = %job.status,
        "Resume generation completed",
    );

    Ok((StatusCode::OK, Json(CompletionResponse { resume_id: resume.id })))
}
