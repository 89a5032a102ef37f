//! Handlers for job application automation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use careerline_core::error::CoreError;
use careerline_core::types::DbId;
use careerline_db::models::job_application::ApplicationTask;
use careerline_queue::{ApplicationSubmission, Job, JobPayload};

use crate::error::AppResult;
use crate::handlers::enqueue_for_application;
use crate::handlers::resumes::JobAccepted;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// POST /job-applications/{id}/submit
///
/// Hand the application to the submission worker. Returns 202 with the job
/// id; the application row tracks the submission status.
pub async fn submit_application(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(application_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let application = state
        .applications
        .find_for_user(application_id, auth.user_id)
        .await?
        .ok_or_else(|| CoreError::not_found("JobApplication", application_id))?;

    let job = Job::new(
        auth.user_id,
        JobPayload::JobApplication(ApplicationSubmission {
            job_application_id: application.id,
            company: application.company,
            title: application.title,
            url: application.url,
            website: application.website,
        }),
    );

    let job = enqueue_for_application(
        state.application_queue.as_ref(),
        state.applications.as_ref(),
        application.id,
        ApplicationTask::Submission,
        job,
    )
    .await?;

    tracing::info!(
        job_id = %job.id,
        user_id = auth.user_id,
        job_application_id = application.id,
        backend = state.application_queue.backend_name(),
        "Application submission enqueued",
    );

    Ok((StatusCode::ACCEPTED, Json(JobAccepted::from(&job))))
}
