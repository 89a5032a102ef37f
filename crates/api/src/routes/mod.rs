pub mod health;
pub mod internal;
pub mod job_applications;
pub mod resumes;

use axum::Router;

use crate::state::AppState;

/// Build the route tree (everything except `/health`).
///
/// Route hierarchy:
///
/// ```text
/// /resumes/generate                      enqueue generation (POST)
/// /resumes/jobs/{id}                     job status (GET)
/// /resumes/jobs/{id}/retry               manual retry (POST)
/// /resumes/jobs/{id}/cancel              cooperative cancel (POST)
///
/// /job-applications/{id}/submit          enqueue automated submission (POST)
///
/// /internal/resumes/complete             worker completion callback (POST, X-API-Key)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/resumes", resumes::router())
        .nest("/job-applications", job_applications::router())
        .nest("/internal", internal::router())
}
