//! Route definitions for the `/resumes` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::resumes;
use crate::state::AppState;

/// Routes mounted at `/resumes`.
///
/// ```text
/// POST   /generate              -> generate_resume
/// GET    /jobs/{id}             -> get_job_status
/// POST   /jobs/{id}/retry       -> retry_job
/// POST   /jobs/{id}/cancel      -> cancel_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(resumes::generate_resume))
        .route("/jobs/{id}", get(resumes::get_job_status))
        .route("/jobs/{id}/retry", post(resumes::retry_job))
        .route("/jobs/{id}/cancel", post(resumes::cancel_job))
}
