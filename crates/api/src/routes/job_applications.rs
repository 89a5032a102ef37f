use axum::routing::post;
use axum::Router;

use crate::handlers::job_applications;
use crate::state::AppState;

/// Routes mounted at `/job-applications`.
///
/// ```text
/// POST   /{id}/submit           -> submit_application
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/submit", post(job_applications::submit_application))
}
