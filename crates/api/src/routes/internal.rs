//! Worker-facing routes. Authenticated by the internal API key, not JWT.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use careerline_core::storage::MAX_ARTIFACT_BYTES;

use crate::handlers::internal;
use crate::state::AppState;

/// Multipart overhead allowed on top of the artifact itself.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Routes mounted at `/internal`.
///
/// ```text
/// POST   /resumes/complete      -> complete_resume
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/resumes/complete", post(internal::complete_resume))
        .layer(DefaultBodyLimit::max(MAX_ARTIFACT_BYTES + FORM_OVERHEAD_BYTES))
}
