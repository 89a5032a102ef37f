use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Backend behind each job queue.
    pub queues: QueueBackends,
}

#[derive(Serialize)]
pub struct QueueBackends {
    pub resume: &'static str,
    pub application: &'static str,
}

/// GET /health -- liveness plus the configured queue backends.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        queues: QueueBackends {
            resume: state.resume_queue.backend_name(),
            application: state.application_queue.backend_name(),
        },
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
