use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use careerline_core::error::CoreError;
use careerline_queue::QueueError;
use serde_json::json;

/// Everything a handler can fail with. Rendered as `{"error", "code"}` JSON;
/// internal details are logged, not returned.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            AppError::Queue(err) => classify_queue_error(err),

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

/// Backend outages are 503 so clients know to try again; Redis/AMQP
/// messages stay in the logs.
fn classify_queue_error(err: &QueueError) -> (StatusCode, &'static str, String) {
    match err {
        QueueError::QueueUnavailable(detail) => {
            tracing::error!(error = %detail, "Job queue unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_UNAVAILABLE",
                "The job queue is temporarily unavailable".to_string(),
            )
        }
        QueueError::JobNotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Job with id {id} not found"),
        ),
        QueueError::InvalidStateTransition(reason) => (
            StatusCode::BAD_REQUEST,
            "INVALID_STATE_TRANSITION",
            reason.clone(),
        ),
        QueueError::UnsupportedOperation { .. } => (
            StatusCode::NOT_IMPLEMENTED,
            "UNSUPPORTED_OPERATION",
            err.to_string(),
        ),
        QueueError::ConcurrentModification(_) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        QueueError::Serialization(detail) => {
            tracing::error!(error = %detail, "Job serialization failed");
            internal()
        }
    }
}

fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}
