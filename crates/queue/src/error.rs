use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// The queue contract's error taxonomy.
///
/// Backend-specific failures (Redis, AMQP) are translated into these variants
/// at the backend boundary so callers never depend on a particular backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The backend could not be reached or refused the command.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// No record for this id (never existed or expired).
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The requested transition is not allowed from the job's current state.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The operation is not meaningful for this backend.
    #[error("Operation '{operation}' is not supported by the {backend} backend")]
    UnsupportedOperation {
        operation: &'static str,
        backend: &'static str,
    },

    /// A stored or delivered record could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Optimistic writes kept losing to concurrent writers.
    #[error("Job {0} was modified concurrently; retry the request")]
    ConcurrentModification(String),
}

impl QueueError {
    pub(crate) fn unsupported(operation: &'static str, backend: &'static str) -> Self {
        Self::UnsupportedOperation { operation, backend }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
