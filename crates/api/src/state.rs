use std::sync::Arc;

use careerline_core::storage::FileStorage;
use careerline_queue::JobQueue;

use crate::background::resume_links::LinkOutbox;
use crate::config::ServerConfig;
use crate::services::{JobApplicationService, ResumeService};

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every field is an `Arc` or a channel handle.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (JWT, internal API key digest, storage root).
    pub config: Arc<ServerConfig>,
    /// Queue for resume-generation jobs. Must keep job records.
    pub resume_queue: Arc<dyn JobQueue>,
    /// Queue for automated application submissions.
    pub application_queue: Arc<dyn JobQueue>,
    pub applications: Arc<dyn JobApplicationService>,
    pub resumes: Arc<dyn ResumeService>,
    /// Where uploaded resume artifacts are persisted.
    pub storage: Arc<dyn FileStorage>,
    /// Retry outbox for resume links that failed inline.
    pub link_outbox: LinkOutbox,
}
