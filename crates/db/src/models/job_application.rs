//! Job application entity: a posting the user is tracking or applying to.

use careerline_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `job_applications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobApplication {
    pub id: DbId,
    pub user_id: DbId,
    pub company: String,
    pub title: String,
    pub url: String,
    pub website: Option<String>,
    pub job_description: Option<String>,
    pub status_id: StatusId,
    /// Resume generated for (or attached to) this application.
    pub resume_id: Option<DbId>,
    pub resume_generation_status_id: Option<StatusId>,
    pub resume_generation_job_id: Option<String>,
    pub resume_generation_error: Option<String>,
    pub submission_status_id: Option<StatusId>,
    pub submission_job_id: Option<String>,
    pub submission_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobApplication {
    /// Description handed to the resume generator; falls back to the
    /// posting's title and company when none was captured.
    pub fn description_for_generation(&self) -> String {
        match self.job_description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => format!("{} at {}", self.title, self.company),
        }
    }
}

/// Background task tracked on an application row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationTask {
    ResumeGeneration,
    Submission,
}

impl ApplicationTask {
    /// `(status, job id, error)` column names for this task.
    pub(crate) fn columns(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::ResumeGeneration => (
                "resume_generation_status_id",
                "resume_generation_job_id",
                "resume_generation_error",
            ),
            Self::Submission => (
                "submission_status_id",
                "submission_job_id",
                "submission_error",
            ),
        }
    }
}
