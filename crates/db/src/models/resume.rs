//! Resume entity: a stored resume document owned by a user.

use careerline_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `resumes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resume {
    pub id: DbId,
    pub user_id: DbId,
    /// Application this resume was generated for, if any.
    pub job_application_id: Option<DbId>,
    pub title: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub tags: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert DTO for a new resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResume {
    pub user_id: DbId,
    pub job_application_id: Option<DbId>,
    pub title: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub tags: Vec<String>,
}
