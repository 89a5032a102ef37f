//! Domain collaborators the job handlers depend on.
//!
//! Handlers never touch the repositories directly; they go through these
//! traits so the job flow can run against Postgres in production and
//! against in-memory doubles in tests.

use async_trait::async_trait;
use careerline_core::error::CoreError;
use careerline_core::types::DbId;
use careerline_db::models::job_application::{ApplicationTask, JobApplication};
use careerline_db::models::resume::{CreateResume, Resume};
use careerline_db::models::status::ProcessingStatus;
use careerline_db::repositories::{JobApplicationRepo, ResumeRepo};
use careerline_db::DbPool;

use crate::error::AppResult;

/// Access to the job applications that jobs originate from.
#[async_trait]
pub trait JobApplicationService: Send + Sync {
    /// The application if it exists and belongs to `user_id`.
    async fn find_for_user(&self, id: DbId, user_id: DbId)
        -> AppResult<Option<JobApplication>>;

    /// Record the state of a background task on the application.
    async fn set_task_status(
        &self,
        id: DbId,
        task: ApplicationTask,
        status: ProcessingStatus,
        job_id: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()>;

    /// Attach a generated resume to the application.
    async fn link_resume(&self, id: DbId, user_id: DbId, resume_id: DbId) -> AppResult<()>;
}

/// Creation of resume entities from worker output.
#[async_trait]
pub trait ResumeService: Send + Sync {
    async fn create(&self, input: CreateResume) -> AppResult<Resume>;
}

// ---------------------------------------------------------------------------
// Postgres implementations
// ---------------------------------------------------------------------------

pub struct PgJobApplicationService {
    pool: DbPool,
}

impl PgJobApplicationService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobApplicationService for PgJobApplicationService {
    async fn find_for_user(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> AppResult<Option<JobApplication>> {
        Ok(JobApplicationRepo::find_for_user(&self.pool, id, user_id).await?)
    }

    async fn set_task_status(
        &self,
        id: DbId,
        task: ApplicationTask,
        status: ProcessingStatus,
        job_id: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        let updated =
            JobApplicationRepo::set_task_status(&self.pool, id, task, status, job_id, error)
                .await?;
        if !updated {
            return Err(CoreError::not_found("JobApplication", id).into());
        }
        Ok(())
    }

    async fn link_resume(&self, id: DbId, user_id: DbId, resume_id: DbId) -> AppResult<()> {
        let updated = JobApplicationRepo::link_resume(&self.pool, id, user_id, resume_id).await?;
        if !updated {
            return Err(CoreError::not_found("JobApplication", id).into());
        }
        Ok(())
    }
}

pub struct PgResumeService {
    pool: DbPool,
}

impl PgResumeService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeService for PgResumeService {
    async fn create(&self, input: CreateResume) -> AppResult<Resume> {
        Ok(ResumeRepo::create(&self.pool, &input).await?)
    }
}
