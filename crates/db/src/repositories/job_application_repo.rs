//! Repository for the `job_applications` table.
//!
//! Only the operations the job pipeline needs: owner-scoped lookup,
//! background-task status bookkeeping and resume linking.

use careerline_core::types::DbId;
use sqlx::PgPool;

use crate::models::job_application::{ApplicationTask, JobApplication};
use crate::models::status::ProcessingStatus;

/// Column list for `job_applications` queries.
const COLUMNS: &str = "\
    id, user_id, company, title, url, website, job_description, status_id, \
    resume_id, resume_generation_status_id, resume_generation_job_id, resume_generation_error, \
    submission_status_id, submission_job_id, submission_error, \
    created_at, updated_at";

pub struct JobApplicationRepo;

impl JobApplicationRepo {
    /// Find an application owned by `user_id`. Returns `None` for other
    /// users' applications as well as missing ones.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<JobApplication>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_applications WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, JobApplication>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Record progress of a background task on the application.
    ///
    /// `job_id` and `error` replace the stored values; pass `None` to clear.
    pub async fn set_task_status(
        pool: &PgPool,
        id: DbId,
        task: ApplicationTask,
        status: ProcessingStatus,
        job_id: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let (status_col, job_col, error_col) = task.columns();
        let query = format!(
            "UPDATE job_applications \
             SET {status_col} = $2, {job_col} = COALESCE($3, {job_col}), {error_col} = $4, \
                 updated_at = NOW() \
             WHERE id = $1"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(status.id())
            .bind(job_id)
            .bind(error)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point the application at `resume_id` and mark generation completed.
    pub async fn link_resume(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
        resume_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE job_applications \
             SET resume_id = $3, resume_generation_status_id = $4, \
                 resume_generation_error = NULL, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(resume_id)
        .bind(ProcessingStatus::Completed.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
