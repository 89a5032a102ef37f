//! Repository for the `resumes` table.

use careerline_core::types::DbId;
use sqlx::PgPool;

use crate::models::resume::{CreateResume, Resume};

/// Column list for `resumes` queries.
const COLUMNS: &str = "\
    id, user_id, job_application_id, title, file_path, file_name, file_size, tags, \
    created_at, updated_at";

pub struct ResumeRepo;

impl ResumeRepo {
    pub async fn create(pool: &PgPool, input: &CreateResume) -> Result<Resume, sqlx::Error> {
        let query = format!(
            "INSERT INTO resumes \
                 (user_id, job_application_id, title, file_path, file_name, file_size, tags) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Resume>(&query)
            .bind(input.user_id)
            .bind(input.job_application_id)
            .bind(&input.title)
            .bind(&input.file_path)
            .bind(&input.file_name)
            .bind(input.file_size)
            .bind(&input.tags)
            .fetch_one(pool)
            .await
    }

    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Resume>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM resumes WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Resume>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
