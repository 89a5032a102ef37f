pub mod internal;
pub mod job_applications;
pub mod resumes;

use careerline_core::types::DbId;
use careerline_db::models::job_application::ApplicationTask;
use careerline_db::models::status::ProcessingStatus;
use careerline_queue::{Job, JobQueue};

use crate::error::AppResult;
use crate::services::JobApplicationService;

/// Enqueue `job` on behalf of an application, tracking it on the row.
///
/// The application's task status is set to `processing` first. If the
/// enqueue fails the status is rolled back to `failed` with the error
/// attached and the enqueue error is returned.
pub(crate) async fn enqueue_for_application(
    queue: &dyn JobQueue,
    applications: &dyn JobApplicationService,
    application_id: DbId,
    task: ApplicationTask,
    mut job: Job,
) -> AppResult<Job> {
    // Assigned up front so the row can reference the job before it exists.
    job.id = uuid::Uuid::new_v4().to_string();

    applications
        .set_task_status(
            application_id,
            task,
            ProcessingStatus::Processing,
            Some(&job.id),
            None,
        )
        .await?;

    match queue.enqueue_job(job.clone()).await {
        Ok(job) => Ok(job),
        Err(err) => {
            tracing::error!(
                job_id = %job.id,
                job_application_id = application_id,
                backend = queue.backend_name(),
                error = %err,
                "Enqueue failed, rolling back application status",
            );
            if let Err(rollback) = applications
                .set_task_status(
                    application_id,
                    task,
                    ProcessingStatus::Failed,
                    Some(&job.id),
                    Some(&err.to_string()),
                )
                .await
            {
                tracing::error!(
                    job_application_id = application_id,
                    error = %rollback,
                    "Failed to roll back application status",
                );
            }
            Err(err.into())
        }
    }
}
