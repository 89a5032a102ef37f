mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use careerline_queue::list::MAX_WRITE_ATTEMPTS;
use careerline_queue::{
    require_capability, Capability, ErrorKind, Job, JobQueue, JobResult, JobStatus, ListQueue,
    ListStore, QueueError, StatusUpdate,
};
use common::*;

/// Enqueue, claim and exhaust a zero budget so the job ends in `dead_letter`.
async fn dead_lettered_job(queue: &ListQueue) -> Job {
    let job = queue
        .enqueue_job(resume_job(1, 1).with_max_retries(0))
        .await
        .unwrap();
    queue.dequeue_job(POLL).await.unwrap().unwrap();
    queue
        .update_job_status(
            &job.id,
            StatusUpdate::new(JobStatus::Failed).with_error("captcha wall", ErrorKind::Transient),
        )
        .await
        .unwrap();
    let dead = queue
        .update_job_status(
            &job.id,
            StatusUpdate::new(JobStatus::Retrying).with_result(JobResult {
                details: Some(serde_json::json!({ "attempt": 1 })),
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(dead.status, JobStatus::DeadLetter);
    dead
}

// ---------------------------------------------------------------------------
// Enqueue / dequeue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enqueue_then_dequeue_returns_same_payload_as_processing() {
    let (_store, queue) = list_queue();
    let mut events = queue.events().subscribe();

    let job = resume_job(1, 10);
    let payload = job.payload.clone();
    let enqueued = queue.enqueue_job(job).await.unwrap();
    assert_eq!(enqueued.status, JobStatus::Pending);

    let dequeued = queue.dequeue_job(POLL).await.unwrap().expect("a job");
    assert_eq!(dequeued.id, enqueued.id);
    assert_eq!(dequeued.payload, payload);
    assert_eq!(dequeued.status, JobStatus::Processing);

    let created = events.recv().await.unwrap();
    assert_eq!(created.previous, None);
    let claimed = events.recv().await.unwrap();
    assert_eq!(claimed.previous, Some(JobStatus::Pending));
    assert_eq!(claimed.status, JobStatus::Processing);
    assert!(events.try_recv().is_err(), "exactly one processing transition");
}

#[tokio::test]
async fn dequeue_is_fifo() {
    let (_store, queue) = list_queue();
    let first = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let second = queue.enqueue_job(resume_job(1, 2)).await.unwrap();
    let third = queue.enqueue_job(application_job(2, 3)).await.unwrap();

    for expected in [first, second, third] {
        let job = queue.dequeue_job(POLL).await.unwrap().unwrap();
        assert_eq!(job.id, expected.id);
    }
}

#[tokio::test]
async fn dequeue_on_empty_queue_times_out_with_none() {
    let (_store, queue) = list_queue();
    let started = std::time::Instant::now();
    let job = queue.dequeue_job(Duration::from_millis(50)).await.unwrap();
    assert!(job.is_none());
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn dequeue_skips_cancelled_jobs() {
    let (_store, queue) = list_queue();
    let cancelled = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let live = queue.enqueue_job(resume_job(1, 2)).await.unwrap();
    queue.cancel_job(&cancelled.id).await.unwrap();

    let job = queue.dequeue_job(POLL).await.unwrap().unwrap();
    assert_eq!(job.id, live.id);
    assert!(queue.dequeue_job(Duration::from_millis(30)).await.unwrap().is_none());
}

#[tokio::test]
async fn popped_id_without_record_is_treated_as_lost() {
    let (store, queue) = list_queue_with_ttl(Duration::from_millis(20));
    queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(queue.dequeue_job(Duration::from_millis(50)).await.unwrap().is_none());
    assert_eq!(store.list_len("test:queue").await, 0);
}

#[tokio::test]
async fn corrupt_record_is_not_found_instead_of_crashing() {
    let (store, queue) = list_queue();
    store
        .put_and_push("test:job:broken", "{not json", Duration::from_secs(60), "test:queue", "broken")
        .await
        .unwrap();

    assert_matches!(queue.get_job("broken").await, Err(QueueError::JobNotFound(_)));
    assert!(queue.dequeue_job(Duration::from_millis(30)).await.unwrap().is_none());
}

#[tokio::test]
async fn enqueue_assigns_defaults_and_stores_record_under_namespace() {
    let (store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(7, 70)).await.unwrap();

    assert_eq!(job.max_retries, Some(careerline_queue::DEFAULT_MAX_RETRIES));
    assert_eq!(job.retry_count, 0);

    let raw = store.get(&format!("test:job:{}", job.id)).await.unwrap().unwrap();
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored["status"], "pending");
    assert_eq!(stored["user_id"], 7);
    assert_eq!(store.list_len("test:queue").await, 1);
}

// ---------------------------------------------------------------------------
// Records and TTL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_job_returns_stored_record() {
    let (_store, queue) = list_queue();
    let job = queue.enqueue_job(application_job(3, 30)).await.unwrap();
    let fetched = queue.get_job(&job.id).await.unwrap();
    assert_eq!(fetched, job);
}

#[tokio::test]
async fn unknown_id_is_job_not_found() {
    let (_store, queue) = list_queue();
    assert_matches!(queue.get_job("missing").await, Err(QueueError::JobNotFound(id)) if id == "missing");
    assert_matches!(
        queue.update_job_status("missing", StatusUpdate::new(JobStatus::Completed)).await,
        Err(QueueError::JobNotFound(_))
    );
    assert_matches!(queue.retry_job("missing").await, Err(QueueError::JobNotFound(_)));
    assert_matches!(queue.cancel_job("missing").await, Err(QueueError::JobNotFound(_)));
}

#[tokio::test]
async fn record_expires_after_ttl() {
    let (_store, queue) = list_queue_with_ttl(Duration::from_millis(30));
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    assert!(queue.get_job(&job.id).await.is_ok());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_matches!(queue.get_job(&job.id).await, Err(QueueError::JobNotFound(_)));
}

// ---------------------------------------------------------------------------
// Status updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_stores_result() {
    let (_store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap().unwrap();

    let result = JobResult {
        file_path: Some("storage/resumes/1/cv.pdf".into()),
        file_name: Some("cv.pdf".into()),
        file_size: Some(1024),
        tags: vec!["rust".into()],
        resume_id: Some(99),
        details: None,
    };
    let done = queue
        .update_job_status(&job.id, StatusUpdate::new(JobStatus::Completed).with_result(result.clone()))
        .await
        .unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(queue.get_job(&job.id).await.unwrap().result, Some(result));
}

#[tokio::test]
async fn mark_helpers_write_terminal_states() {
    let (_store, queue) = list_queue();
    let a = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let b = queue.enqueue_job(resume_job(1, 2)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap();

    assert_eq!(queue.mark_job_complete(&a.id).await.unwrap().status, JobStatus::Completed);

    let failed = queue.mark_job_failed(&b.id, "render crashed").await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    let error = failed.last_error.unwrap();
    assert_eq!(error.message, "render crashed");
    assert_eq!(error.kind, ErrorKind::Transient);
}

#[tokio::test]
async fn invalid_transition_is_rejected() {
    let (_store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();

    assert_matches!(
        queue.update_job_status(&job.id, StatusUpdate::new(JobStatus::Completed)).await,
        Err(QueueError::InvalidStateTransition(_))
    );
    assert_eq!(queue.get_job(&job.id).await.unwrap().status, JobStatus::Pending);
}

#[tokio::test]
async fn writes_to_terminal_jobs_are_ignored() {
    let (_store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap();
    let done = queue.mark_job_complete(&job.id).await.unwrap();

    let after = queue
        .update_job_status(&job.id, StatusUpdate::new(JobStatus::Failed).with_error("late", ErrorKind::Transient))
        .await
        .unwrap();
    assert_eq!(after, done);
}

#[tokio::test]
async fn retrying_requeues_and_exhausted_budget_dead_letters() {
    let (store, queue) = list_queue();
    let job = queue
        .enqueue_job(resume_job(1, 1).with_max_retries(1))
        .await
        .unwrap();

    // First attempt fails and is retried.
    queue.dequeue_job(POLL).await.unwrap().unwrap();
    queue.mark_job_failed(&job.id, "timeout").await.unwrap();
    let retrying = queue
        .update_job_status(&job.id, StatusUpdate::new(JobStatus::Retrying))
        .await
        .unwrap();
    assert_eq!(retrying.status, JobStatus::Retrying);
    assert_eq!(retrying.retry_count, 1);
    assert_eq!(store.list_len("test:queue").await, 1);

    // Second attempt fails; the budget is spent.
    let again = queue.dequeue_job(POLL).await.unwrap().unwrap();
    assert_eq!(again.id, job.id);
    queue.mark_job_failed(&job.id, "timeout").await.unwrap();
    let dead = queue
        .update_job_status(&job.id, StatusUpdate::new(JobStatus::Retrying))
        .await
        .unwrap();
    assert_eq!(dead.status, JobStatus::DeadLetter);
    assert_eq!(dead.retry_count, 1);
    assert_eq!(store.list_len("test:queue").await, 0);
}

#[tokio::test]
async fn status_changes_are_published_on_the_store_channel() {
    let (store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap();

    let published = store.published("test:events").await;
    assert_eq!(published.len(), 2);
    let last: serde_json::Value = serde_json::from_str(&published[1]).unwrap();
    assert_eq!(last["job_id"], job.id.as_str());
    assert_eq!(last["status"], "processing");
    assert_eq!(last["previous"], "pending");
}

// ---------------------------------------------------------------------------
// Retry / cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retry_resets_failed_job_and_requeues_it() {
    let (_store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap();
    queue
        .update_job_status(
            &job.id,
            StatusUpdate::new(JobStatus::Failed)
                .with_error("site down", ErrorKind::Transient)
                .with_retry_count(2),
        )
        .await
        .unwrap();

    let retried = queue.retry_job(&job.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(retried.retry_count, 0);
    assert!(retried.last_error.is_none());

    let again = queue.dequeue_job(POLL).await.unwrap().unwrap();
    assert_eq!(again.id, job.id);
}

#[tokio::test]
async fn retry_of_pending_job_is_invalid() {
    let (_store, queue) = list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    assert_matches!(queue.retry_job(&job.id).await, Err(QueueError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn retry_of_processing_or_completed_job_leaves_record_unchanged() {
    let (_store, queue) = list_queue();
    let running = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let done = queue.enqueue_job(resume_job(1, 2)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap().unwrap();
    queue.dequeue_job(POLL).await.unwrap().unwrap();
    queue.mark_job_complete(&done.id).await.unwrap();

    for id in [&running.id, &done.id] {
        let before = queue.get_job(id).await.unwrap();
        assert_matches!(queue.retry_job(id).await, Err(QueueError::InvalidStateTransition(_)));
        assert_eq!(queue.get_job(id).await.unwrap(), before);
    }
}

#[tokio::test]
async fn retry_revives_dead_lettered_job() {
    let (store, queue) = list_queue();
    let dead = dead_lettered_job(&queue).await;
    assert!(dead.last_error.is_some());
    assert!(dead.result.is_some());
    assert_eq!(store.list_len("test:queue").await, 0);

    let revived = queue.retry_job(&dead.id).await.unwrap();
    assert_eq!(revived.status, JobStatus::Pending);
    assert_eq!(revived.retry_count, 0);
    assert!(revived.last_error.is_none());
    assert!(revived.result.is_none());
    assert_eq!(store.list_len("test:queue").await, 1);

    let again = queue.dequeue_job(POLL).await.unwrap().unwrap();
    assert_eq!(again.id, dead.id);
    assert_eq!(again.status, JobStatus::Processing);
}

#[tokio::test]
async fn cancel_rules() {
    let (_store, queue) = list_queue();
    let pending = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let cancelled = queue.cancel_job(&pending.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.last_error.as_ref().unwrap().message, "Cancelled by user");

    // A worker finishing later cannot overwrite the cancellation.
    let late = queue.mark_job_complete(&pending.id).await.unwrap();
    assert_eq!(late.status, JobStatus::Failed);

    let done = queue.enqueue_job(resume_job(1, 2)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap();
    queue.mark_job_complete(&done.id).await.unwrap();
    assert_matches!(queue.cancel_job(&done.id).await, Err(QueueError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn cancel_of_dead_lettered_or_cancelled_job_is_rejected() {
    let (_store, queue) = list_queue();
    let dead = dead_lettered_job(&queue).await;
    assert_matches!(queue.cancel_job(&dead.id).await, Err(QueueError::InvalidStateTransition(_)));
    assert_eq!(queue.get_job(&dead.id).await.unwrap(), dead);

    let job = queue.enqueue_job(resume_job(1, 2)).await.unwrap();
    let cancelled = queue.cancel_job(&job.id).await.unwrap();
    assert_matches!(queue.cancel_job(&job.id).await, Err(QueueError::InvalidStateTransition(_)));
    assert_eq!(queue.get_job(&job.id).await.unwrap(), cancelled);
}

// ---------------------------------------------------------------------------
// Concurrent writers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn write_rereads_after_losing_to_another_writer() {
    let (store, queue) = contended_list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let claimed = queue.dequeue_job(POLL).await.unwrap().unwrap();

    store.interfere_with_next(1);
    let done = queue.mark_job_complete(&job.id).await.unwrap();

    assert_eq!(store.conflicts(), 1);
    assert_eq!(done.status, JobStatus::Completed);
    // One bump from the other writer, one from ours.
    assert_eq!(done.version, claimed.version + 2);
    assert_eq!(queue.get_job(&job.id).await.unwrap(), done);
}

#[tokio::test]
async fn write_gives_up_after_repeated_conflicts() {
    let (store, queue) = contended_list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    queue.dequeue_job(POLL).await.unwrap().unwrap();

    store.interfere_with_next(MAX_WRITE_ATTEMPTS);
    assert_matches!(
        queue.mark_job_complete(&job.id).await,
        Err(QueueError::ConcurrentModification(id)) if id == job.id
    );
    assert_eq!(store.conflicts(), MAX_WRITE_ATTEMPTS);
    assert_eq!(queue.get_job(&job.id).await.unwrap().status, JobStatus::Processing);
}

#[tokio::test]
async fn racing_cancel_and_worker_write_both_survive() {
    let (store, queue) = contended_list_queue();
    let job = queue.enqueue_job(resume_job(1, 1)).await.unwrap();
    let claimed = queue.dequeue_job(POLL).await.unwrap().unwrap();

    let (cancelled, worker) = tokio::join!(
        queue.cancel_job(&job.id),
        queue.update_job_status(
            &job.id,
            StatusUpdate::new(JobStatus::Processing).with_retry_count(1),
        ),
    );
    let cancelled = cancelled.unwrap();
    let worker = worker.unwrap();
    let stored = queue.get_job(&job.id).await.unwrap();

    assert_eq!(store.conflicts(), 1, "both writers read the same record");
    assert!(cancelled.is_cancelled());
    assert!(stored.is_cancelled());
    if worker.status == JobStatus::Processing {
        // The worker wrote first; the cancel was applied on top of it.
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.version, claimed.version + 2);
    } else {
        // The cancel wrote first; the worker's write hit a terminal job.
        assert!(worker.is_cancelled());
        assert_eq!(stored.retry_count, 0);
        assert_eq!(stored.version, claimed.version + 1);
    }
    assert_eq!(stored, cancelled);
}

#[tokio::test]
async fn list_backend_supports_polling_and_records() {
    let (_store, queue) = list_queue();
    assert!(require_capability(&queue, Capability::Poll).is_ok());
    assert!(require_capability(&queue, Capability::Records).is_ok());
    assert_matches!(
        require_capability(&queue, Capability::Consume),
        Err(QueueError::UnsupportedOperation { operation: "consume", backend: "redis" })
    );
    assert!(queue.as_consumable().is_none());
}
