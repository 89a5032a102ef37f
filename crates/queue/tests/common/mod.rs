//! Shared fixtures for the queue integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use careerline_queue::store::{StoreResult, Swap, SwapOutcome};
use careerline_queue::{
    ApplicationSubmission, BackendKind, BrokerQueue, Job, JobPayload, ListQueue, ListStore,
    MemoryBroker, MemoryStore, QueueConfig, ResumeGeneration,
};

pub const NAMESPACE: &str = "test";

/// Short wait for dequeues that are expected to return something.
pub const POLL: Duration = Duration::from_millis(200);

pub fn resume_job(user_id: i64, job_application_id: i64) -> Job {
    Job::new(
        user_id,
        JobPayload::ResumeGeneration(ResumeGeneration {
            job_application_id,
            job_description: "Senior Rust engineer, async networking".into(),
            language: "en".into(),
            template: None,
        }),
    )
}

pub fn application_job(user_id: i64, job_application_id: i64) -> Job {
    Job::new(
        user_id,
        JobPayload::JobApplication(ApplicationSubmission {
            job_application_id,
            company: "Acme".into(),
            title: "Backend Engineer".into(),
            url: "https://jobs.acme.test/42".into(),
            website: Some("https://acme.test".into()),
        }),
    )
}

pub fn list_queue_with_ttl(ttl: Duration) -> (Arc<MemoryStore>, ListQueue) {
    let store = Arc::new(MemoryStore::new());
    let mut config = QueueConfig::new(BackendKind::Redis, NAMESPACE);
    config.job_ttl = ttl;
    let queue = ListQueue::new(store.clone(), &config);
    (store, queue)
}

pub fn list_queue() -> (Arc<MemoryStore>, ListQueue) {
    list_queue_with_ttl(Duration::from_secs(3600))
}

pub async fn broker_queue() -> (MemoryBroker, BrokerQueue) {
    let broker = MemoryBroker::new();
    let config = QueueConfig::new(BackendKind::Amqp, NAMESPACE);
    let queue = BrokerQueue::declare(Arc::new(broker.clone()), &config)
        .await
        .expect("declare topology");
    (broker, queue)
}

// ---------------------------------------------------------------------------
// Contended store
// ---------------------------------------------------------------------------

/// [`MemoryStore`] wrapper for exercising the optimistic write loop.
///
/// Every `get` yields after reading, so writers running concurrently all
/// read before any of them swaps. [`interfere_with_next`] additionally
/// rewrites the record right before the next swaps, like a writer in
/// another process.
///
/// [`interfere_with_next`]: ContendedStore::interfere_with_next
#[derive(Default)]
pub struct ContendedStore {
    inner: MemoryStore,
    interfere: AtomicUsize,
    conflicts: AtomicUsize,
}

impl ContendedStore {
    pub fn interfere_with_next(&self, swaps: usize) {
        self.interfere.store(swaps, Ordering::SeqCst);
    }

    /// Swaps that lost to another writer so far.
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    /// Bump the stored record's version behind the queue's back.
    async fn rewrite(&self, key: &str) -> StoreResult<()> {
        let Some(raw) = self.inner.get(key).await? else {
            return Ok(());
        };
        let mut record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let version = record["version"].as_u64().unwrap();
        record["version"] = (version + 1).into();
        let rewritten = record.to_string();
        self.inner
            .compare_and_swap(Swap {
                key,
                expected: &raw,
                value: &rewritten,
                ttl: None,
                push: None,
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ListStore for ContendedStore {
    async fn put_and_push(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        list: &str,
        member: &str,
    ) -> StoreResult<()> {
        self.inner.put_and_push(key, value, ttl, list, member).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self.inner.get(key).await?;
        tokio::task::yield_now().await;
        Ok(value)
    }

    async fn compare_and_swap(&self, swap: Swap<'_>) -> StoreResult<SwapOutcome> {
        let interfere = self
            .interfere
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if interfere {
            self.rewrite(swap.key).await?;
        }

        let outcome = self.inner.compare_and_swap(swap).await?;
        if outcome == SwapOutcome::Conflict {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn pop_blocking(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>> {
        self.inner.pop_blocking(list, timeout).await
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        self.inner.publish(channel, message).await
    }
}

pub fn contended_list_queue() -> (Arc<ContendedStore>, ListQueue) {
    let store = Arc::new(ContendedStore::default());
    let queue = ListQueue::new(
        store.clone(),
        &QueueConfig::new(BackendKind::Redis, NAMESPACE),
    );
    (store, queue)
}
