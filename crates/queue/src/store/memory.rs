//! In-process [`ListStore`] for tests and single-process development.
//!
//! Mirrors the Redis semantics the queue relies on: records expire lazily
//! once their TTL passes, lists are pushed at the head and popped from the
//! tail (FIFO), and every multi-step write happens under one lock so it is
//! atomic with respect to other callers.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{ListStore, StoreResult, Swap, SwapOutcome};

/// Published messages kept for inspection; older ones are dropped.
pub const PUBLISHED_HISTORY: usize = 1024;

#[derive(Debug)]
struct Record {
    value: String,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<String, Record>,
    lists: HashMap<String, VecDeque<String>>,
    published: VecDeque<(String, String)>,
}

impl State {
    /// Live record at `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Record> {
        let now = Instant::now();
        if self.records.get(key).is_some_and(|r| r.is_expired(now)) {
            self.records.remove(key);
        }
        self.records.get_mut(key)
    }

    fn push(&mut self, list: &str, member: &str) {
        self.lists
            .entry(list.to_string())
            .or_default()
            .push_front(member.to_string());
    }
}

/// Shared-nothing in-memory store; clone the `Arc` to share it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent messages published on `channel`, oldest first.
    pub async fn published(&self, channel: &str) -> Vec<String> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Current length of `list`.
    pub async fn list_len(&self, list: &str) -> usize {
        self.state.lock().await.lists.get(list).map_or(0, VecDeque::len)
    }

    async fn try_pop(&self, list: &str) -> Option<String> {
        self.state.lock().await.lists.get_mut(list)?.pop_back()
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn put_and_push(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        list: &str,
        member: &str,
    ) -> StoreResult<()> {
        {
            let mut state = self.state.lock().await;
            state.records.insert(
                key.to_string(),
                Record {
                    value: value.to_string(),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            state.push(list, member);
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.live(key).map(|r| r.value.clone()))
    }

    async fn compare_and_swap(&self, swap: Swap<'_>) -> StoreResult<SwapOutcome> {
        let pushed = {
            let mut state = self.state.lock().await;
            let Some(record) = state.live(swap.key) else {
                return Ok(SwapOutcome::Missing);
            };
            if record.value != swap.expected {
                return Ok(SwapOutcome::Conflict);
            }
            record.value = swap.value.to_string();
            if let Some(ttl) = swap.ttl {
                record.expires_at = Some(Instant::now() + ttl);
            }
            if let Some((list, member)) = swap.push {
                state.push(list, member);
                true
            } else {
                false
            }
        };
        if pushed {
            self.pushed.notify_waiters();
        }
        Ok(SwapOutcome::Swapped)
    }

    async fn pop_blocking(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(member) = self.try_pop(list).await {
                return Ok(Some(member));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.published.len() == PUBLISHED_HISTORY {
            state.published.pop_front();
        }
        state
            .published
            .push_back((channel.to_string(), message.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
