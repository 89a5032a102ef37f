//! Key-value + list primitives the list-backed queue is built on.
//!
//! A [`ListStore`] offers exactly what the queue needs: TTL'd records, an
//! ordered list with a blocking pop, a conditional write and a publish
//! channel. [`RedisStore`] is the production implementation,
//! [`MemoryStore`] serves tests and single-process development.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level failures. Never escapes the queue crate.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A conditional write: replace `key` only if it still holds `expected`.
#[derive(Debug, Clone)]
pub struct Swap<'a> {
    pub key: &'a str,
    pub expected: &'a str,
    pub value: &'a str,
    /// `Some` resets the record TTL, `None` keeps the remaining TTL.
    pub ttl: Option<Duration>,
    /// `(list, member)` pushed in the same atomic step when the swap succeeds.
    pub push: Option<(&'a str, &'a str)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped,
    /// The record changed since it was read.
    Conflict,
    /// The record no longer exists (expired or never written).
    Missing,
}

#[async_trait]
pub trait ListStore: Send + Sync + 'static {
    /// Write `value` at `key` with `ttl` and push `member` onto `list`, atomically.
    async fn put_and_push(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        list: &str,
        member: &str,
    ) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn compare_and_swap(&self, swap: Swap<'_>) -> StoreResult<SwapOutcome>;

    /// Pop the oldest member of `list`, waiting up to `timeout`.
    async fn pop_blocking(&self, list: &str, timeout: Duration) -> StoreResult<Option<String>>;

    /// Fire-and-forget notification for live observers.
    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()>;
}
