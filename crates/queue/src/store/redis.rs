//! Redis-backed [`ListStore`].
//!
//! Records are plain string keys with `EX` expiry, the job list is a Redis
//! list (`LPUSH` to enqueue, `BRPOP` to take the oldest), conditional writes
//! run as a Lua script so the compare, the write and the optional re-push
//! happen in one server-side step.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisResult, Script};
use tokio::time::timeout;

use super::{ListStore, StoreError, StoreResult, Swap, SwapOutcome};

/// Compare-and-swap with optional push.
///
/// KEYS[1] record, KEYS[2] list (or the record key when nothing is pushed).
/// ARGV: expected, new value, ttl seconds (0 keeps the current TTL), member.
/// Returns -1 when the record is missing, 0 on mismatch, 1 when swapped.
const SWAP_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
if tonumber(ARGV[3]) > 0 then
  redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
else
  redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
end
if ARGV[4] ~= '' then
  redis.call('LPUSH', KEYS[2], ARGV[4])
end
return 1
"#;

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisStore {
    /// Shared connection for non-blocking commands.
    conn: ConnectionManager,
    /// Separate connection for `BRPOP`, which would otherwise stall every
    /// command pipelined behind it.
    blocking: ConnectionManager,
    swap: Script,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect to `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str, command_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = Self::manager(&client, command_timeout).await?;
        let blocking = Self::manager(&client, command_timeout).await?;

        tracing::info!(url = %redacted(url), "Connected to Redis");

        Ok(Self {
            conn,
            blocking,
            swap: Script::new(SWAP_SCRIPT),
            command_timeout,
        })
    }

    async fn manager(client: &Client, limit: Duration) -> StoreResult<ConnectionManager> {
        timeout(limit, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| StoreError::Timeout(limit))?
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn run<F, T>(&self, limit: Duration, operation: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        timeout(limit, operation)
            .await
            .map_err(|_| StoreError::Timeout(limit))?
            .map_err(|e| {
                if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
                    StoreError::Connection(e.to_string())
                } else {
                    StoreError::Command(e.to_string())
                }
            })
    }
}

#[async_trait]
impl ListStore for RedisStore {
    async fn put_and_push(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        list: &str,
        member: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .ignore()
            .cmd("LPUSH")
            .arg(list)
            .arg(member)
            .ignore();

        self.run(self.command_timeout, async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.run(self.command_timeout, async move {
            let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn compare_and_swap(&self, swap: Swap<'_>) -> StoreResult<SwapOutcome> {
        let mut conn = self.conn.clone();
        let (list, member) = swap.push.unwrap_or((swap.key, ""));
        let ttl_secs = swap.ttl.map_or(0, |t| t.as_secs().max(1));

        let mut invocation = self.swap.key(swap.key);
        invocation
            .key(list)
            .arg(swap.expected)
            .arg(swap.value)
            .arg(ttl_secs)
            .arg(member);

        let outcome: i64 = self
            .run(self.command_timeout, async move {
                let outcome: i64 = invocation.invoke_async(&mut conn).await?;
                Ok(outcome)
            })
            .await?;

        Ok(match outcome {
            1 => SwapOutcome::Swapped,
            0 => SwapOutcome::Conflict,
            _ => SwapOutcome::Missing,
        })
    }

    async fn pop_blocking(&self, list: &str, wait: Duration) -> StoreResult<Option<String>> {
        let mut conn = self.blocking.clone();
        // BRPOP treats 0 as "forever"; always pass a positive wait.
        let seconds = wait.as_secs_f64().max(0.01);

        let popped: Option<(String, String)> = self
            .run(wait + self.command_timeout, async move {
                let popped: Option<(String, String)> = redis::cmd("BRPOP")
                    .arg(list)
                    .arg(seconds)
                    .query_async(&mut conn)
                    .await?;
                Ok(popped)
            })
            .await?;

        Ok(popped.map(|(_, member)| member))
    }

    async fn publish(&self, channel: &str, message: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        self.run(self.command_timeout, async move {
            let _: i64 = redis::cmd("PUBLISH")
                .arg(channel)
                .arg(message)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }
}

/// Strip credentials from a connection URL before logging it.
fn redacted(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***{}", &url[..scheme], &url[at..])
        }
        _ => url.to_string(),
    }
}
