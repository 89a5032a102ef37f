use std::time::Duration;

use careerline_queue::QueueConfig;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue to consume, from the `WORKER_QUEUE_*` variables.
    pub queue: QueueConfig,
    /// Longest single blocking dequeue (default: 5 s).
    pub poll_timeout: Duration,
    /// Wall-clock budget for one job (default: 300 s).
    pub job_timeout: Duration,
    /// Base URL of the API, for the completion callback.
    pub api_base_url: String,
    /// Shared secret sent as `X-API-Key`.
    pub internal_api_key: String,
    /// Program and arguments run for every job.
    pub command: Vec<String>,
    /// Consumer tag announced to the broker.
    pub consumer_tag: String,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `WORKER_QUEUE_*`           | see `QueueConfig`       |
    /// | `WORKER_POLL_TIMEOUT_SECS` | `5`                     |
    /// | `WORKER_JOB_TIMEOUT_SECS`  | `300`                   |
    /// | `API_BASE_URL`             | `http://127.0.0.1:3000` |
    /// | `INTERNAL_API_KEY`         | **required**            |
    /// | `WORKER_COMMAND`           | **required**            |
    /// | `WORKER_CONSUMER_TAG`      | `careerline-worker`     |
    ///
    /// # Panics
    ///
    /// Panics on malformed values or missing required variables.
    pub fn from_env() -> Self {
        let queue = QueueConfig::from_env("WORKER_QUEUE", "resume")
            .expect("Invalid WORKER_QUEUE_* configuration");

        let poll_timeout_secs: u64 = std::env::var("WORKER_POLL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("WORKER_POLL_TIMEOUT_SECS must be a valid u64");

        let job_timeout_secs: u64 = std::env::var("WORKER_JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("WORKER_JOB_TIMEOUT_SECS must be a valid u64");

        let api_base_url =
            std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".into());

        let internal_api_key = std::env::var("INTERNAL_API_KEY")
            .expect("INTERNAL_API_KEY must be set in the environment");

        let command = parse_command(
            &std::env::var("WORKER_COMMAND").expect("WORKER_COMMAND must be set"),
        );
        assert!(!command.is_empty(), "WORKER_COMMAND must not be empty");

        let consumer_tag = std::env::var("WORKER_CONSUMER_TAG")
            .unwrap_or_else(|_| "careerline-worker".into());

        Self {
            queue,
            poll_timeout: Duration::from_secs(poll_timeout_secs.max(1)),
            job_timeout: Duration::from_secs(job_timeout_secs.max(1)),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            internal_api_key: internal_api_key.trim().to_string(),
            command,
            consumer_tag,
        }
    }
}

/// Whitespace-separated program and arguments. No shell quoting.
pub fn parse_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
