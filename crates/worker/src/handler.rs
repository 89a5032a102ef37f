//! Job execution.
//!
//! [`JobHandler`] is the seam between the runner and the actual work. The
//! default implementation, [`CommandHandler`], runs an external program per
//! job:
//!
//! - the job record is written to its stdin as JSON,
//! - it prints a JSON [`CommandReport`] on stdout,
//! - exit status `0` is success; `64` (usage) and `65` (data error) are
//!   permanent failures; anything else is transient.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use careerline_core::storage::FALLBACK_FILE_NAME;
use careerline_queue::{ErrorKind, Job, JobPayload};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: u64 = 1024 * 1024;

/// Exit codes treated as permanent failures (sysexits `EX_USAGE`, `EX_DATAERR`).
const PERMANENT_EXIT_CODES: &[i32] = &[64, 65];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A generated document to upload through the completion callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub data: Vec<u8>,
    pub title: Option<String>,
    pub tags: Vec<String>,
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutput {
    /// A file for the API to store (resume generation).
    Artifact(Artifact),
    /// Free-form details recorded on the job (application submission).
    Details(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// Worth another attempt.
    #[error("{0}")]
    Transient(String),

    /// Will fail the same way every time.
    #[error("{0}")]
    Permanent(String),

    #[error("job exceeded its {0:?} time budget")]
    Timeout(Duration),
}

impl HandlerError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Error kind recorded on the job.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::Transient,
            Self::Permanent(_) => ErrorKind::Permanent,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<JobOutput, HandlerError>;
}

// ---------------------------------------------------------------------------
// CommandHandler
// ---------------------------------------------------------------------------

/// What the external program reports on stdout.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReport {
    /// Path of the generated file, required for resume generation.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Runs one external program per job.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandHandler {
    /// `command` is the program followed by its arguments.
    ///
    /// Returns `None` when `command` is empty.
    pub fn new(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    async fn run(&self, input: &[u8]) -> Result<Vec<u8>, HandlerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            HandlerError::Permanent(format!("failed to start '{}': {e}", self.program))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The program may exit without reading its input.
            let _ = stdin.write_all(input).await;
            drop(stdin);
        }

        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        // On timeout `child` is dropped and killed.
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(HandlerError::Transient(format!("wait failed: {e}"))),
            Err(_) => return Err(HandlerError::Timeout(self.timeout)),
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(stdout);
        }

        let code = status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&stderr);
        let message = format!("'{}' exited with {code}: {}", self.program, tail(stderr.trim()));
        if PERMANENT_EXIT_CODES.contains(&code) {
            Err(HandlerError::Permanent(message))
        } else {
            Err(HandlerError::Transient(message))
        }
    }
}

#[async_trait]
impl JobHandler for CommandHandler {
    async fn handle(&self, job: &Job) -> Result<JobOutput, HandlerError> {
        let input = serde_json::to_vec(job)
            .map_err(|e| HandlerError::Permanent(format!("cannot encode job: {e}")))?;

        tracing::debug!(job_id = %job.id, program = %self.program, "Running job command");
        let stdout = self.run(&input).await?;

        let report: CommandReport = if stdout.iter().all(u8::is_ascii_whitespace) {
            CommandReport::default()
        } else {
            serde_json::from_slice(&stdout).map_err(|e| {
                HandlerError::Permanent(format!("command printed an invalid report: {e}"))
            })?
        };

        match &job.payload {
            JobPayload::ResumeGeneration(_) => {
                let path = report.file_path.ok_or_else(|| {
                    HandlerError::Permanent("report is missing 'filePath'".into())
                })?;
                let data = tokio::fs::read(&path).await.map_err(|e| {
                    HandlerError::Transient(format!("cannot read artifact '{path}': {e}"))
                })?;
                let file_name = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
                Ok(JobOutput::Artifact(Artifact {
                    file_name,
                    data,
                    title: report.title,
                    tags: report.tags,
                }))
            }
            JobPayload::JobApplication(_) => Ok(JobOutput::Details(
                report.details.unwrap_or(serde_json::Value::Null),
            )),
        }
    }
}

/// Read an entire output stream, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

/// Last 500 characters of `s`.
fn tail(s: &str) -> &str {
    let count = s.chars().count();
    match s.char_indices().nth(count.saturating_sub(500)) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
