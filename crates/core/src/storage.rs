//! File storage collaborator for uploaded artifacts.
//!
//! Workers upload generated documents through the completion callback; the
//! API persists them through a [`FileStorage`] implementation. The only
//! implementation today is [`LocalFileStorage`], which writes under a base
//! directory partitioned by owning user.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum accepted artifact size (20 MiB).
pub const MAX_ARTIFACT_BYTES: usize = 20 * 1024 * 1024;

/// File name used when the uploader does not send one.
pub const FALLBACK_FILE_NAME: &str = "resume.pdf";

/// Extensions accepted for generated resumes.
const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "html", "md", "txt"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where an artifact ended up after [`FileStorage::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Full path of the stored file.
    pub path: String,
    /// Sanitised original file name.
    pub file_name: String,
    /// Size in bytes.
    pub size: u64,
}

/// Persists uploaded artifacts on behalf of a user.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn save(&self, user_id: DbId, file_name: &str, data: &[u8])
        -> Result<StoredFile, CoreError>;
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Stores artifacts at `<base_dir>/<user_id>/<uuid>_<file_name>`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(
        &self,
        user_id: DbId,
        file_name: &str,
        data: &[u8],
    ) -> Result<StoredFile, CoreError> {
        let file_name = sanitize_file_name(file_name);
        validate_artifact(&file_name, data)?;

        let dir = self.base_dir.join(user_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to create storage dir: {e}")))?;

        let path = dir.join(format!("{}_{file_name}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to write artifact: {e}")))?;

        tracing::debug!(user_id, path = %path.display(), size = data.len(), "Artifact stored");

        Ok(StoredFile {
            path: path.to_string_lossy().into_owned(),
            file_name,
            size: data.len() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Strip directory components and anything outside `[A-Za-z0-9._-]`.
///
/// Falls back to [`FALLBACK_FILE_NAME`] when nothing usable remains.
pub fn sanitize_file_name(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned
    }
}

fn validate_artifact(file_name: &str, data: &[u8]) -> Result<(), CoreError> {
    if data.is_empty() {
        return Err(CoreError::Validation("Uploaded file is empty".into()));
    }
    if data.len() > MAX_ARTIFACT_BYTES {
        return Err(CoreError::Validation(format!(
            "Uploaded file exceeds {MAX_ARTIFACT_BYTES} bytes"
        )));
    }
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(CoreError::Validation(format!(
            "Unsupported file type '.{ext}'. Must be one of: {ALLOWED_EXTENSIONS:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
