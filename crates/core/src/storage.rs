//! The external file store capability and its two local backends.
//!
//! Sources and results are blobs addressed by [`FileRef`]; the layout
//! helpers here are the only place path shapes are known:
//!
//! ```text
//! jobs/<job_id>/sources/single_sql_<job_id>.sql    single-SQL source
//! results/<job_id>/<task_id>_result.json           per-task report
//! ```

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::types::{FileRef, JobId, TaskId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(String),
}

/// Store path for the raw text of a single-SQL submission.
pub fn single_source_ref(job_id: JobId) -> FileRef {
    FileRef::new(format!("jobs/{job_id}/sources/single_sql_{job_id}.sql"))
}

/// Store path for a task's analysis report.
pub fn result_ref(job_id: JobId, task_id: TaskId) -> FileRef {
    FileRef::new(format!("results/{job_id}/{task_id}_result.json"))
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read_text(&self, file_ref: &FileRef) -> Result<String, StoreError>;

    /// Write, creating parent directories as needed and replacing any
    /// existing blob.
    async fn write_text(&self, file_ref: &FileRef, contents: &str) -> Result<(), StoreError>;

    async fn exists(&self, file_ref: &FileRef) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// File store over a local directory tree (typically a shared mount).
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a reference below the root, rejecting absolute paths and
    /// parent-directory traversal.
    fn resolve(&self, file_ref: &FileRef) -> Result<PathBuf, StoreError> {
        let relative = Path::new(file_ref.as_str());
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(StoreError::Io(format!(
                "reference escapes the storage root: {file_ref}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for FsStore {
    async fn read_text(&self, file_ref: &FileRef) -> Result<String, StoreError> {
        let path = self.resolve(file_ref)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(file_ref.to_string()))
            }
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn write_text(&self, file_ref: &FileRef, contents: &str) -> Result<(), StoreError> {
        let path = self.resolve(file_ref)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn exists(&self, file_ref: &FileRef) -> Result<bool, StoreError> {
        let path = self.resolve(file_ref)?;
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Map-backed store for tests and embedded use.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<FileRef, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryStore {
    async fn read_text(&self, file_ref: &FileRef) -> Result<String, StoreError> {
        let files = self.files.lock().await;
        files
            .get(file_ref)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(file_ref.to_string()))
    }

    async fn write_text(&self, file_ref: &FileRef, contents: &str) -> Result<(), StoreError> {
        let mut files = self.files.lock().await;
        files.insert(file_ref.clone(), contents.to_string());
        Ok(())
    }

    async fn exists(&self, file_ref: &FileRef) -> Result<bool, StoreError> {
        let files = self.files.lock().await;
        Ok(files.contains_key(file_ref))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
