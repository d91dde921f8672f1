//! Shared id and timestamp aliases plus the [`FileRef`] newtype.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Jobs and tasks use time-ordered UUIDs (v7) generated at creation.
pub type JobId = uuid::Uuid;
pub type TaskId = uuid::Uuid;
pub type BatchId = uuid::Uuid;

/// Event ids are random UUIDs (v4); one per published envelope.
pub type EventId = uuid::Uuid;
pub type CorrelationId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A reference to a blob in the external file store.
///
/// The value is a store-relative path (e.g. `jobs/<id>/sources/a.sql`);
/// the core never interprets it beyond extracting a display file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(String);

impl FileRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, used for human-readable labels in reports.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileRef {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for FileRef {
    fn from(path: String) -> Self {
        Self(path)
    }
}
