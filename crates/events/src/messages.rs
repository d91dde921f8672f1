//! Typed payloads for the three bus topics.
//!
//! Batch-originated requests are a distinct variant rather than a pile
//! of nullable fields: the sequencing metadata either exists as a whole
//! ([`BatchMeta`]) or not at all, chosen at construction.

use serde::{Deserialize, Serialize};
use sqlcheck_core::analyze::{Dialect, RuleConfig};
use sqlcheck_core::status::TaskStatus;
use sqlcheck_core::task::TaskOutcome;
use sqlcheck_core::types::{BatchId, FileRef, JobId, TaskId};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Ephemeral sequencing metadata carried by batch-originated events so
/// the aggregator can roll a batch up without scanning the task table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMeta {
    pub batch_id: BatchId,
    /// Zero-based position of this file within the batch.
    pub file_index: u32,
    pub total_files: u32,
}

/// Request for a task created from a single-SQL submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleFileRequest {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub file_ref: FileRef,
    pub dialect: Dialect,
    #[serde(default)]
    pub rules: RuleConfig,
}

/// Request for one file of a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFileRequest {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub file_ref: FileRef,
    pub dialect: Dialect,
    #[serde(default)]
    pub rules: RuleConfig,
    pub batch: BatchMeta,
}

/// An execution request on the `requests` topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestEvent {
    SingleFile(SingleFileRequest),
    BatchFile(BatchFileRequest),
}

impl RequestEvent {
    pub const EVENT_TYPE: &'static str = "task.requested";

    pub fn job_id(&self) -> JobId {
        match self {
            RequestEvent::SingleFile(r) => r.job_id,
            RequestEvent::BatchFile(r) => r.job_id,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            RequestEvent::SingleFile(r) => r.task_id,
            RequestEvent::BatchFile(r) => r.task_id,
        }
    }

    pub fn file_ref(&self) -> &FileRef {
        match self {
            RequestEvent::SingleFile(r) => &r.file_ref,
            RequestEvent::BatchFile(r) => &r.file_ref,
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            RequestEvent::SingleFile(r) => r.dialect,
            RequestEvent::BatchFile(r) => r.dialect,
        }
    }

    pub fn rules(&self) -> &RuleConfig {
        match self {
            RequestEvent::SingleFile(r) => &r.rules,
            RequestEvent::BatchFile(r) => &r.rules,
        }
    }

    /// Present only for batch-originated requests.
    pub fn batch(&self) -> Option<&BatchMeta> {
        match self {
            RequestEvent::SingleFile(_) => None,
            RequestEvent::BatchFile(r) => Some(&r.batch),
        }
    }
}

// ---------------------------------------------------------------------------
// Completions
// ---------------------------------------------------------------------------

/// Terminal outcome of one task, published on the `completions` topic.
/// Batch metadata is propagated unchanged from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub job_id: JobId,
    pub task_id: TaskId,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchMeta>,
}

impl CompletionEvent {
    pub const EVENT_TYPE: &'static str = "task.completed";

    pub fn status(&self) -> TaskStatus {
        self.outcome.status()
    }
}

// ---------------------------------------------------------------------------
// Batch results
// ---------------------------------------------------------------------------

/// Per-file entry of an aggregated batch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerFileResult {
    pub file_index: u32,
    pub task_id: TaskId,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

/// The single aggregated summary emitted on `batch_results` once every
/// file of a batch is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResultEvent {
    pub job_id: JobId,
    pub batch_id: BatchId,
    pub total_files: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub per_file: Vec<PerFileResult>,
}

impl BatchResultEvent {
    pub const EVENT_TYPE: &'static str = "batch.completed";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
