//! Job and task status enums with their legal transition tables.
//!
//! Both machines are monotonic: once a terminal status is reached there
//! is no legal exit. The tables here are the single source of truth;
//! every repository transition guard mirrors them.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SubmissionKind
// ---------------------------------------------------------------------------

/// How the job was submitted: one raw SQL text or a batch of files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    Single,
    Batch,
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionKind::Single => f.write_str("SINGLE"),
            SubmissionKind::Batch => f.write_str("BATCH"),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Accepted,
    Processing,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl JobStatus {
    /// A terminal status has no further legal transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::PartiallyCompleted | JobStatus::Failed
        )
    }

    /// Legal transitions:
    ///
    /// ```text
    /// ACCEPTED   -> PROCESSING | FAILED   (FAILED = decomposition shortcut)
    /// PROCESSING -> COMPLETED | PARTIALLY_COMPLETED | FAILED
    /// ```
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Accepted => {
                matches!(next, JobStatus::Processing | JobStatus::Failed)
            }
            JobStatus::Processing => matches!(
                next,
                JobStatus::Completed | JobStatus::PartiallyCompleted | JobStatus::Failed
            ),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Accepted => "ACCEPTED",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::PartiallyCompleted => "PARTIALLY_COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of one per-file execution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }

    /// Legal transitions:
    ///
    /// ```text
    /// PENDING     -> IN_PROGRESS | FAILURE   (FAILURE = retries exhausted)
    /// IN_PROGRESS -> SUCCESS | FAILURE
    /// ```
    ///
    /// `PENDING -> FAILURE` exists only for the stalled-task sweep, which
    /// fails tasks the bus gave up redelivering before any worker started
    /// them.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => {
                matches!(next, TaskStatus::InProgress | TaskStatus::Failure)
            }
            TaskStatus::InProgress => {
                matches!(next, TaskStatus::Success | TaskStatus::Failure)
            }
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
