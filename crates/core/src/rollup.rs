//! Job status roll-up: a pure function of the task-status multiset.
//!
//! The aggregator re-derives the job status after every completion
//! event instead of incrementally updating it, so any permutation of
//! event delivery converges on the same answer.

use crate::status::{JobStatus, TaskStatus};

/// Derive a job's status from the statuses of all its tasks.
///
/// - any non-terminal task  -> `Processing`
/// - all `Success`          -> `Completed`
/// - all `Failure`          -> `Failed`
/// - mixed terminal         -> `PartiallyCompleted`
///
/// An empty slice means the job has not been decomposed yet and maps to
/// `Accepted`.
pub fn derive_job_status(statuses: &[TaskStatus]) -> JobStatus {
    if statuses.is_empty() {
        return JobStatus::Accepted;
    }
    if statuses.iter().any(|s| !s.is_terminal()) {
        return JobStatus::Processing;
    }
    let successes = statuses
        .iter()
        .filter(|s| **s == TaskStatus::Success)
        .count();
    if successes == statuses.len() {
        JobStatus::Completed
    } else if successes == 0 {
        JobStatus::Failed
    } else {
        JobStatus::PartiallyCompleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TaskStatus::{Failure, InProgress, Pending, Success};

    #[test]
    fn no_tasks_means_not_yet_decomposed() {
        assert_eq!(derive_job_status(&[]), JobStatus::Accepted);
    }

    #[test]
    fn any_non_terminal_task_keeps_the_job_processing() {
        assert_eq!(derive_job_status(&[Pending]), JobStatus::Processing);
        assert_eq!(
            derive_job_status(&[Success, InProgress, Failure]),
            JobStatus::Processing
        );
    }

    #[test]
    fn all_success_completes() {
        assert_eq!(
            derive_job_status(&[Success, Success, Success]),
            JobStatus::Completed
        );
    }

    #[test]
    fn all_failure_fails() {
        assert_eq!(derive_job_status(&[Failure, Failure]), JobStatus::Failed);
    }

    #[test]
    fn mixed_terminal_is_partially_completed() {
        assert_eq!(
            derive_job_status(&[Success, Failure, Success]),
            JobStatus::PartiallyCompleted
        );
    }

    #[test]
    fn derivation_is_order_independent() {
        let mut statuses = vec![Success, Failure, Success, Failure, Success];
        let expected = derive_job_status(&statuses);
        // Rotate through every cyclic permutation.
        for _ in 0..statuses.len() {
            statuses.rotate_left(1);
            assert_eq!(derive_job_status(&statuses), expected);
        }
        statuses.reverse();
        assert_eq!(derive_job_status(&statuses), expected);
    }
}
