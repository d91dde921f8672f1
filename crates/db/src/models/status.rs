//! SMALLINT id mappings for the domain enums.
//!
//! Ids are 1-based in declaration order and match the column comments
//! in the migrations. The domain enums themselves live in
//! `sqlcheck-core`; only the database representation is decided here.

use sqlcheck_core::status::{JobStatus, SubmissionKind, TaskStatus};

/// Status id type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_ids {
    (
        $(#[$meta:meta])*
        $enum_ty:ty => $to_fn:ident / $from_fn:ident {
            $( $variant:path = $id:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        pub fn $to_fn(value: $enum_ty) -> StatusId {
            match value {
                $( $variant => $id ),+
            }
        }

        /// Inverse mapping; `None` for ids outside the seed range.
        pub fn $from_fn(id: StatusId) -> Option<$enum_ty> {
            match id {
                $( $id => Some($variant) ),+,
                _ => None,
            }
        }
    };
}

define_status_ids! {
    /// Database id for a job status.
    JobStatus => job_status_id / job_status_from_id {
        JobStatus::Accepted = 1,
        JobStatus::Processing = 2,
        JobStatus::Completed = 3,
        JobStatus::PartiallyCompleted = 4,
        JobStatus::Failed = 5,
    }
}

define_status_ids! {
    /// Database id for a task status.
    TaskStatus => task_status_id / task_status_from_id {
        TaskStatus::Pending = 1,
        TaskStatus::InProgress = 2,
        TaskStatus::Success = 3,
        TaskStatus::Failure = 4,
    }
}

define_status_ids! {
    /// Database id for a submission kind.
    SubmissionKind => submission_kind_id / submission_kind_from_id {
        SubmissionKind::Single = 1,
        SubmissionKind::Batch = 2,
    }
}

/// Terminal task status ids, for transition guards in SQL.
pub const TERMINAL_TASK_STATUSES: [StatusId; 2] = [3, 4];

/// Terminal job status ids.
pub const TERMINAL_JOB_STATUSES: [StatusId; 3] = [3, 4, 5];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_ids_match_migration_comments() {
        assert_eq!(job_status_id(JobStatus::Accepted), 1);
        assert_eq!(job_status_id(JobStatus::Processing), 2);
        assert_eq!(job_status_id(JobStatus::Completed), 3);
        assert_eq!(job_status_id(JobStatus::PartiallyCompleted), 4);
        assert_eq!(job_status_id(JobStatus::Failed), 5);
    }

    #[test]
    fn task_status_ids_match_migration_comments() {
        assert_eq!(task_status_id(TaskStatus::Pending), 1);
        assert_eq!(task_status_id(TaskStatus::InProgress), 2);
        assert_eq!(task_status_id(TaskStatus::Success), 3);
        assert_eq!(task_status_id(TaskStatus::Failure), 4);
    }

    #[test]
    fn mappings_round_trip() {
        for id in 1..=5 {
            let status = job_status_from_id(id).unwrap();
            assert_eq!(job_status_id(status), id);
        }
        for id in 1..=4 {
            let status = task_status_from_id(id).unwrap();
            assert_eq!(task_status_id(status), id);
        }
        for id in 1..=2 {
            let kind = submission_kind_from_id(id).unwrap();
            assert_eq!(submission_kind_id(kind), id);
        }
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        assert!(job_status_from_id(0).is_none());
        assert!(job_status_from_id(6).is_none());
        assert!(task_status_from_id(5).is_none());
        assert!(submission_kind_from_id(3).is_none());
    }

    #[test]
    fn terminal_id_sets_agree_with_the_enums() {
        for id in TERMINAL_TASK_STATUSES {
            assert!(task_status_from_id(id).unwrap().is_terminal());
        }
        for id in TERMINAL_JOB_STATUSES {
            assert!(job_status_from_id(id).unwrap().is_terminal());
        }
    }
}
