//! Dispatcher behavior: decomposition, validation, and request fan-out.

mod common;

use assert_matches::assert_matches;
use common::{drain, Harness};
use sqlcheck_core::analyze::{Dialect, RuleConfig};
use sqlcheck_core::error::CoreError;
use sqlcheck_core::job::NewJob;
use sqlcheck_core::repo::Repository;
use sqlcheck_core::status::{JobStatus, SubmissionKind, TaskStatus};
use sqlcheck_core::storage::FileStore;
use sqlcheck_core::types::FileRef;
use sqlcheck_events::bus::Topic;
use sqlcheck_events::messages::RequestEvent;
use sqlcheck_pipeline::{DispatchError, Submission};

fn single(sql: &str) -> Submission {
    Submission::Single {
        sql_content: sql.to_string(),
        dialect: Dialect::Ansi,
        rules: RuleConfig::default(),
    }
}

fn batch(files: &[&str]) -> Submission {
    Submission::Batch {
        source_ref: FileRef::new("uploads/batch.zip"),
        file_refs: files.iter().map(|f| FileRef::new(*f)).collect(),
        dialect: Dialect::Postgres,
        rules: RuleConfig::default(),
    }
}

#[tokio::test]
async fn single_submission_creates_job_task_and_request() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;

    let job_id = harness
        .dispatcher()
        .submit(single("SELECT * FROM users"))
        .await
        .unwrap();

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.submission_kind, SubmissionKind::Single);
    assert!(job.batch_expected_count.is_none());

    let (tasks, total) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(tasks[0].file_ref, job.source_ref);

    // The raw text landed under the job's source path.
    let stored = harness.store.read_text(&job.source_ref).await.unwrap();
    assert_eq!(stored, "SELECT * FROM users");

    let events = drain(&mut requests).await;
    assert_eq!(events.len(), 1);
    let request: RequestEvent = events[0].envelope.decode().unwrap();
    assert_matches!(request, RequestEvent::SingleFile(_));
    assert_eq!(request.job_id(), job_id);
    assert_eq!(request.task_id(), tasks[0].task_id);
    assert!(request.batch().is_none());
}

#[tokio::test]
async fn batch_submission_dispatches_one_request_per_file() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;

    let job_id = harness
        .dispatcher()
        .submit(batch(&["sql/a.sql", "sql/b.sql", "sql/c.sql"]))
        .await
        .unwrap();

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.batch_expected_count, Some(3));
    assert_eq!(job.dialect, Dialect::Postgres);

    let events = drain(&mut requests).await;
    assert_eq!(events.len(), 3);

    let mut batch_ids = Vec::new();
    let mut indices = Vec::new();
    for event in &events {
        let request: RequestEvent = event.envelope.decode().unwrap();
        let meta = request.batch().expect("batch requests carry batch meta");
        assert_eq!(meta.total_files, 3);
        batch_ids.push(meta.batch_id);
        indices.push(meta.file_index);
    }
    batch_ids.dedup();
    assert_eq!(batch_ids.len(), 1, "one batch id for the whole batch");
    indices.sort_unstable();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn empty_batch_is_rejected_before_any_job() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;

    let err = harness.dispatcher().submit(batch(&[])).await.unwrap_err();
    assert_matches!(err, DispatchError::Core(CoreError::Validation(_)));
    assert!(drain(&mut requests).await.is_empty());
}

#[tokio::test]
async fn all_invalid_refs_fail_the_job_with_no_tasks_or_events() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;

    let job_id = harness
        .dispatcher()
        .submit(batch(&["readme.md", ".hidden.sql", "notes.txt"]))
        .await
        .unwrap();

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("no usable SQL"));

    let (_, total) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    assert_eq!(total, 0);
    assert!(drain(&mut requests).await.is_empty());
}

#[tokio::test]
async fn invalid_refs_are_filtered_out_of_a_mixed_batch() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;

    let job_id = harness
        .dispatcher()
        .submit(batch(&["sql/good.sql", "junk.txt"]))
        .await
        .unwrap();

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    // The expected count was fixed from the submission, before filtering.
    assert_eq!(job.batch_expected_count, Some(2));

    let events = drain(&mut requests).await;
    assert_eq!(events.len(), 1);
    let request: RequestEvent = events[0].envelope.decode().unwrap();
    assert_eq!(request.file_ref().as_str(), "sql/good.sql");
    assert_eq!(request.batch().unwrap().total_files, 1);
}

#[tokio::test]
async fn create_job_rejects_a_zero_count_batch() {
    let harness = Harness::new();
    let err = harness
        .dispatcher()
        .create_job(NewJob::batch(FileRef::new("b.zip"), 0, Dialect::Ansi))
        .await
        .unwrap_err();
    assert_matches!(err, DispatchError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn empty_sql_content_is_rejected() {
    let harness = Harness::new();
    let err = harness
        .dispatcher()
        .submit(single("   \n"))
        .await
        .unwrap_err();
    assert_matches!(err, DispatchError::Core(CoreError::Validation(_)));
}
