//! Worker execution: the happy path, deterministic failures, and the
//! transient-retry policy.

mod common;

use std::sync::Arc;

use common::{pump, Behavior, FlakyStore, Harness};
use sqlcheck_core::analyze::{AnalysisReport, Dialect, RuleConfig};
use sqlcheck_core::repo::Repository;
use sqlcheck_core::status::{JobStatus, TaskStatus};
use sqlcheck_core::storage::FileStore;
use sqlcheck_events::bus::Topic;
use sqlcheck_pipeline::Submission;

fn single(sql: &str) -> Submission {
    Submission::Single {
        sql_content: sql.to_string(),
        dialect: Dialect::Ansi,
        rules: RuleConfig::default(),
    }
}

#[tokio::test]
async fn zero_violation_single_run_completes() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    let job_id = harness
        .dispatcher()
        .submit(single("SELECT 1"))
        .await
        .unwrap();

    let worker = harness.worker("worker-test-1");
    let aggregator = harness.aggregator();
    pump(&worker, &aggregator, &mut requests, &mut completions).await;

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let (tasks, _) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Success);
    let result_ref = tasks[0].result_ref.as_ref().expect("result_ref is set");

    // The persisted report decodes and shows a clean run.
    let raw = harness.store.read_text(result_ref).await.unwrap();
    let report: AnalysisReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(report.summary.total_violations, 0);
}

#[tokio::test]
async fn violations_still_count_as_success() {
    let harness = Harness::new();
    harness
        .analyzer
        .script_default(Behavior::Violations(4))
        .await;
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    let job_id = harness
        .dispatcher()
        .submit(single("select * from t"))
        .await
        .unwrap();

    let worker = harness.worker("worker-test-1");
    let aggregator = harness.aggregator();
    pump(&worker, &aggregator, &mut requests, &mut completions).await;

    // Finding violations is a successful analysis, not a failure.
    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let (tasks, _) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    let raw = harness
        .store
        .read_text(tasks[0].result_ref.as_ref().unwrap())
        .await
        .unwrap();
    let report: AnalysisReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(report.summary.total_violations, 4);
}

#[tokio::test]
async fn deterministic_analysis_failure_is_terminal_and_never_retried() {
    let harness = Harness::new();
    harness
        .analyzer
        .script_default(Behavior::Fail("unparsable statement".into()))
        .await;
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    let job_id = harness
        .dispatcher()
        .submit(single("NOT SQL AT ALL"))
        .await
        .unwrap();

    let worker = harness.worker("worker-test-1");
    let aggregator = harness.aggregator();
    pump(&worker, &aggregator, &mut requests, &mut completions).await;

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let (tasks, _) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failure);
    assert!(tasks[0]
        .error
        .as_deref()
        .unwrap()
        .contains("unparsable statement"));

    // Exactly one analyzer invocation: deterministic failures do not
    // pass through the retry loop.
    assert_eq!(harness.analyzer.total_calls(), 1);
}

#[tokio::test]
async fn transient_read_failures_are_retried_to_success() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    let job_id = harness
        .dispatcher()
        .submit(single("SELECT 1"))
        .await
        .unwrap();

    // Fail the first two reads; the third (last allowed) succeeds.
    let flaky = Arc::new(FlakyStore::new(harness.store.clone(), 2));
    let worker = harness.worker_with_store("worker-test-1", flaky.clone() as Arc<dyn FileStore>);
    let aggregator = harness.aggregator();
    pump(&worker, &aggregator, &mut requests, &mut completions).await;

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(flaky.read_attempts(), 3);
}

#[tokio::test]
async fn retry_exhaustion_escalates_to_task_failure() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    let job_id = harness
        .dispatcher()
        .submit(single("SELECT 1"))
        .await
        .unwrap();

    // More failures than the policy's three attempts.
    let flaky = Arc::new(FlakyStore::new(harness.store.clone(), 10));
    let worker = harness.worker_with_store("worker-test-1", flaky.clone() as Arc<dyn FileStore>);
    let aggregator = harness.aggregator();
    pump(&worker, &aggregator, &mut requests, &mut completions).await;

    let job = harness.repo.job_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    let (tasks, _) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Failure);
    assert!(tasks[0]
        .error
        .as_deref()
        .unwrap()
        .contains("content fetch failed after retries"));
    assert_eq!(flaky.read_attempts(), 3, "bounded by the retry policy");
    assert_eq!(harness.analyzer.total_calls(), 0);
}
