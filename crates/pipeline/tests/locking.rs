//! The lock protocol: losing the race mutates nothing, redeliveries of
//! finished work are dropped, and concurrent workers execute a task
//! exactly once.

mod common;

use std::time::Duration;

use common::{drain, try_next, Harness};
use sqlcheck_core::analyze::{Dialect, RuleConfig};
use sqlcheck_core::lock::{task_lock_key, LockProvider};
use sqlcheck_core::repo::Repository;
use sqlcheck_core::status::TaskStatus;
use sqlcheck_events::bus::{Delivery, Topic};
use sqlcheck_events::messages::RequestEvent;
use sqlcheck_pipeline::Submission;

fn single(sql: &str) -> Submission {
    Submission::Single {
        sql_content: sql.to_string(),
        dialect: Dialect::Ansi,
        rules: RuleConfig::default(),
    }
}

#[tokio::test]
async fn lock_loser_performs_no_state_mutation() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    let job_id = harness
        .dispatcher()
        .submit(single("SELECT 1"))
        .await
        .unwrap();

    let delivery = try_next(&mut requests).await.expect("request published");
    let request: RequestEvent = delivery.envelope.decode().unwrap();

    // Another owner holds the task lock.
    let foreign = harness
        .locks
        .acquire(&task_lock_key(request.task_id()), Duration::from_secs(30))
        .await
        .unwrap()
        .expect("foreign lock");

    let worker = harness.worker("worker-loser");
    worker.handle_delivery(delivery).await;

    // The loser mutated nothing and published nothing.
    let (tasks, _) = harness.repo.tasks_page(job_id, 10, 0).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert_eq!(harness.analyzer.total_calls(), 0);
    assert!(drain(&mut completions).await.is_empty());

    harness.locks.release(foreign).await.unwrap();
}

#[tokio::test]
async fn redelivery_after_completion_is_dropped_and_reemits_the_completion() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;
    let mut completions = harness.subscribe(Topic::Completions).await;

    harness
        .dispatcher()
        .submit(single("SELECT 1"))
        .await
        .unwrap();

    let delivery = try_next(&mut requests).await.expect("request published");
    let envelope = delivery.envelope.clone();
    let request: RequestEvent = envelope.decode().unwrap();

    let worker = harness.worker("worker-test-1");
    worker.handle_delivery(delivery).await;
    assert_eq!(drain(&mut completions).await.len(), 1);
    assert_eq!(harness.analyzer.total_calls(), 1);

    // At-least-once delivery hands the same request over again.
    worker.handle_delivery(Delivery::unacked(envelope)).await;

    // No re-execution; the terminal state is authoritative and its
    // completion is re-emitted for the aggregator to dedupe.
    assert_eq!(harness.analyzer.total_calls(), 1);
    let task = harness
        .repo
        .task_by_id(request.task_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Success);
    assert_eq!(drain(&mut completions).await.len(), 1);
}

#[tokio::test]
async fn two_workers_racing_execute_exactly_once() {
    let harness = Harness::new();
    let mut requests = harness.subscribe(Topic::Requests).await;

    harness
        .dispatcher()
        .submit(single("SELECT 1"))
        .await
        .unwrap();

    let delivery = try_next(&mut requests).await.expect("request published");
    let envelope = delivery.envelope.clone();
    let request: RequestEvent = envelope.decode().unwrap();

    let first = harness.worker("worker-a");
    let second = harness.worker("worker-b");

    // Both workers receive the same request concurrently.
    tokio::join!(
        first.handle_delivery(delivery),
        second.handle_delivery(Delivery::unacked(envelope)),
    );

    // Whichever interleaving happened, the analysis ran exactly once
    // and the task is terminal.
    assert_eq!(harness.analyzer.total_calls(), 1);
    let task = harness
        .repo
        .task_by_id(request.task_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, TaskStatus::Success);
}
