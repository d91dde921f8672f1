//! Integration tests for the `/jobs` resource.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get, post_json, spawn_pipeline, wait_for_job_status};
use serde_json::json;

#[tokio::test]
async fn submit_single_returns_201_and_job_is_visible() {
    let test_app = build_test_app();

    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({"sql_content": "SELECT * FROM users"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let job_id = created["data"]["job_id"].as_str().expect("job_id").to_string();

    // No workers are running, so the job sits in PROCESSING with one
    // pending task.
    let response = get(test_app.app.clone(), &format!("/api/v1/jobs/{job_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "PROCESSING");
    assert_eq!(json["data"]["submission_kind"], "SINGLE");
    assert_eq!(json["data"]["tasks"]["total"], 1);
    assert_eq!(json["data"]["tasks"]["items"][0]["status"], "PENDING");
}

#[tokio::test]
async fn submit_requires_exactly_one_source_kind() {
    let test_app = build_test_app();

    let neither = post_json(test_app.app.clone(), "/api/v1/jobs", json!({})).await;
    assert_eq!(neither.status(), StatusCode::BAD_REQUEST);

    let both = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({
            "sql_content": "SELECT 1",
            "file_refs": ["a.sql"],
            "archive_ref": "uploads/b.zip"
        }),
    )
    .await;
    assert_eq!(both.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_rejects_unknown_dialect() {
    let test_app = build_test_app();
    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({"sql_content": "SELECT 1", "dialect": "klingon"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn batch_requires_archive_ref() {
    let test_app = build_test_app();
    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({"file_refs": ["a.sql", "b.sql"]}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_batch_list_is_rejected() {
    let test_app = build_test_app();
    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({"file_refs": [], "archive_ref": "uploads/empty.zip"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn all_invalid_batch_refs_yield_a_failed_job() {
    let test_app = build_test_app();

    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({
            "file_refs": ["notes.txt", "readme.md"],
            "archive_ref": "uploads/junk.zip"
        }),
    )
    .await;
    // The submission is accepted; the failure is a job-level outcome.
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let job_id = created["data"]["job_id"].as_str().unwrap().to_string();

    let response = get(test_app.app.clone(), &format!("/api/v1/jobs/{job_id}")).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "FAILED");
    assert_eq!(json["data"]["tasks"]["total"], 0);
    assert!(json["data"]["error"].as_str().unwrap().contains("no usable SQL"));
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let test_app = build_test_app();
    let response = get(
        test_app.app.clone(),
        "/api/v1/jobs/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_summaries_paginate() {
    let test_app = build_test_app();

    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({
            "file_refs": ["a.sql", "b.sql", "c.sql"],
            "archive_ref": "uploads/three.zip"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let job_id = created["data"]["job_id"].as_str().unwrap().to_string();

    let response = get(
        test_app.app.clone(),
        &format!("/api/v1/jobs/{job_id}?limit=2&offset=2"),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["tasks"]["total"], 3);
    assert_eq!(json["data"]["tasks"]["limit"], 2);
    assert_eq!(json["data"]["tasks"]["offset"], 2);
    assert_eq!(json["data"]["tasks"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"]["tasks"]["items"][0]["file_name"], "c.sql");
}

#[tokio::test]
async fn single_submission_runs_to_completion() {
    let test_app = build_test_app();
    let cancel = spawn_pipeline(&test_app).await;

    let response = post_json(
        test_app.app.clone(),
        "/api/v1/jobs",
        json!({"sql_content": "SELECT 1", "dialect": "postgres"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let job_id = created["data"]["job_id"].as_str().unwrap().to_string();

    let json = wait_for_job_status(&test_app, &job_id, "COMPLETED").await;
    assert_eq!(json["data"]["tasks"]["items"][0]["status"], "SUCCESS");
    assert!(json["data"]["tasks"]["items"][0]["result_ref"].is_string());

    cancel.cancel();
}
