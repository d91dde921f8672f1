//! Shared fixture for the API integration suites.
//!
//! The app is built over the in-memory backends so the suites run
//! without PostgreSQL or any other external service.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use sqlcheck_api::config::ServerConfig;
use sqlcheck_api::router;
use sqlcheck_api::state::AppState;
use sqlcheck_core::analyze::{Dialect, PassthroughAnalyzer, SqlAnalyzer};
use sqlcheck_core::lock::{LockProvider, MemoryLockProvider};
use sqlcheck_core::repo::Repository;
use sqlcheck_core::retry::RetryPolicy;
use sqlcheck_core::storage::{FileStore, MemoryStore};
use sqlcheck_core::EngineConfig;
use sqlcheck_db::MemoryRepository;
use sqlcheck_events::bus::EventBus;
use sqlcheck_events::InProcessBus;
use sqlcheck_pipeline::{Aggregator, Dispatcher, Worker};

pub struct TestApp {
    pub app: Router,
    pub repo: Arc<MemoryRepository>,
    pub bus: Arc<InProcessBus>,
    pub locks: Arc<MemoryLockProvider>,
    pub store: Arc<MemoryStore>,
    pub config: Arc<ServerConfig>,
}

fn fast_engine() -> EngineConfig {
    EngineConfig {
        lock_ttl: Duration::from_secs(5),
        stall_after: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(10),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        default_dialect: Dialect::Ansi,
    }
}

pub fn build_test_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let bus = Arc::new(InProcessBus::default());
    let locks = Arc::new(MemoryLockProvider::new());
    let store = Arc::new(MemoryStore::new());

    let server_config = ServerConfig {
        engine: fast_engine(),
        ..ServerConfig::default()
    };

    let dispatcher = Arc::new(Dispatcher::new(
        repo.clone() as Arc<dyn Repository>,
        bus.clone() as Arc<dyn EventBus>,
        store.clone() as Arc<dyn FileStore>,
        server_config.engine.clone(),
    ));

    let config = Arc::new(server_config);
    let state = AppState {
        repo: repo.clone() as Arc<dyn Repository>,
        dispatcher,
        config: Arc::clone(&config),
    };

    TestApp {
        app: router::build(state),
        repo,
        bus,
        locks,
        store,
        config,
    }
}

/// Spawn a worker and an aggregator against the test app's bus; the
/// returned token stops both.
pub async fn spawn_pipeline(test_app: &TestApp) -> CancellationToken {
    let cancel = CancellationToken::new();

    let worker = Worker::new(
        test_app.repo.clone() as Arc<dyn Repository>,
        test_app.bus.clone() as Arc<dyn EventBus>,
        test_app.locks.clone() as Arc<dyn LockProvider>,
        test_app.store.clone() as Arc<dyn FileStore>,
        Arc::new(PassthroughAnalyzer) as Arc<dyn SqlAnalyzer>,
        test_app.config.engine.clone(),
        "worker-test-1",
    );
    let aggregator = Arc::new(Aggregator::new(
        test_app.repo.clone() as Arc<dyn Repository>,
        test_app.bus.clone() as Arc<dyn EventBus>,
    ));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = worker.run(cancel).await;
        });
    }
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = aggregator.run(cancel).await;
        });
    }

    // Give both consumers a moment to open their subscriptions before
    // anything is published.
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request"),
    )
    .await
    .expect("response")
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
    )
    .await
    .expect("response")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Poll the job view until it reaches the expected status or time out.
pub async fn wait_for_job_status(
    test_app: &TestApp,
    job_id: &str,
    expected: &str,
) -> serde_json::Value {
    for _ in 0..200 {
        let response = get(test_app.app.clone(), &format!("/api/v1/jobs/{job_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if json["data"]["status"] == expected {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached status {expected}");
}
