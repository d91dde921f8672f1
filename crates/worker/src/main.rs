//! Standalone worker-pool process.
//!
//! Consumes the durable PostgreSQL bus, so any number of these
//! processes can run beside the API service; coordination happens only
//! through the task locks and the persisted task status.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlcheck_core::analyze::{PassthroughAnalyzer, SqlAnalyzer};
use sqlcheck_core::lock::LockProvider;
use sqlcheck_core::repo::Repository;
use sqlcheck_core::storage::{FileStore, FsStore};
use sqlcheck_core::EngineConfig;
use sqlcheck_db::{PgLockProvider, PgQueueBus, PgRepository};
use sqlcheck_events::bus::EventBus;
use sqlcheck_pipeline::Worker;

/// Default worker consumers per process.
const DEFAULT_CONCURRENCY: usize = 4;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlcheck=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./data".into());
    let concurrency: usize = std::env::var("WORKER_CONCURRENCY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CONCURRENCY);
    let engine = EngineConfig::from_env();

    let pool = sqlcheck_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    sqlcheck_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    sqlcheck_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let repo: Arc<dyn Repository> = Arc::new(PgRepository::new(pool.clone()));
    let bus: Arc<dyn EventBus> = Arc::new(PgQueueBus::new(pool.clone()));
    let locks: Arc<dyn LockProvider> = Arc::new(PgLockProvider::new(pool));
    let store: Arc<dyn FileStore> = Arc::new(FsStore::new(&storage_root));
    let analyzer: Arc<dyn SqlAnalyzer> = Arc::new(PassthroughAnalyzer);

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into());
    let pid = std::process::id();

    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(concurrency);
    for index in 0..concurrency {
        let worker = Worker::new(
            Arc::clone(&repo),
            Arc::clone(&bus),
            Arc::clone(&locks),
            Arc::clone(&store),
            Arc::clone(&analyzer),
            engine.clone(),
            format!("worker-{hostname}-{pid}-{index}"),
        );
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = worker.run(cancel).await {
                tracing::error!(index, error = %e, "Worker exited with error");
            }
        }));
    }
    tracing::info!(concurrency, "Worker pool started");

    shutdown_signal().await;
    tracing::info!("Shutting down worker pool");

    cancel.cancel();
    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }
    tracing::info!("Worker pool stopped");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}
