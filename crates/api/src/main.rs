use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlcheck_api::config::ServerConfig;
use sqlcheck_api::router;
use sqlcheck_api::state::AppState;
use sqlcheck_core::analyze::{PassthroughAnalyzer, SqlAnalyzer};
use sqlcheck_core::lock::{LockProvider, MemoryLockProvider};
use sqlcheck_core::repo::Repository;
use sqlcheck_core::storage::{FileStore, FsStore};
use sqlcheck_db::{MemoryRepository, PgLockProvider, PgQueueBus, PgRepository};
use sqlcheck_events::bus::EventBus;
use sqlcheck_events::InProcessBus;
use sqlcheck_pipeline::{Aggregator, Dispatcher, Sweeper, Worker};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlcheck=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    // --- Backends ---
    // With DATABASE_URL set, all three capabilities run on PostgreSQL
    // and workers may live in other processes. Without it the service
    // runs self-contained on the in-memory backends.
    let (repo, bus, locks): (Arc<dyn Repository>, Arc<dyn EventBus>, Arc<dyn LockProvider>) =
        match std::env::var("DATABASE_URL") {
            Ok(database_url) => {
                let pool = sqlcheck_db::create_pool(&database_url)
                    .await
                    .expect("Failed to connect to database");
                sqlcheck_db::health_check(&pool)
                    .await
                    .expect("Database health check failed");
                sqlcheck_db::run_migrations(&pool)
                    .await
                    .expect("Failed to run database migrations");
                tracing::info!("PostgreSQL backends ready");
                (
                    Arc::new(PgRepository::new(pool.clone())),
                    Arc::new(PgQueueBus::new(pool.clone())),
                    Arc::new(PgLockProvider::new(pool)),
                )
            }
            Err(_) => {
                tracing::warn!(
                    "DATABASE_URL not set; running self-contained on in-memory backends"
                );
                (
                    Arc::new(MemoryRepository::new()),
                    Arc::new(InProcessBus::default()),
                    Arc::new(MemoryLockProvider::new()),
                )
            }
        };

    let store: Arc<dyn FileStore> = Arc::new(FsStore::new(&config.storage_root));
    let analyzer: Arc<dyn SqlAnalyzer> = Arc::new(PassthroughAnalyzer);

    // --- Pipeline components ---
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&repo),
        Arc::clone(&bus),
        Arc::clone(&store),
        config.engine.clone(),
    ));
    let aggregator = Arc::new(Aggregator::new(Arc::clone(&repo), Arc::clone(&bus)));

    let cancel = CancellationToken::new();
    let mut background = Vec::new();

    for index in 0..config.aggregator_concurrency {
        let aggregator = Arc::clone(&aggregator);
        let cancel = cancel.clone();
        background.push(tokio::spawn(async move {
            if let Err(e) = aggregator.run(cancel).await {
                tracing::error!(index, error = %e, "Aggregator consumer exited with error");
            }
        }));
    }

    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into());
    let pid = std::process::id();
    for index in 0..config.worker_concurrency {
        let worker = Worker::new(
            Arc::clone(&repo),
            Arc::clone(&bus),
            Arc::clone(&locks),
            Arc::clone(&store),
            Arc::clone(&analyzer),
            config.engine.clone(),
            format!("worker-{hostname}-{pid}-{index}"),
        );
        let cancel = cancel.clone();
        background.push(tokio::spawn(async move {
            if let Err(e) = worker.run(cancel).await {
                tracing::error!(index, error = %e, "Worker exited with error");
            }
        }));
    }

    let sweeper = Sweeper::new(
        Arc::clone(&repo),
        Arc::clone(&locks),
        Arc::clone(&aggregator),
        config.engine.clone(),
    );
    {
        let cancel = cancel.clone();
        background.push(tokio::spawn(async move {
            sweeper.run(cancel).await;
        }));
    }

    tracing::info!(
        workers = config.worker_concurrency,
        aggregators = config.aggregator_concurrency,
        "Pipeline started",
    );

    // --- App state & router ---
    let state = AppState {
        repo,
        dispatcher,
        config: Arc::new(config.clone()),
    };

    let request_id_header = HeaderName::from_static("x-request-id");

    let app = router::build(state)
        // -- Middleware stack (applied bottom-up) --
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(build_cors_layer(&config));

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    for handle in background {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
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
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid; a
/// misconfigured deployment should fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{origin}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}
