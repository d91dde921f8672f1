use std::sync::Arc;

use sqlcheck_core::repo::Repository;
use sqlcheck_pipeline::Dispatcher;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job/task state, backend chosen at startup.
    pub repo: Arc<dyn Repository>,
    /// Submission intake into the pipeline.
    pub dispatcher: Arc<Dispatcher>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
