use std::sync::Arc;

use modella_pipeline::PipelineController;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: modella_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Pipeline controller owning the sequential step loops.
    pub controller: Arc<PipelineController>,
}
