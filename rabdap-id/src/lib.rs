//! rabdap-id library interface
//!
//! Identity cache that mirrors person records from the campus directory
//! into SQLite, keeps a bounded history of changed fields, and serves
//! lookups over HTTP.

pub mod api;
pub mod db;
pub mod directory;
pub mod error;
pub mod sync;

pub use crate::error::{ApiError, ApiResult, SyncError, SyncResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::directory::DirectoryClient;
use crate::sync::RefreshPipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Cache store and directory behind the sync operations
    pub pipeline: Arc<RefreshPipeline>,
    /// Same client the pipeline uses; exposed for health reporting
    pub directory: Arc<DirectoryClient>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(pipeline: Arc<RefreshPipeline>) -> Self {
        let directory = Arc::clone(pipeline.directory());
        Self {
            pipeline,
            directory,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::identity_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
