//! Route configuration for the ingest API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers::{health_check, ingest, query, stream};
use crate::state::IngestState;

/// Create the ingest API router.
pub fn create_router(state: Arc<IngestState>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/query", get(query))
        .route("/stream", get(stream))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
