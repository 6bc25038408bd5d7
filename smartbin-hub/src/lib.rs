//! smartbin-hub library - item distribution service
//!
//! Accepts detected items over HTTP (or in-process), keeps the most recent
//! one, and pushes every new item to connected dashboards over SSE.

use axum::Router;
use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod server;

pub use error::{Error, Result};
pub use hub::{BroadcastHub, IngestReport, SharedItem, Subscription};
pub use ingest::IngestEndpoint;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub endpoint: IngestEndpoint,
}

impl AppState {
    /// Create new application state around an existing hub
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        let endpoint = IngestEndpoint::new(Arc::clone(&hub));
        Self { hub, endpoint }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/api/item", post(api::post_item))
        .route("/api/latest", get(api::get_latest))
        .route("/api/events", get(api::event_stream))
        .route("/api/buildinfo", get(api::get_build_info))
        .merge(api::health_routes())
        .with_state(state)
        // Dashboards are served from a different origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
