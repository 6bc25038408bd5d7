//! Build information API endpoint
//!
//! Provides version and build metadata for display in the dashboard footer

use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

/// Build information response
#[derive(Debug, Serialize)]
pub struct BuildInfo {
    pub module: String,
    pub version: String,
    pub git_hash: String,
    pub build_timestamp: String,
    pub build_profile: String,
    /// Items each SSE subscriber may fall behind before it is dropped
    pub subscriber_buffer: usize,
}

/// GET /api/buildinfo
///
/// Returns build identification plus the hub's fan-out tuning
pub async fn get_build_info(State(state): State<AppState>) -> Json<BuildInfo> {
    Json(BuildInfo {
        module: "smartbin-hub".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
        subscriber_buffer: state.hub.subscriber_buffer(),
    })
}
