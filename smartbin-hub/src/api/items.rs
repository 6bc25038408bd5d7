//! Item ingestion and latest-state endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::AppState;

/// Acknowledgement or rejection body
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// POST /api/item - accept one item from a producer
///
/// The body is read raw rather than through `Json<Item>` so a malformed
/// payload is answered with our own reason string instead of axum's
/// extractor rejection.
pub async fn post_item(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<StatusResponse>) {
    match state.endpoint.submit_json(&body) {
        Ok(_) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: "success".to_string(),
                message: "Item received".to_string(),
            }),
        ),
        Err(reason) => (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                status: "error".to_string(),
                message: reason.to_string(),
            }),
        ),
    }
}

/// GET /api/latest - most recent item, for clients that poll
pub async fn get_latest(State(state): State<AppState>) -> Response {
    match state.hub.latest() {
        Some(item) => Json(&*item).into_response(),
        None => Json(json!({ "status": "no_data" })).into_response(),
    }
}
