//! Server-Sent Events subscription surface
//!
//! Each connection registers one hub subscriber. The cached item (if any)
//! is the first event; every later item follows in ingestion order. When
//! the client disconnects axum drops the stream, and with it the
//! subscription, which unregisters itself.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

/// SSE event name carried by every pushed item
pub const NEW_ITEM_EVENT: &str = "new_item";

/// GET /api/events - SSE item stream
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();
    debug!("New SSE client connected as subscriber {}", subscription.id());

    let stream = subscription.filter_map(|item| async move {
        match Event::default().event(NEW_ITEM_EVENT).json_data(&*item) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!("Failed to serialize item for SSE: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
