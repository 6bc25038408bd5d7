//! HTTP API handlers for smartbin-hub

pub mod buildinfo;
pub mod health;
pub mod items;
pub mod sse;

pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use items::{get_latest, post_item};
pub use sse::event_stream;
