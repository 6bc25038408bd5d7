//! Timestamp utilities

use chrono::{DateTime, Local};

/// Wall-clock format used on every Item (`2025-10-26 14:30:45`)
pub const ITEM_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Get current local timestamp
pub fn now() -> DateTime<Local> {
    Local::now()
}

/// Format a moment the way Items carry it on the wire
pub fn format_item_timestamp(at: &DateTime<Local>) -> String {
    at.format(ITEM_TIMESTAMP_FORMAT).to_string()
}
