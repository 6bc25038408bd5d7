//! # SmartBin Common Library
//!
//! Shared code for the SmartBin services:
//! - Item event model and wire-shape validation
//! - Configuration loading (TOML bootstrap with graceful defaults)
//! - Error types
//! - Timestamp formatting

pub mod config;
pub mod error;
pub mod item;
pub mod time;

pub use error::{Error, Result};
pub use item::{Item, RejectReason};
