//! Ingestion endpoint
//!
//! Single entry point for items, whether they come from an in-process
//! detector or from a remote producer over HTTP. Payloads are shape-checked
//! before the hub is touched; a rejected payload leaves the latest slot and
//! every subscriber exactly as they were.

use crate::hub::{BroadcastHub, IngestReport};
use smartbin_common::{Item, RejectReason};
use std::sync::Arc;
use tracing::{info, warn};

/// Validates items and forwards them to the hub
#[derive(Clone)]
pub struct IngestEndpoint {
    hub: Arc<BroadcastHub>,
}

impl IngestEndpoint {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self { hub }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Submit an already-typed item
    pub fn submit(&self, item: Item) -> Result<IngestReport, RejectReason> {
        if let Err(reason) = item.validate() {
            warn!("Rejected item: {}", reason);
            return Err(reason);
        }
        info!("Received item: {}", item.label());
        Ok(self.hub.ingest(item))
    }

    /// Submit a raw JSON request body
    pub fn submit_json(&self, body: &[u8]) -> Result<IngestReport, RejectReason> {
        match Item::from_json_slice(body) {
            Ok(item) => self.submit(item),
            Err(reason) => {
                match &reason {
                    RejectReason::InvalidJson(detail) => {
                        warn!("Rejected item: {} ({})", reason, detail)
                    }
                    _ => warn!("Rejected item: {}", reason),
                }
                Err(reason)
            }
        }
    }
}
