//! Item sinks
//!
//! Where finished items go. `HttpSink` posts to a remote hub's ingestion
//! surface; `LocalSink` hands items straight to an in-process
//! `IngestEndpoint`. Both honour the same accept/reject contract, and
//! neither retries.

use crate::error::SinkError;
use serde::Deserialize;
use smartbin_common::Item;
use smartbin_hub::IngestEndpoint;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default ingestion URL of a hub on the same machine
pub const DEFAULT_HUB_URL: &str = "http://localhost:5000/api/item";

pub trait ItemSink: Send + Sync + 'static {
    /// Hand one item to the hub; `Ok` once the hub accepted it
    fn submit(&self, item: Item) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn describe(&self) -> String;
}

/// Posts items as JSON to a hub's `/api/item`
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

/// Rejection body returned by the hub
#[derive(Debug, Deserialize)]
struct HubResponse {
    message: String,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ItemSink for HttpSink {
    async fn submit(&self, item: Item) -> Result<(), SinkError> {
        let response = self.client.post(&self.url).json(&item).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == reqwest::StatusCode::BAD_REQUEST {
            let reason = response
                .json::<HubResponse>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(SinkError::Rejected(reason));
        }
        Err(SinkError::Status(status.as_u16()))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Submits to a hub living in the same process
pub struct LocalSink {
    endpoint: IngestEndpoint,
}

impl LocalSink {
    pub fn new(endpoint: IngestEndpoint) -> Self {
        Self { endpoint }
    }
}

impl ItemSink for LocalSink {
    async fn submit(&self, item: Item) -> Result<(), SinkError> {
        self.endpoint
            .submit(item)
            .map(|report| debug!("Delivered to {} subscribers", report.delivered))
            .map_err(|reason| SinkError::Rejected(reason.to_string()))
    }

    fn describe(&self) -> String {
        "in-process hub".to_string()
    }
}

/// Outcome of a forwarder run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub sent: u64,
    pub failed: u64,
}

/// Drain `items` into `sink` until every sender is gone
///
/// Failures are logged and the item discarded.
pub async fn forward_items<S: ItemSink>(sink: S, mut items: mpsc::Receiver<Item>) -> ForwardStats {
    info!("Forwarding items to {}", sink.describe());
    let mut stats = ForwardStats::default();
    while let Some(item) = items.recv().await {
        let label = item.label();
        match sink.submit(item).await {
            Ok(()) => {
                stats.sent += 1;
                debug!("Sent {} to {}", label, sink.describe());
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Failed to send {} to {}: {}", label, sink.describe(), e);
            }
        }
    }
    info!("Item forwarder finished: {} sent, {} failed", stats.sent, stats.failed);
    stats
}
