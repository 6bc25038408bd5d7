//! Broadcast hub: latest-item cache plus per-subscriber fan-out
//!
//! The hub owns two pieces of shared state, the `latest` slot and the
//! subscriber registry, and mutates both under a single lock so `ingest` and
//! `subscribe` never observe each other half-done. A subscriber joining
//! during an ingest therefore sees either the old latest item followed by the
//! new one, or only the new one, never a gap or a duplicate.
//!
//! Every subscriber gets its own bounded channel. Delivery is `try_send`, so
//! a slow or vanished subscriber costs `ingest` nothing: it is unregistered
//! on the spot and its stream ends, which tears down the connection.

use futures::stream::Stream;
use smartbin_common::Item;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default per-subscriber buffer depth
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 32;

/// Items are shared between subscribers rather than cloned; the image payload
/// is the bulk of each one.
pub type SharedItem = Arc<Item>;

/// Outcome of one `ingest` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Subscribers the item was queued for
    pub delivered: usize,
    /// Subscribers unregistered because delivery failed
    pub dropped: Vec<Uuid>,
}

struct HubInner {
    latest: Option<SharedItem>,
    subscribers: HashMap<Uuid, mpsc::Sender<SharedItem>>,
}

/// Caches the most recent item and fans new items out to live subscribers
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    buffer: usize,
    ingested_total: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub whose subscribers each buffer up to `buffer` items
    ///
    /// A buffer of zero is raised to one; the cached item must always fit.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        info!("Broadcast hub initialized with subscriber buffer {}", buffer);
        Self {
            inner: Mutex::new(HubInner {
                latest: None,
                subscribers: HashMap::new(),
            }),
            buffer,
            ingested_total: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        // Nothing inside the critical sections can leave HubInner inconsistent,
        // so a poisoned lock is still safe to use.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the latest item and deliver it to every registered subscriber
    pub fn ingest(&self, item: Item) -> IngestReport {
        let item: SharedItem = Arc::new(item);
        let mut inner = self.lock();
        inner.latest = Some(Arc::clone(&item));
        self.ingested_total.fetch_add(1, Ordering::Relaxed);

        let mut report = IngestReport::default();
        for (id, tx) in inner.subscribers.iter() {
            match tx.try_send(Arc::clone(&item)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber {} is not keeping up, disconnecting", id);
                    report.dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Subscriber {} already disconnected", id);
                    report.dropped.push(*id);
                }
            }
        }
        for id in &report.dropped {
            inner.subscribers.remove(id);
        }

        debug!(
            "Ingested {} -> {} subscribers ({} dropped)",
            item.label(),
            report.delivered,
            report.dropped.len()
        );
        report
    }

    /// Register a new subscriber
    ///
    /// If an item is cached it is queued to the new subscriber before the
    /// registry lock is released, so it always arrives first.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        let mut inner = self.lock();
        if let Some(latest) = &inner.latest {
            // Fresh channel with capacity >= 1: cannot be full or closed
            let _ = tx.try_send(Arc::clone(latest));
        }
        inner.subscribers.insert(id, tx);
        let count = inner.subscribers.len();
        drop(inner);

        info!("Subscriber {} joined ({} active)", id, count);
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber; returns whether it was still registered
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        let removed = self.lock().subscribers.remove(&id).is_some();
        if removed {
            info!("Subscriber {} left", id);
        }
        removed
    }

    /// Copy of the cached item, if any
    pub fn latest(&self) -> Option<SharedItem> {
        self.lock().latest.clone()
    }

    /// Per-subscriber buffer, after the zero adjustment
    pub fn subscriber_buffer(&self) -> usize {
        self.buffer
    }

    /// Number of currently registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Items ingested since startup
    pub fn ingested_total(&self) -> u64 {
        self.ingested_total.load(Ordering::Relaxed)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// Handle for one registered subscriber
///
/// Yields items in ingestion order. Dropping the handle unregisters it; the
/// stream ends once the hub has unregistered it after a delivery failure.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<SharedItem>,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next item; `None` once the hub has dropped this subscriber
    pub async fn recv(&mut self) -> Option<SharedItem> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for tests and polling consumers
    pub fn try_recv(&mut self) -> Option<SharedItem> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = SharedItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(label: &str) -> Item {
        Item {
            item_type: label.to_string(),
            class: "Plastic".to_string(),
            bin: "BIN-001".to_string(),
            weight: "1.00 kg".to_string(),
            recyclable: true,
            image: String::new(),
            timestamp: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_new_hub_is_empty() {
        let hub = BroadcastHub::new(4);
        assert!(hub.latest().is_none());
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.ingested_total(), 0);
    }

    #[test]
    fn test_ingest_without_subscribers_updates_latest() {
        let hub = BroadcastHub::new(4);
        let report = hub.ingest(item("X"));
        assert_eq!(report, IngestReport::default());
        assert_eq!(hub.latest().unwrap().item_type, "X");
        assert_eq!(hub.ingested_total(), 1);
    }

    #[test]
    fn test_subscribe_to_empty_hub_receives_nothing() {
        let hub = Arc::new(BroadcastHub::new(4));
        let mut sub = hub.subscribe();
        assert!(sub.try_recv().is_none());

        hub.ingest(item("X"));
        assert_eq!(sub.try_recv().unwrap().item_type, "X");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_subscribe_receives_cached_item_first() {
        let hub = Arc::new(BroadcastHub::new(4));
        hub.ingest(item("old"));
        hub.ingest(item("X"));

        let mut sub = hub.subscribe();
        hub.ingest(item("Y"));

        assert_eq!(sub.try_recv().unwrap().item_type, "X");
        assert_eq!(sub.try_recv().unwrap().item_type, "Y");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let hub = Arc::new(BroadcastHub::new(4));
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_dropping_subscription_unregisters() {
        let hub = Arc::new(BroadcastHub::new(4));
        let sub = hub.subscribe();
        let _other = hub.subscribe();
        drop(sub);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_full_subscriber_dropped_others_unaffected() {
        let hub = Arc::new(BroadcastHub::new(1));
        let stalled = hub.subscribe();
        let mut healthy = hub.subscribe();

        let first = hub.ingest(item("A"));
        assert_eq!(first.delivered, 2);
        assert_eq!(healthy.try_recv().unwrap().item_type, "A");

        // `stalled` never drained its single slot
        let second = hub.ingest(item("B"));
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, vec![stalled.id()]);
        assert_eq!(healthy.try_recv().unwrap().item_type, "B");
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_zero_buffer_still_holds_cached_item() {
        let hub = Arc::new(BroadcastHub::new(0));
        hub.ingest(item("X"));
        let mut sub = hub.subscribe();
        assert_eq!(sub.try_recv().unwrap().item_type, "X");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_stream_ends() {
        let hub = Arc::new(BroadcastHub::new(1));
        let mut sub = hub.subscribe();
        hub.ingest(item("A"));
        hub.ingest(item("B"));

        // "A" was queued before the overflow; after it the stream is closed
        assert_eq!(sub.recv().await.unwrap().item_type, "A");
        assert!(sub.recv().await.is_none());
    }
}
