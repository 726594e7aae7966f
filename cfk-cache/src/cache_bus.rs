//! Process-wide cache-invalidation pub/sub.
//!
//! The facade publishes one event after every successful mutation;
//! subscribers (the URL cache, the metadata cache) evict whatever subset
//! of the event applies to them. Delivery is best-effort -- a lagging
//! subscriber drops the oldest events rather than blocking the publisher.

use cfk_core::VirtualPath;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct CacheInvalidation {
    pub mount_id: String,
    pub storage_config_id: String,
    pub paths: Vec<VirtualPath>,
    pub reason: InvalidationReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    Create,
    Write,
    Delete,
    Rename,
    Copy,
    Mkdir,
}

pub struct CacheBus {
    sender: broadcast::Sender<CacheInvalidation>,
}

impl CacheBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Fire-and-forget: no receivers is not an error, it just means
    /// nothing is currently interested.
    pub fn publish(&self, event: CacheInvalidation) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheInvalidation> {
        self.sender.subscribe()
    }
}

impl Default for CacheBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = CacheBus::new();
        let mut rx = bus.subscribe();
        bus.publish(CacheInvalidation {
            mount_id: "m1".into(),
            storage_config_id: "cfg1".into(),
            paths: vec![VirtualPath::new("/a/b.txt")],
            reason: InvalidationReason::Write,
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.mount_id, "m1");
        assert_eq!(event.paths.len(), 1);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = CacheBus::new();
        bus.publish(CacheInvalidation {
            mount_id: "m1".into(),
            storage_config_id: "cfg1".into(),
            paths: vec![],
            reason: InvalidationReason::Delete,
        });
    }
}
