//! Change notifications for live lists.
//!
//! Every mutation in the document store is published on a `tokio::broadcast`
//! channel. Live-list streams hold a receiver, filter by namespace and
//! collection path, and re-query on each matching event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::journal_db::schema::{CollectionPath, Namespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    pub kind: ChangeKind,
    pub namespace: Namespace,
    pub path: CollectionPath,
    pub document_id: String,
    pub timestamp_ms: i64,
}

impl ChangeEvent {
    pub fn concerns(&self, namespace: &Namespace, path: &CollectionPath) -> bool {
        &self.namespace == namespace && &self.path == path
    }
}

/// Cheap to clone (inner Arc via broadcast::Sender).
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
    seq: Arc<AtomicU64>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish a change. Dropped silently when nobody is listening.
    pub fn publish(&self, kind: ChangeKind, namespace: &Namespace, path: &CollectionPath, document_id: &str) {
        let event = ChangeEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            kind,
            namespace: namespace.clone(),
            path: path.clone(),
            document_id: document_id.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
        };
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal_db::schema::Collection;

    #[tokio::test]
    async fn subscribers_receive_events_in_order() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        let ns = Namespace::new("app", "u1");
        let path = CollectionPath::root(Collection::DailyEvents);

        feed.publish(ChangeKind::Created, &ns, &path, "a");
        feed.publish(ChangeKind::Deleted, &ns, &path, "a");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Created);
        assert_eq!(second.kind, ChangeKind::Deleted);
        assert!(second.seq > first.seq);
        assert!(first.concerns(&ns, &path));
        assert!(!first.concerns(&Namespace::new("app", "u2"), &path));
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let feed = ChangeFeed::new(1);
        assert_eq!(feed.subscriber_count(), 0);
        feed.publish(
            ChangeKind::Updated,
            &Namespace::new("app", "u1"),
            &CollectionPath::root(Collection::DraftDreams),
            "x",
        );
    }
}
