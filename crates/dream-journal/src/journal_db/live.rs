//! Live lists: a stream of full snapshots, each annotated with its diff
//! against the previous snapshot sent on the same stream.
use std::collections::HashMap;
use std::sync::Arc;

use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::journal_db::schema::{Collection, Document, Namespace};
use crate::journal_db::JournalDatabase;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl SnapshotDiff {
    pub fn between(previous: &[Document], current: &[Document]) -> Self {
        let before: HashMap<&str, &Document> = previous.iter().map(|d| (d.id.as_str(), d)).collect();
        let mut diff = SnapshotDiff::default();

        for document in current {
            match before.get(document.id.as_str()) {
                None => diff.added.push(document.id.clone()),
                Some(old) if old.data != document.data => diff.modified.push(document.id.clone()),
                Some(_) => {}
            }
        }

        let after: HashMap<&str, ()> = current.iter().map(|d| (d.id.as_str(), ())).collect();
        diff.removed = previous
            .iter()
            .filter(|d| !after.contains_key(d.id.as_str()))
            .map(|d| d.id.clone())
            .collect();

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub version: u64,
    pub documents: Vec<Document>,
    pub diff: SnapshotDiff,
}

/// Full snapshot on subscribe, then one snapshot per change touching any of
/// `watch` in `namespace`. `fetch` re-reads the list from scratch each time.
/// Unchanged re-reads are not emitted.
pub fn live_list<F>(
    db: Arc<JournalDatabase>,
    namespace: Namespace,
    watch: Vec<Collection>,
    fetch: F,
) -> impl Stream<Item = anyhow::Result<LiveSnapshot>>
where
    F: Fn(&JournalDatabase) -> anyhow::Result<Vec<Document>> + Send + 'static,
{
    // Subscribe before the first read so no change slips between them.
    let mut rx = db.changes().subscribe();

    async_stream::try_stream! {
        let mut version = 0u64;
        let mut previous: Vec<Document> = Vec::new();

        let initial = fetch(&db)?;
        let diff = SnapshotDiff::between(&previous, &initial);
        previous = initial.clone();
        yield LiveSnapshot { version, documents: initial, diff };

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if event.namespace != namespace || !watch.contains(&event.path.collection) {
                        continue;
                    }
                    debug!("Live list for {} refreshing after change #{}", namespace, event.seq);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Live list subscriber lagged; refreshing from store");
                }
                Err(RecvError::Closed) => break,
            }

            let current = fetch(&db)?;
            let diff = SnapshotDiff::between(&previous, &current);
            if diff.is_empty() {
                continue;
            }
            version += 1;
            previous = current.clone();
            yield LiveSnapshot { version, documents: current, diff };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal_db::schema::{CollectionPath, DailyEvent, Query};
    use chrono::Utc;
    use futures::StreamExt;

    fn doc(id: &str, text: &str) -> Document {
        let mut data = serde_json::Map::new();
        data.insert("eventText".to_string(), serde_json::json!(text));
        Document { id: id.to_string(), timestamp: Utc::now(), data }
    }

    #[test]
    fn diff_reports_added_modified_and_removed() {
        let previous = vec![doc("a", "one"), doc("b", "two"), doc("c", "three")];
        let current = vec![doc("a", "one"), doc("b", "TWO"), doc("d", "four")];

        let diff = SnapshotDiff::between(&previous, &current);
        assert_eq!(diff.added, vec!["d"]);
        assert_eq!(diff.modified, vec!["b"]);
        assert_eq!(diff.removed, vec!["c"]);
    }

    #[test]
    fn identical_snapshots_have_empty_diff() {
        let docs = vec![doc("a", "one")];
        assert!(SnapshotDiff::between(&docs, &docs).is_empty());
    }

    #[tokio::test]
    async fn stream_emits_initial_and_changed_snapshots() {
        let db = Arc::new(JournalDatabase::new_in_memory().unwrap());
        let ns = Namespace::new("app", "u1");
        let fetch_ns = ns.clone();

        let stream = live_list(db.clone(), ns.clone(), vec![Collection::DailyEvents], move |db| {
            db.documents.query_raw(
                &fetch_ns,
                &CollectionPath::root(Collection::DailyEvents),
                &Query::newest_first().limit(10),
            )
        });
        futures::pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.version, 0);
        assert!(first.documents.is_empty());

        // Another user's write must not wake this stream with a change.
        db.documents
            .create(&Namespace::new("app", "u2"), None, DailyEvent {
                event_text: "elsewhere".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        let mine = db
            .documents
            .create(&ns, None, DailyEvent { event_text: "coffee".to_string(), timestamp: Utc::now() })
            .unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.version, 1);
        assert_eq!(second.documents.len(), 1);
        assert_eq!(second.diff.added, vec![mine.id]);
    }
}
