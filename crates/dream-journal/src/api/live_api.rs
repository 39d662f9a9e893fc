//! Live lists over server-sent events.
//!
//! Each stream sends the full current list on connect, then a new full
//! snapshot (with its diff against the previous one) whenever the list
//! changes. Dropping the connection ends the stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use futures_util::StreamExt;
use tracing::{debug, error};

use super::error::ApiResult;
use super::session::CurrentSession;
use crate::error::JournalError;
use crate::journal_db::live::live_list;
use crate::journal_db::{Collection, CollectionPath, Conversation, JournalDatabase, Namespace, Query};
use crate::metrics;
use crate::shared_state::UnifiedAppState;

/// Lists a client can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveCollection {
    Drafts,
    Archived,
    Events,
    Chat,
}

impl LiveCollection {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "drafts" => Some(Self::Drafts),
            "archived" => Some(Self::Archived),
            "events" => Some(Self::Events),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }
}

/// Keeps the live-subscription gauge in step with open streams.
struct SubscriptionGuard;

impl SubscriptionGuard {
    fn open() -> Self {
        metrics::inc_live_subscriptions();
        Self
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        metrics::dec_live_subscriptions();
        debug!("Live subscription closed");
    }
}

fn active_chat_documents(db: &JournalDatabase, ns: &Namespace) -> anyhow::Result<Vec<crate::journal_db::Document>> {
    let mut open = db.documents.list::<Conversation>(
        ns,
        None,
        &Query::newest_first().where_eq("isArchived", false).limit(1),
    )?;
    match open.pop() {
        Some(conversation) => db.documents.query_raw(
            ns,
            &CollectionPath::child(Collection::ChatMessages, conversation.id),
            &Query::oldest_first(),
        ),
        None => Ok(Vec::new()),
    }
}

pub async fn live(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(collection): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let target = LiveCollection::parse(&collection)
        .ok_or_else(|| JournalError::not_found("Live collection", collection.as_str()))?;
    let db = state.database.clone();
    let ns = session.namespace();
    let fetch_ns = ns.clone();
    let recent_limit = state.reality.recent_limit();

    let snapshots = match target {
        LiveCollection::Drafts => live_list(db, ns, vec![Collection::DraftDreams], move |db| {
            db.documents
                .query_raw(&fetch_ns, &CollectionPath::root(Collection::DraftDreams), &Query::newest_first())
        })
        .boxed(),
        LiveCollection::Archived => live_list(db, ns, vec![Collection::ArchivedDreams], move |db| {
            db.documents
                .query_raw(&fetch_ns, &CollectionPath::root(Collection::ArchivedDreams), &Query::newest_first())
        })
        .boxed(),
        LiveCollection::Events => live_list(db, ns, vec![Collection::DailyEvents], move |db| {
            db.documents.query_raw(
                &fetch_ns,
                &CollectionPath::root(Collection::DailyEvents),
                &Query::newest_first().limit(recent_limit),
            )
        })
        .boxed(),
        LiveCollection::Chat => live_list(
            db,
            ns,
            vec![Collection::Conversations, Collection::ChatMessages],
            move |db| active_chat_documents(db, &fetch_ns),
        )
        .boxed(),
    };

    let guard = SubscriptionGuard::open();
    let events = snapshots.map(move |snapshot| {
        let _open = &guard;
        let event = match snapshot {
            Ok(snapshot) => Event::default()
                .event("snapshot")
                .id(snapshot.version.to_string())
                .json_data(&snapshot)
                .unwrap_or_else(|e| {
                    error!("Failed to encode live snapshot: {}", e);
                    Event::default().event("error").data("snapshot could not be encoded")
                }),
            Err(e) => {
                error!("Live list failed: {:#}", e);
                Event::default().event("error").data("live list unavailable")
            }
        };
        Ok(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
