//! Search over archived dreams and daily events within a time window, and
//! the single-dream/single-event selection used to record a match.
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::{JournalError, JournalResult};
use crate::journal_db::{ArchivedDream, DailyEvent, JournalDatabase, Namespace, Query, Stored};
use crate::utils::TextUtils;

const MATCH_DESCRIPTION_CHARS: usize = 280;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeScope {
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeScope {
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::Week => Some(7),
            Self::Month => Some(30),
            Self::Year => Some(365),
            Self::All => None,
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days().map(|days| now - Duration::days(days))
    }

    pub fn includes(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.cutoff(now) {
            Some(cutoff) => timestamp >= cutoff,
            None => true,
        }
    }
}

impl FromStr for TimeScope {
    type Err = JournalError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "7" | "week" => Ok(Self::Week),
            "30" | "month" => Ok(Self::Month),
            "365" | "year" => Ok(Self::Year),
            "" | "all" => Ok(Self::All),
            other => Err(JournalError::invalid(format!("Unknown time scope '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub dreams: Vec<Stored<ArchivedDream>>,
    pub events: Vec<Stored<DailyEvent>>,
}

/// Dreams whose title or text contains `term`, within `scope`, newest first.
pub fn filter_dreams(
    dreams: Vec<Stored<ArchivedDream>>,
    term: &str,
    scope: TimeScope,
    now: DateTime<Utc>,
) -> Vec<Stored<ArchivedDream>> {
    let term = term.trim().to_lowercase();
    let mut hits: Vec<_> = dreams
        .into_iter()
        .filter(|dream| scope.includes(dream.data.timestamp, now))
        .filter(|dream| {
            TextUtils::contains_ignore_case(&dream.data.dream_title, &term)
                || TextUtils::contains_ignore_case(&dream.data.dream_text, &term)
        })
        .collect();
    hits.sort_by(|a, b| b.data.timestamp.cmp(&a.data.timestamp));
    hits
}

pub fn filter_events(
    events: Vec<Stored<DailyEvent>>,
    term: &str,
    scope: TimeScope,
    now: DateTime<Utc>,
) -> Vec<Stored<DailyEvent>> {
    let term = term.trim().to_lowercase();
    let mut hits: Vec<_> = events
        .into_iter()
        .filter(|event| scope.includes(event.data.timestamp, now))
        .filter(|event| TextUtils::contains_ignore_case(&event.data.event_text, &term))
        .collect();
    hits.sort_by(|a, b| b.data.timestamp.cmp(&a.data.timestamp));
    hits
}

// ----------------------------------------------------------------------------
// Match selection
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionTarget {
    Dream,
    Event,
}

/// At most one dream and one event. Checking an item replaces whatever
/// was checked of the same kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSelection {
    pub dream_id: Option<String>,
    pub event_id: Option<String>,
}

impl MatchSelection {
    pub fn check(&mut self, target: SelectionTarget, id: &str) {
        let slot = self.slot(target);
        *slot = Some(id.to_string());
    }

    /// Unchecking an item that is not the checked one changes nothing.
    pub fn uncheck(&mut self, target: SelectionTarget, id: &str) {
        let slot = self.slot(target);
        if slot.as_deref() == Some(id) {
            *slot = None;
        }
    }

    pub fn set(&mut self, target: SelectionTarget, id: &str, checked: bool) {
        if checked {
            self.check(target, id);
        } else {
            self.uncheck(target, id);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_complete(&self) -> bool {
        self.dream_id.is_some() && self.event_id.is_some()
    }

    fn slot(&mut self, target: SelectionTarget) -> &mut Option<String> {
        match target {
            SelectionTarget::Dream => &mut self.dream_id,
            SelectionTarget::Event => &mut self.event_id,
        }
    }
}

/// Text written onto a dream's `matchedRealityEvent`.
pub fn describe_event(event: &DailyEvent) -> String {
    let text = TextUtils::normalize_whitespace(&event.event_text);
    format!(
        "{}: {}",
        event.timestamp.format("%a %d %b %Y"),
        TextUtils::truncate_with_ellipsis(&text, MATCH_DESCRIPTION_CHARS)
    )
}

pub struct SearchEngine {
    db: Arc<JournalDatabase>,
}

impl SearchEngine {
    pub fn new(db: Arc<JournalDatabase>) -> Self {
        Self { db }
    }

    /// An empty term matches every item inside the window.
    pub fn search(&self, ns: &Namespace, term: &str, scope: TimeScope) -> JournalResult<SearchResults> {
        let now = Utc::now();
        let dreams = self.db.documents.list::<ArchivedDream>(ns, None, &Query::newest_first())?;
        let events = self.db.documents.list::<DailyEvent>(ns, None, &Query::newest_first())?;

        Ok(SearchResults {
            dreams: filter_dreams(dreams, term, scope, now),
            events: filter_events(events, term, scope, now),
        })
    }

    /// Write the selected event's description onto the selected dream.
    pub fn confirm_match(&self, ns: &Namespace, selection: &MatchSelection) -> JournalResult<Stored<ArchivedDream>> {
        let (Some(dream_id), Some(event_id)) = (&selection.dream_id, &selection.event_id) else {
            return Err(JournalError::invalid("Select exactly one dream and one reality event to match"));
        };

        let event = self
            .db
            .documents
            .get::<DailyEvent>(ns, None, event_id)?
            .ok_or_else(|| JournalError::not_found("Daily event", event_id.as_str()))?;
        let description = describe_event(&event.data);

        let dream = self
            .db
            .documents
            .update::<ArchivedDream>(ns, None, dream_id, json!({ "matchedRealityEvent": description }))?
            .ok_or_else(|| JournalError::not_found("Archived dream", dream_id.as_str()))?;
        info!("Matched dream {} with event {}", dream_id, event_id);
        Ok(dream)
    }
}
