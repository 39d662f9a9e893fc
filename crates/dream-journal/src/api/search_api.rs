//! Search endpoint and the match-selection endpoints.
//!
//! Search scans the caller's archived dreams and daily events for a
//! case-insensitive substring inside a time window. The match selection
//! lives in the caller's session context until it is confirmed or cleared.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use super::error::ApiResult;
use super::session::CurrentSession;
use crate::journal::{MatchSelection, SearchResults, SelectionTarget, TimeScope};
use crate::journal_db::{ArchivedDream, Stored};
use crate::shared_state::UnifiedAppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectionRequest {
    pub target: SelectionTarget,
    pub id: String,
    #[serde(default = "default_checked")]
    pub checked: bool,
}

fn default_checked() -> bool {
    true
}

pub async fn search(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResults>> {
    let scope: TimeScope = params.scope.as_deref().unwrap_or("all").parse()?;
    debug!("Search for '{}' within {:?}", params.q, scope);
    Ok(Json(state.search.search(&session.namespace(), &params.q, scope)?))
}

pub async fn get_selection(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> Json<MatchSelection> {
    Json(state.session_snapshot(&session.session_key).selection)
}

pub async fn update_selection(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Json(req): Json<SelectionRequest>,
) -> Json<MatchSelection> {
    let selection = state.with_session(&session.session_key, |ctx| {
        ctx.selection.set(req.target, &req.id, req.checked);
        ctx.selection.clone()
    });
    Json(selection)
}

pub async fn clear_selection(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> Json<MatchSelection> {
    state.with_session(&session.session_key, |ctx| ctx.selection.clear());
    Json(MatchSelection::default())
}

/// Write the match and clear the selection on success.
pub async fn confirm_selection(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Stored<ArchivedDream>>> {
    let selection = state.session_snapshot(&session.session_key).selection;
    let matched = state.search.confirm_match(&session.namespace(), &selection)?;
    state.with_session(&session.session_key, |ctx| ctx.selection.clear());
    Ok(Json(matched))
}
