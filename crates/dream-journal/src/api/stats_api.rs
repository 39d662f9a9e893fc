use axum::extract::State;
use axum::Json;

use super::error::ApiResult;
use super::session::CurrentSession;
use crate::journal::JournalStats;
use crate::shared_state::UnifiedAppState;

/// Presence counts and top terms over the caller's archived dreams.
pub async fn get_stats(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<JournalStats>> {
    Ok(Json(state.stats.collect(&session.namespace())?))
}
