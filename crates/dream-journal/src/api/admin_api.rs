//! Health and administrative summary endpoints
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::atomic::Ordering;

use super::error::ApiResult;
use crate::journal_db::DatabaseStats;
use crate::shared_state::UnifiedAppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatsResponse {
    pub database: DatabaseStats,
    pub active_sessions: usize,
    pub session_contexts: usize,
    pub live_subscribers: usize,
    pub total_requests: usize,
    pub signed_out_sessions: usize,
}

pub async fn health(State(state): State<UnifiedAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ready: state.auth.is_ready(),
    })
}

/// Aggregate counts only; no per-user data.
pub async fn admin_stats(State(state): State<UnifiedAppState>) -> ApiResult<Json<AdminStatsResponse>> {
    Ok(Json(AdminStatsResponse {
        database: state.database.get_stats()?,
        active_sessions: state.auth.active_sessions(),
        session_contexts: state.sessions.len(),
        live_subscribers: state.database.changes().subscriber_count(),
        total_requests: state.counters.total_requests.load(Ordering::Relaxed),
        signed_out_sessions: state.counters.signed_out_sessions.load(Ordering::Relaxed),
    }))
}
