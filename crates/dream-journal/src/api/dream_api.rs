//! Draft and archived dream endpoints
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use super::error::ApiResult;
use super::session::CurrentSession;
use crate::analysis::AnalysisView;
use crate::error::JournalError;
use crate::journal::{ArchivedDreamDetail, DraftChanges};
use crate::journal_db::{ArchivedDream, DraftDream, Stored};
use crate::shared_state::UnifiedAppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveDraftRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub dream_text: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub dream_title: String,
    #[serde(default)]
    pub is_pre_analyzed: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDraftRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub dream_text: Option<String>,
    #[validate(length(max = 200))]
    pub dream_title: Option<String>,
    pub is_pre_analyzed: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRequest {
    #[serde(default)]
    pub matched_reality_event: String,
}

pub async fn list_drafts(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Vec<Stored<DraftDream>>>> {
    Ok(Json(state.dreams.list_drafts(&session.namespace())?))
}

/// The draft this session last saved or edited.
pub async fn current_draft(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Stored<DraftDream>>> {
    let current = state.session_snapshot(&session.session_key).current_draft_id;
    let Some(draft_id) = current else {
        return Err(JournalError::not_found("Current draft", "none").into());
    };
    Ok(Json(state.dreams.get_draft(&session.namespace(), &draft_id)?))
}

pub async fn save_draft(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Json(req): Json<SaveDraftRequest>,
) -> ApiResult<(StatusCode, Json<Stored<DraftDream>>)> {
    req.validate()?;
    let draft = state
        .dreams
        .save_draft(&session.namespace(), &req.dream_text, &req.dream_title, req.is_pre_analyzed)?;
    state.with_session(&session.session_key, |ctx| ctx.current_draft_id = Some(draft.id.clone()));
    Ok((StatusCode::CREATED, Json(draft)))
}

pub async fn update_draft(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
    Json(req): Json<UpdateDraftRequest>,
) -> ApiResult<Json<Stored<DraftDream>>> {
    req.validate()?;
    let draft = state.dreams.update_draft(&session.namespace(), &id, DraftChanges {
        dream_text: req.dream_text,
        dream_title: req.dream_title,
        is_pre_analyzed: req.is_pre_analyzed,
    })?;
    state.with_session(&session.session_key, |ctx| ctx.current_draft_id = Some(draft.id.clone()));
    Ok(Json(draft))
}

pub async fn delete_draft(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.dreams.delete_draft(&session.namespace(), &id)?;
    state.forget_document(&session.session_key, &id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn analyze_draft(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ArchivedDreamDetail>)> {
    let archived = state.dreams.analyze_and_archive(&session.namespace(), &id).await?;
    state.forget_document(&session.session_key, &id);
    let analysis = AnalysisView::render(&archived.data.analysis_text);
    Ok((StatusCode::CREATED, Json(ArchivedDreamDetail { dream: archived, analysis })))
}

pub async fn list_archived(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Vec<Stored<ArchivedDream>>>> {
    Ok(Json(state.dreams.list_archived(&session.namespace())?))
}

pub async fn get_archived(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> ApiResult<Json<ArchivedDreamDetail>> {
    Ok(Json(state.dreams.archived_detail(&session.namespace(), &id)?))
}

pub async fn delete_archived(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.dreams.delete_archived(&session.namespace(), &id)?;
    state.forget_document(&session.session_key, &id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_match(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
    Json(req): Json<MatchRequest>,
) -> ApiResult<Json<Stored<ArchivedDream>>> {
    Ok(Json(state.dreams.set_match(&session.namespace(), &id, &req.matched_reality_event)?))
}
