//! Daily events and the reality chat
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use super::error::ApiResult;
use super::session::CurrentSession;
use crate::journal::{ChatExchange, ConversationMessages};
use crate::journal_db::{ChatMessage, Conversation, DailyEvent, Stored};
use crate::shared_state::UnifiedAppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogEventRequest {
    #[validate(length(min = 1, max = 4000, message = "must be between 1 and 4000 characters"))]
    pub event_text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 8000, message = "must be between 1 and 8000 characters"))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImageRequest {
    #[validate(length(min = 1, max = 2000, message = "must be between 1 and 2000 characters"))]
    pub prompt: String,
}

pub async fn recent_events(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Vec<Stored<DailyEvent>>>> {
    Ok(Json(state.reality.recent_events(&session.namespace())?))
}

pub async fn log_event(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Json(req): Json<LogEventRequest>,
) -> ApiResult<(StatusCode, Json<Stored<DailyEvent>>)> {
    req.validate()?;
    let event = state.reality.log_event(&session.namespace(), &req.event_text)?;
    Ok((StatusCode::CREATED, Json(event)))
}

fn conversation_hint(state: &UnifiedAppState, session: &CurrentSession) -> Option<String> {
    state.session_snapshot(&session.session_key).active_conversation_id
}

fn remember_conversation(state: &UnifiedAppState, session: &CurrentSession, conversation_id: Option<String>) {
    state.with_session(&session.session_key, |ctx| ctx.active_conversation_id = conversation_id);
}

pub async fn active_chat(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<ConversationMessages>> {
    let hint = conversation_hint(&state, &session);
    let active = state.reality.active_messages(&session.namespace(), hint.as_deref())?;
    remember_conversation(&state, &session, active.conversation_id.clone());
    Ok(Json(active))
}

pub async fn send_message(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatExchange>> {
    req.validate()?;
    let hint = conversation_hint(&state, &session);
    let exchange = state
        .reality
        .send_message(&session.namespace(), hint.as_deref(), &req.text)
        .await?;
    remember_conversation(&state, &session, Some(exchange.conversation_id.clone()));
    Ok(Json(exchange))
}

pub async fn generate_image(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Json(req): Json<ImageRequest>,
) -> ApiResult<Json<ChatExchange>> {
    req.validate()?;
    let hint = conversation_hint(&state, &session);
    let exchange = state
        .reality
        .generate_image(&session.namespace(), hint.as_deref(), &req.prompt)
        .await?;
    remember_conversation(&state, &session, Some(exchange.conversation_id.clone()));
    Ok(Json(exchange))
}

pub async fn archive_chat(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Stored<Conversation>>> {
    let hint = conversation_hint(&state, &session);
    let archived = state.reality.archive_conversation(&session.namespace(), hint.as_deref())?;
    remember_conversation(&state, &session, None);
    Ok(Json(archived))
}

pub async fn list_conversations(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
) -> ApiResult<Json<Vec<Stored<Conversation>>>> {
    Ok(Json(state.reality.list_conversations(&session.namespace())?))
}

pub async fn conversation_messages(
    State(state): State<UnifiedAppState>,
    session: CurrentSession,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Stored<ChatMessage>>>> {
    Ok(Json(state.reality.messages(&session.namespace(), &id)?))
}
