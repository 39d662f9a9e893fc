//! Sign-up, sign-in (password, federated, anonymous), sign-out and
//! sign-in state.
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::error::ApiResult;
use super::session::{expired_session_cookie, session_cookie, session_token, CurrentSession};
use crate::auth::{AuthUser, FederatedIdentity, SignedIn};
use crate::shared_state::UnifiedAppState;

pub const FEDERATION_SECRET_HEADER: &str = "x-federation-secret";

#[derive(Debug, Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FederatedRequest {
    #[validate(length(min = 1, max = 64))]
    pub provider: String,
    #[validate(length(min = 1, max = 256))]
    pub subject: String,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: AuthUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStateResponse {
    pub ready: bool,
    pub federation_enabled: bool,
    pub user: Option<AuthUser>,
}

fn signed_in(status: StatusCode, session: SignedIn) -> impl IntoResponse {
    let cookie = session_cookie(&session.token);
    (
        status,
        cookie,
        Json(SessionResponse { token: session.token, user: session.user }),
    )
}

pub async fn sign_up(
    State(state): State<UnifiedAppState>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let session = state.auth.sign_up(&req.email, &req.password).await?;
    info!("New account {}", session.user.user_id);
    Ok(signed_in(StatusCode::CREATED, session))
}

pub async fn sign_in(
    State(state): State<UnifiedAppState>,
    Json(req): Json<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let session = state.auth.sign_in(&req.email, &req.password).await?;
    Ok(signed_in(StatusCode::OK, session))
}

pub async fn sign_in_federated(
    State(state): State<UnifiedAppState>,
    headers: HeaderMap,
    Json(req): Json<FederatedRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let presented = headers
        .get(FEDERATION_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    let identity = FederatedIdentity {
        provider: req.provider,
        subject: req.subject,
        email: req.email,
    };
    let session = state.auth.sign_in_federated(presented, &identity)?;
    Ok(signed_in(StatusCode::OK, session))
}

pub async fn sign_in_anonymous(State(state): State<UnifiedAppState>) -> ApiResult<impl IntoResponse> {
    let session = state.auth.sign_in_anonymous()?;
    Ok(signed_in(StatusCode::CREATED, session))
}

pub async fn sign_out(State(state): State<UnifiedAppState>, session: CurrentSession) -> impl IntoResponse {
    state.auth.sign_out(&session.token);
    (StatusCode::NO_CONTENT, expired_session_cookie())
}

/// Readiness and the current user, if any. Never rejects.
pub async fn auth_state(State(state): State<UnifiedAppState>, headers: HeaderMap) -> Json<AuthStateResponse> {
    let user = session_token(&headers)
        .and_then(|token| state.auth.current_user(&token))
        .map(|(_, user)| user);
    Json(AuthStateResponse {
        ready: state.auth.is_ready(),
        federation_enabled: state.auth.federation_enabled(),
        user,
    })
}
