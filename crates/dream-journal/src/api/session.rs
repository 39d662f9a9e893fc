//! Session extraction: `Authorization: Bearer <token>` or the `session_id`
//! cookie.
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use super::error::ApiError;
use crate::auth::AuthUser;
use crate::error::JournalError;
use crate::journal_db::Namespace;
use crate::shared_state::UnifiedAppState;

pub const SESSION_COOKIE: &str = "session_id";

/// Signed-in caller of the current request.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub token: String,
    pub session_key: String,
    pub user: AuthUser,
}

impl CurrentSession {
    pub fn namespace(&self) -> Namespace {
        self.user.namespace()
    }
}

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

pub fn session_cookie(token: &str) -> [(axum::http::HeaderName, HeaderValue); 1] {
    let cookie = format!("{}={}; HttpOnly; Path=/; SameSite=Lax", SESSION_COOKIE, token);
    [(SET_COOKIE, HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static("")))]
}

pub fn expired_session_cookie() -> [(axum::http::HeaderName, HeaderValue); 1] {
    [(
        SET_COOKIE,
        HeaderValue::from_static("session_id=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
    )]
}

#[axum::async_trait]
impl FromRequestParts<UnifiedAppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &UnifiedAppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(ApiError(JournalError::NotAuthenticated))?;
        let (session_key, user) = state
            .auth
            .current_user(&token)
            .ok_or(ApiError(JournalError::NotAuthenticated))?;
        Ok(Self { token, session_key, user })
    }
}
