//! HTTP mapping of journal errors: `{ "error": message }` with a status
//! chosen by error kind.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::error::JournalError;

#[derive(Debug)]
pub struct ApiError(pub JournalError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            JournalError::NotAuthenticated | JournalError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            JournalError::Forbidden(_) => StatusCode::FORBIDDEN,
            JournalError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            JournalError::NotFound { .. } => StatusCode::NOT_FOUND,
            JournalError::Conflict(_) => StatusCode::CONFLICT,
            JournalError::Upstream(_) => StatusCode::BAD_GATEWAY,
            JournalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            JournalError::Storage(_) => "Something went wrong while accessing your journal".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<JournalError> for ApiError {
    fn from(err: JournalError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(JournalError::Storage(err))
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, problems)| {
                let reasons: Vec<String> = problems
                    .iter()
                    .map(|problem| {
                        problem
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| problem.code.to_string())
                    })
                    .collect();
                format!("{} ({})", field, reasons.join(", "))
            })
            .collect();
        Self(JournalError::invalid(format!("invalid {}", fields.join("; "))))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            JournalError::Storage(e) => error!("Storage failure: {:#}", e),
            JournalError::Upstream(message) => warn!("Upstream failure: {}", message),
            _ => {}
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
