//! Error taxonomy shared by the journal managers and the HTTP layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    /// No signed-in user; the action is refused, never retried.
    #[error("You must be signed in to do that")]
    NotAuthenticated,

    /// Credentials did not match a known user.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    /// Generative endpoint failure. The message is safe to show to users.
    #[error("{0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl JournalError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

pub type JournalResult<T> = Result<T, JournalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = JournalError::not_found("Draft dream", "abc");
        assert_eq!(err.to_string(), "Draft dream 'abc' not found");
    }

    #[test]
    fn anyhow_errors_convert_to_storage() {
        let err: JournalError = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, JournalError::Storage(_)));
    }
}
