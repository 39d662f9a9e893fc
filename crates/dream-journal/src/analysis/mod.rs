//! Generative analysis: the structured dream-analysis contract, the HTTP
//! client that fulfils it, and the display view of stored analyses.

pub mod client;
pub mod schema;
pub mod view;

pub use client::{ChatTurn, GeminiClient, GenerativeBackend};
pub use schema::{parse_analysis, AnalysisField};
pub use view::{AnalysisSection, AnalysisView};

use thiserror::Error;

use crate::error::JournalError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("generative API key is not configured")]
    MissingApiKey,

    #[error("request to generative endpoint failed: {0}")]
    Transport(String),

    #[error("generative endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generative endpoint returned no candidate")]
    MissingCandidate,

    #[error("generative endpoint returned an unreadable response: {0}")]
    Malformed(String),
}

impl AnalysisError {
    /// Message suitable for showing to the person using the journal.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "The analysis service is not configured. Please try again later.",
            Self::Transport(_) => "Could not reach the analysis service. Please check your connection and try again.",
            Self::Status { status, .. } if *status == 429 => {
                "The analysis service is busy right now. Please try again in a moment."
            }
            Self::Status { .. } => "The analysis service reported an error. Please try again.",
            Self::MissingCandidate | Self::Malformed(_) => {
                "The analysis service returned an empty or unreadable answer. Please try again."
            }
        }
    }
}

impl From<AnalysisError> for JournalError {
    fn from(err: AnalysisError) -> Self {
        JournalError::Upstream(err.user_message().to_string())
    }
}
