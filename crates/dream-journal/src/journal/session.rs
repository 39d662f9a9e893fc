//! Per-session working state kept between requests.
use serde::Serialize;

use super::search::MatchSelection;

/// What a signed-in session is currently working on. Dropped on sign-out.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Draft most recently saved or edited from this session.
    pub current_draft_id: Option<String>,
    pub active_conversation_id: Option<String>,
    pub selection: MatchSelection,
}

impl SessionContext {
    /// Forget references to a document that no longer exists.
    pub fn forget(&mut self, document_id: &str) {
        if self.current_draft_id.as_deref() == Some(document_id) {
            self.current_draft_id = None;
        }
        if self.active_conversation_id.as_deref() == Some(document_id) {
            self.active_conversation_id = None;
        }
        if self.selection.dream_id.as_deref() == Some(document_id) {
            self.selection.dream_id = None;
        }
        if self.selection.event_id.as_deref() == Some(document_id) {
            self.selection.event_id = None;
        }
    }
}
