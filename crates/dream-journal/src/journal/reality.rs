//! Reality log: daily events and the archivable chat with the assistant.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::analysis::{ChatTurn, GenerativeBackend};
use crate::error::{JournalError, JournalResult};
use crate::journal_db::{
    ChatMessage, ChatRole, Conversation, DailyEvent, JournalDatabase, Namespace, Query, Stored,
};

/// The user's turn and the assistant's answer, both as stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExchange {
    pub conversation_id: String,
    pub user_message: Stored<ChatMessage>,
    pub reply: Stored<ChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessages {
    pub conversation_id: Option<String>,
    pub messages: Vec<Stored<ChatMessage>>,
}

pub struct RealityLog {
    db: Arc<JournalDatabase>,
    backend: Arc<dyn GenerativeBackend>,
    recent_limit: usize,
}

impl RealityLog {
    pub fn new(db: Arc<JournalDatabase>, backend: Arc<dyn GenerativeBackend>, recent_limit: usize) -> Self {
        Self { db, backend, recent_limit: recent_limit.max(1) }
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    // ------------------------------------------------------------------
    // Daily events
    // ------------------------------------------------------------------

    pub fn log_event(&self, ns: &Namespace, event_text: &str) -> JournalResult<Stored<DailyEvent>> {
        let event_text = event_text.trim();
        if event_text.is_empty() {
            return Err(JournalError::invalid("Please describe what happened before logging it"));
        }
        let stored = self.db.documents.create(ns, None, DailyEvent {
            event_text: event_text.to_string(),
            timestamp: Utc::now(),
        })?;
        info!("Logged daily event {} for {}", stored.id, ns);
        Ok(stored)
    }

    pub fn recent_events(&self, ns: &Namespace) -> JournalResult<Vec<Stored<DailyEvent>>> {
        Ok(self.db.documents.list(ns, None, &Query::newest_first().limit(self.recent_limit))?)
    }

    pub fn all_events(&self, ns: &Namespace) -> JournalResult<Vec<Stored<DailyEvent>>> {
        Ok(self.db.documents.list(ns, None, &Query::newest_first())?)
    }

    pub fn get_event(&self, ns: &Namespace, event_id: &str) -> JournalResult<Stored<DailyEvent>> {
        self.db
            .documents
            .get(ns, None, event_id)?
            .ok_or_else(|| JournalError::not_found("Daily event", event_id))
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Newest non-archived conversation, if any.
    pub fn active_conversation(&self, ns: &Namespace) -> JournalResult<Option<Stored<Conversation>>> {
        let mut open: Vec<Stored<Conversation>> = self.db.documents.list(
            ns,
            None,
            &Query::newest_first().where_eq("isArchived", false).limit(1),
        )?;
        Ok(open.pop())
    }

    /// Resolve the conversation to append to. `hint` is the id the session
    /// last used; it is ignored once archived or gone.
    fn resolve_conversation(&self, ns: &Namespace, hint: Option<&str>) -> JournalResult<Option<Stored<Conversation>>> {
        if let Some(id) = hint {
            if let Some(conversation) = self.db.documents.get::<Conversation>(ns, None, id)? {
                if !conversation.data.is_archived {
                    return Ok(Some(conversation));
                }
            }
        }
        self.active_conversation(ns)
    }

    fn ensure_conversation(&self, ns: &Namespace, hint: Option<&str>) -> JournalResult<Stored<Conversation>> {
        if let Some(conversation) = self.resolve_conversation(ns, hint)? {
            return Ok(conversation);
        }
        let created = self.db.documents.create(ns, None, Conversation {
            timestamp: Utc::now(),
            is_archived: false,
        })?;
        info!("Started conversation {} for {}", created.id, ns);
        Ok(created)
    }

    fn append(
        &self,
        ns: &Namespace,
        conversation_id: &str,
        role: ChatRole,
        text: String,
        image_base64: Option<String>,
    ) -> JournalResult<Stored<ChatMessage>> {
        // Each message must sort strictly after the one before it.
        let latest: Option<DateTime<Utc>> = self
            .db
            .documents
            .list::<ChatMessage>(ns, Some(conversation_id), &Query::newest_first().limit(1))?
            .first()
            .map(|message| message.data.timestamp);
        let now = Utc::now();
        let timestamp = match latest {
            Some(previous) if now.timestamp_millis() <= previous.timestamp_millis() => {
                previous + Duration::milliseconds(1)
            }
            _ => now,
        };
        Ok(self.db.documents.create(ns, Some(conversation_id), ChatMessage {
            text,
            role,
            timestamp,
            image_base64,
        })?)
    }

    pub fn messages(&self, ns: &Namespace, conversation_id: &str) -> JournalResult<Vec<Stored<ChatMessage>>> {
        if self.db.documents.get::<Conversation>(ns, None, conversation_id)?.is_none() {
            return Err(JournalError::not_found("Conversation", conversation_id));
        }
        Ok(self.db.documents.list(ns, Some(conversation_id), &Query::oldest_first())?)
    }

    pub fn active_messages(&self, ns: &Namespace, hint: Option<&str>) -> JournalResult<ConversationMessages> {
        match self.resolve_conversation(ns, hint)? {
            Some(conversation) => Ok(ConversationMessages {
                messages: self.db.documents.list(ns, Some(&conversation.id), &Query::oldest_first())?,
                conversation_id: Some(conversation.id),
            }),
            None => Ok(ConversationMessages { conversation_id: None, messages: Vec::new() }),
        }
    }

    pub fn list_conversations(&self, ns: &Namespace) -> JournalResult<Vec<Stored<Conversation>>> {
        Ok(self.db.documents.list(ns, None, &Query::newest_first())?)
    }

    /// Send a chat turn. The user's message is kept even when the assistant
    /// fails to answer.
    pub async fn send_message(&self, ns: &Namespace, hint: Option<&str>, text: &str) -> JournalResult<ChatExchange> {
        let text = text.trim();
        if text.is_empty() {
            return Err(JournalError::invalid("Message cannot be empty"));
        }
        let conversation = self.ensure_conversation(ns, hint)?;
        let user_message = self.append(ns, &conversation.id, ChatRole::User, text.to_string(), None)?;

        let history: Vec<ChatTurn> = self
            .db
            .documents
            .list::<ChatMessage>(ns, Some(&conversation.id), &Query::oldest_first())?
            .into_iter()
            .map(|message| ChatTurn { role: message.data.role, text: message.data.text })
            .collect();
        debug!("Chat turn in {} with {} messages of history", conversation.id, history.len());

        let answer = self.backend.chat(&history).await.map_err(|e| {
            warn!("Chat reply in conversation {} failed: {}", conversation.id, e);
            JournalError::from(e)
        })?;
        let reply = self.append(ns, &conversation.id, ChatRole::Model, answer, None)?;

        Ok(ChatExchange { conversation_id: conversation.id, user_message, reply })
    }

    /// Image-generation turn: the prompt is stored as the user's message and
    /// the image as the assistant's.
    pub async fn generate_image(&self, ns: &Namespace, hint: Option<&str>, prompt: &str) -> JournalResult<ChatExchange> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(JournalError::invalid("Describe the image you want to generate"));
        }
        let conversation = self.ensure_conversation(ns, hint)?;
        let user_message = self.append(ns, &conversation.id, ChatRole::User, prompt.to_string(), None)?;

        let image = self.backend.generate_image(prompt).await.map_err(|e| {
            warn!("Image generation in conversation {} failed: {}", conversation.id, e);
            JournalError::from(e)
        })?;
        let reply = self.append(
            ns,
            &conversation.id,
            ChatRole::Model,
            format!("Generated image for: {}", prompt),
            Some(image),
        )?;

        Ok(ChatExchange { conversation_id: conversation.id, user_message, reply })
    }

    /// Archive the active conversation; the next chat turn starts a new one.
    pub fn archive_conversation(&self, ns: &Namespace, hint: Option<&str>) -> JournalResult<Stored<Conversation>> {
        let conversation = self
            .resolve_conversation(ns, hint)?
            .ok_or_else(|| JournalError::not_found("Conversation", "active"))?;
        let archived = self
            .db
            .documents
            .update::<Conversation>(ns, None, &conversation.id, json!({ "isArchived": true }))?
            .ok_or_else(|| JournalError::not_found("Conversation", &conversation.id))?;
        info!("Archived conversation {} for {}", archived.id, ns);
        Ok(archived)
    }
}
