//! Document and namespace definitions for the journal store
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every document is scoped under an application id and a user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub app_id: String,
    pub user_id: String,
}

impl Namespace {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "artifacts/{}/users/{}", self.app_id, self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    DraftDreams,
    ArchivedDreams,
    DailyEvents,
    Conversations,
    ChatMessages,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::DraftDreams,
        Collection::ArchivedDreams,
        Collection::DailyEvents,
        Collection::Conversations,
        Collection::ChatMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DraftDreams => "dreams",
            Self::ArchivedDreams => "analyzedDreams",
            Self::DailyEvents => "dailyEvents",
            Self::Conversations => "conversations",
            Self::ChatMessages => "messages",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collection, optionally nested under a parent document (chat messages
/// live under their conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    pub collection: Collection,
    pub parent_id: Option<String>,
}

impl CollectionPath {
    pub fn root(collection: Collection) -> Self {
        Self { collection, parent_id: None }
    }

    pub fn child(collection: Collection, parent_id: impl Into<String>) -> Self {
        Self {
            collection,
            parent_id: Some(parent_id.into()),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent_id {
            Some(parent) => write!(f, "{}/{}", parent, self.collection),
            None => write!(f, "{}", self.collection),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Equality filter on a top-level JSON field of the document body.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub value: serde_json::Value,
}

/// Timestamp-ordered query with an optional row limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub filter: Option<FieldFilter>,
}

impl Query {
    pub fn newest_first() -> Self {
        Self { order: SortOrder::Descending, ..Default::default() }
    }

    pub fn oldest_first() -> Self {
        Self { order: SortOrder::Ascending, ..Default::default() }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter = Some(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

/// Raw stored document: body is untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    #[serde(skip)]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// A typed document together with its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: String,
    #[serde(flatten)]
    pub data: T,
}

/// Types persisted as documents of one collection.
pub trait DocumentModel: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    /// Ordering key for queries.
    fn timestamp(&self) -> DateTime<Utc>;
}

// ----------------------------------------------------------------------------
// Journal documents
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDream {
    pub dream_text: String,
    #[serde(default)]
    pub dream_title: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_pre_analyzed: bool,
}

impl DocumentModel for DraftDream {
    const COLLECTION: Collection = Collection::DraftDreams;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedDream {
    pub dream_text: String,
    /// JSON-encoded structured analysis; opaque to the store.
    pub analysis_text: String,
    #[serde(default)]
    pub dream_title: String,
    pub timestamp: DateTime<Utc>,
    /// Empty string means unmatched.
    #[serde(default)]
    pub matched_reality_event: String,
}

impl ArchivedDream {
    pub fn is_matched(&self) -> bool {
        !self.matched_reality_event.trim().is_empty()
    }
}

impl DocumentModel for ArchivedDream {
    const COLLECTION: Collection = Collection::ArchivedDreams;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyEvent {
    pub event_text: String,
    pub timestamp: DateTime<Utc>,
}

impl DocumentModel for DailyEvent {
    const COLLECTION: Collection = Collection::DailyEvents;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_archived: bool,
}

impl DocumentModel for Conversation {
    const COLLECTION: Collection = Collection::Conversations;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub text: String,
    pub role: ChatRole,
    pub timestamp: DateTime<Utc>,
    /// Base64 PNG produced by the image-generation endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl DocumentModel for ChatMessage {
    const COLLECTION: Collection = Collection::ChatMessages;
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// ----------------------------------------------------------------------------
// Users
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Password,
    Federated,
    Anonymous,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Federated => "federated",
            Self::Anonymous => "anonymous",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "password" => Some(Self::Password),
            "federated" => Some(Self::Federated),
            "anonymous" => Some(Self::Anonymous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub id: String,
    pub app_id: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub provider_name: Option<String>,
    pub provider_subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_sign_in: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_users: i64,
    pub documents_per_collection: Vec<(String, i64)>,
    pub database_size_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_round_trip_through_parse() {
        for collection in Collection::ALL {
            assert_eq!(Collection::parse(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::parse("users"), None);
    }

    #[test]
    fn archived_dream_defaults_to_unmatched() {
        let json = r#"{"dreamText":"flying","analysisText":"{}","timestamp":"2026-01-01T00:00:00Z"}"#;
        let dream: ArchivedDream = serde_json::from_str(json).unwrap();
        assert_eq!(dream.matched_reality_event, "");
        assert!(!dream.is_matched());
        assert_eq!(dream.dream_title, "");
    }

    #[test]
    fn chat_message_uses_lowercase_roles_and_camel_case_fields() {
        let message = ChatMessage {
            text: "hello".to_string(),
            role: ChatRole::Model,
            timestamp: Utc::now(),
            image_base64: None,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "model");
        assert!(value.get("imageBase64").is_none());
    }

    #[test]
    fn namespace_renders_as_hierarchical_path() {
        let ns = Namespace::new("app", "u1");
        assert_eq!(ns.to_string(), "artifacts/app/users/u1");
        let path = CollectionPath::child(Collection::ChatMessages, "c1");
        assert_eq!(path.to_string(), "c1/messages");
    }
}
