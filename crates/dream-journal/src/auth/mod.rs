//! Authentication gateway: password, federated and anonymous sign-in,
//! sign-out, session lookup and sign-in-state notifications.
//!
//! Sessions live in memory and are keyed by the blake3 digest of the bearer
//! token. User records are persisted through [`UserStore`](crate::journal_db::UserStore).

pub mod password;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{JournalError, JournalResult};
use crate::journal_db::{AuthProvider, JournalDatabase, Namespace, StoredUser};

/// Longest session lifetime honoured; larger configured values are clamped.
const MAX_SESSION_TTL_HOURS: u64 = 24 * 365 * 10;

/// Identity of the signed-in user for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub user_id: String,
    pub app_id: String,
    pub provider: AuthProvider,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

impl AuthUser {
    fn from_stored(user: &StoredUser) -> Self {
        Self {
            user_id: user.id.clone(),
            app_id: user.app_id.clone(),
            provider: user.provider.clone(),
            email: user.email.clone(),
            is_anonymous: user.provider == AuthProvider::Anonymous,
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.app_id, &self.user_id)
    }
}

#[derive(Debug, Clone)]
pub struct SignedIn {
    /// Bearer token handed to the client; only its digest is retained.
    pub token: String,
    pub session_key: String,
    pub user: AuthUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStateChange {
    SignedIn { user_id: String, session_key: String },
    SignedOut { user_id: String, session_key: String },
}

/// Identity asserted by a trusted upstream (reverse proxy or identity broker).
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub provider: String,
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    user: AuthUser,
    expires_at: DateTime<Utc>,
}

pub struct AuthGateway {
    db: Arc<JournalDatabase>,
    app_id: String,
    sessions: DashMap<String, SessionEntry>,
    session_ttl: Duration,
    password_hash_cost: u32,
    federation_secret: Option<String>,
    events: broadcast::Sender<AuthStateChange>,
    ready: AtomicBool,
}

impl AuthGateway {
    pub fn new(
        db: Arc<JournalDatabase>,
        app_id: &str,
        session_ttl_hours: u64,
        password_hash_cost: u32,
        federation_secret: Option<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        if session_ttl_hours > MAX_SESSION_TTL_HOURS {
            warn!("Session TTL of {}h clamped to {}h", session_ttl_hours, MAX_SESSION_TTL_HOURS);
        }
        Self {
            db,
            app_id: app_id.to_string(),
            sessions: DashMap::new(),
            session_ttl: Duration::hours(session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS) as i64),
            password_hash_cost,
            federation_secret,
            events,
            ready: AtomicBool::new(false),
        }
    }

    /// Check the user table is reachable; the gateway reports ready once this succeeds.
    pub fn initialize(&self) -> anyhow::Result<()> {
        self.db.users.get("")?;
        self.ready.store(true, Ordering::Release);
        info!("Authentication gateway ready for app {}", self.app_id);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }

    pub fn federation_enabled(&self) -> bool {
        self.federation_secret.is_some()
    }

    fn open_session(&self, user: &StoredUser) -> SignedIn {
        let token = password::generate_session_token();
        let session_key = password::session_key(&token);
        let auth_user = AuthUser::from_stored(user);

        self.sessions.insert(
            session_key.clone(),
            SessionEntry {
                user: auth_user.clone(),
                expires_at: Utc::now()
                    .checked_add_signed(self.session_ttl)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        let _ = self.events.send(AuthStateChange::SignedIn {
            user_id: auth_user.user_id.clone(),
            session_key: session_key.clone(),
        });
        debug!("Opened session for user {}", auth_user.user_id);

        SignedIn { token, session_key, user: auth_user }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> JournalResult<SignedIn> {
        let hash = password::hash_password(password, self.password_hash_cost).await?;
        let user = self
            .db
            .users
            .create_password_user(&self.app_id, email, &hash)?
            .ok_or_else(|| JournalError::Conflict("An account with this email already exists".to_string()))?;
        Ok(self.open_session(&user))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> JournalResult<SignedIn> {
        let user = self
            .db
            .users
            .find_by_email(&self.app_id, email)?
            .ok_or(JournalError::InvalidCredentials)?;
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(JournalError::InvalidCredentials);
        };
        if !password::verify_password(password, hash).await? {
            warn!("Failed password sign-in for user {}", user.id);
            return Err(JournalError::InvalidCredentials);
        }
        self.db.users.touch_sign_in(&user.id)?;
        Ok(self.open_session(&user))
    }

    /// `presented_secret` must equal the configured federation secret.
    pub fn sign_in_federated(
        &self,
        presented_secret: Option<&str>,
        identity: &FederatedIdentity,
    ) -> JournalResult<SignedIn> {
        let Some(expected) = self.federation_secret.as_deref() else {
            return Err(JournalError::Forbidden("federated sign-in is disabled".to_string()));
        };
        if presented_secret != Some(expected) {
            warn!("Rejected federated sign-in via {}", identity.provider);
            return Err(JournalError::Forbidden("untrusted federated identity".to_string()));
        }
        let user = self.db.users.find_or_create_federated(
            &self.app_id,
            &identity.provider,
            &identity.subject,
            identity.email.as_deref(),
        )?;
        Ok(self.open_session(&user))
    }

    pub fn sign_in_anonymous(&self) -> JournalResult<SignedIn> {
        let user = self.db.users.create_anonymous(&self.app_id)?;
        Ok(self.open_session(&user))
    }

    /// Returns false when the token had no live session.
    pub fn sign_out(&self, token: &str) -> bool {
        let session_key = password::session_key(token);
        match self.sessions.remove(&session_key) {
            Some((_, entry)) => {
                let _ = self.events.send(AuthStateChange::SignedOut {
                    user_id: entry.user.user_id.clone(),
                    session_key,
                });
                info!("User {} signed out", entry.user.user_id);
                true
            }
            None => false,
        }
    }

    /// Resolve a bearer token; expired sessions are dropped on sight.
    pub fn current_user(&self, token: &str) -> Option<(String, AuthUser)> {
        let session_key = password::session_key(token);
        let entry = self.sessions.get(&session_key)?.clone();
        if entry.expires_at <= Utc::now() {
            self.expire(&session_key);
            return None;
        }
        Some((session_key, entry.user))
    }

    fn expire(&self, session_key: &str) {
        if let Some((_, entry)) = self.sessions.remove(session_key) {
            debug!("Session for user {} expired", entry.user.user_id);
            let _ = self.events.send(AuthStateChange::SignedOut {
                user_id: entry.user.user_id,
                session_key: session_key.to_string(),
            });
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.expire(key);
        }
        expired.len()
    }

    pub fn has_session(&self, session_key: &str) -> bool {
        self.sessions.contains_key(session_key)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
