//! Shared state for the HTTP layer
//!
//! One `SharedSystemState` owns the database, the authentication gateway,
//! the generative backend and the journal managers. Per-session working
//! state (`SessionContext`) is kept here, keyed by session key, and dropped
//! when the session signs out or expires.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::{GeminiClient, GenerativeBackend};
use crate::auth::{AuthGateway, AuthStateChange};
use crate::config::Config;
use crate::journal::{DreamLifecycle, RealityLog, SearchEngine, SessionContext, StatsAggregator};
use crate::journal_db::JournalDatabase;

/// Atomic counters for the admin summary
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub signed_out_sessions: AtomicUsize,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicUsize::new(0),
            signed_out_sessions: AtomicUsize::new(0),
        }
    }

    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for AtomicCounters {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SharedSystemState {
    /// Configuration (read-only after initialization)
    pub config: Arc<Config>,
    pub database: Arc<JournalDatabase>,
    pub auth: Arc<AuthGateway>,
    pub backend: Arc<dyn GenerativeBackend>,
    pub dreams: DreamLifecycle,
    pub reality: RealityLog,
    pub search: SearchEngine,
    pub stats: StatsAggregator,
    pub sessions: DashMap<String, SessionContext>,
    pub counters: AtomicCounters,
}

impl SharedSystemState {
    pub fn new(config: Config, database: Arc<JournalDatabase>) -> anyhow::Result<Self> {
        let backend: Arc<dyn GenerativeBackend> = Arc::new(GeminiClient::from_config(&config)?);
        Self::with_backend(config, database, backend)
    }

    /// Build the state around an explicit generative backend.
    pub fn with_backend(
        config: Config,
        database: Arc<JournalDatabase>,
        backend: Arc<dyn GenerativeBackend>,
    ) -> anyhow::Result<Self> {
        info!("Initializing shared system state");

        let auth = Arc::new(AuthGateway::new(
            Arc::clone(&database),
            &config.app_id,
            config.session_ttl_hours,
            config.password_hash_cost,
            config.federation_secret.clone(),
        ));
        auth.initialize()?;

        Ok(Self {
            dreams: DreamLifecycle::new(Arc::clone(&database), Arc::clone(&backend)),
            reality: RealityLog::new(Arc::clone(&database), Arc::clone(&backend), config.recent_events_limit),
            search: SearchEngine::new(Arc::clone(&database)),
            stats: StatsAggregator::new(Arc::clone(&database)),
            config: Arc::new(config),
            database,
            auth,
            backend,
            sessions: DashMap::new(),
            counters: AtomicCounters::new(),
        })
    }

    /// Run `f` against the session's context, creating it on first use.
    pub fn with_session<R>(&self, session_key: &str, f: impl FnOnce(&mut SessionContext) -> R) -> R {
        let mut context = self.sessions.entry(session_key.to_string()).or_default();
        f(&mut *context)
    }

    pub fn session_snapshot(&self, session_key: &str) -> SessionContext {
        self.sessions
            .get(session_key)
            .map(|context| context.clone())
            .unwrap_or_default()
    }

    pub fn drop_session(&self, session_key: &str) {
        if self.sessions.remove(session_key).is_some() {
            self.counters.signed_out_sessions.fetch_add(1, Ordering::Relaxed);
            debug!("Dropped session context");
        }
    }

    /// A deleted document must not linger in any of this user's sessions.
    pub fn forget_document(&self, session_key: &str, document_id: &str) {
        if let Some(mut context) = self.sessions.get_mut(session_key) {
            context.forget(document_id);
        }
    }
}

/// Drop session contexts as their sessions sign out or expire.
pub fn spawn_session_listener(state: Arc<SharedSystemState>) -> JoinHandle<()> {
    let mut events = state.auth.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthStateChange::SignedOut { session_key, .. }) => state.drop_session(&session_key),
                Ok(AuthStateChange::SignedIn { user_id, .. }) => debug!("Session opened for user {}", user_id),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session listener lagged; pruning contexts without a live session");
                    let live: Vec<String> = state
                        .sessions
                        .iter()
                        .map(|entry| entry.key().clone())
                        .collect();
                    for key in live {
                        if !state.auth.has_session(&key) {
                            state.drop_session(&key);
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Unified application state for all API handlers.
#[derive(Clone)]
pub struct UnifiedAppState {
    pub shared_state: Arc<SharedSystemState>,
}

impl UnifiedAppState {
    pub fn new(shared_state: Arc<SharedSystemState>) -> Self {
        Self { shared_state }
    }
}

impl std::ops::Deref for UnifiedAppState {
    type Target = SharedSystemState;

    fn deref(&self) -> &Self::Target {
        &self.shared_state
    }
}
