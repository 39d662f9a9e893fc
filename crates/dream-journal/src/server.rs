//! Server startup and router
//!
//! All handlers share one `UnifiedAppState`. The only outbound network
//! calls go to the generative-language endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use tracing::{info, warn};

use crate::{
    config::Config,
    journal_db::JournalDatabase,
    metrics,
    shared_state::{spawn_session_listener, SharedSystemState, UnifiedAppState},
};

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(300);
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Open the configured database, falling back to a private in-memory one.
pub fn open_database(cfg: &Config) -> anyhow::Result<Arc<JournalDatabase>> {
    if cfg.is_in_memory_database() {
        info!("Using in-memory journal database");
        return Ok(Arc::new(JournalDatabase::new_in_memory()?));
    }
    match JournalDatabase::new(&cfg.database_path, cfg.live_channel_capacity) {
        Ok(db) => {
            info!("Journal database initialized at: {}", cfg.database_path.display());
            Ok(Arc::new(db))
        }
        Err(e) => {
            warn!("Failed to initialize journal database: {}. Falling back to in-memory.", e);
            Ok(Arc::new(JournalDatabase::new_in_memory()?))
        }
    }
}

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    metrics::init_metrics();
    cfg.print_config();

    let addr = cfg.api_addr()?;
    let database = open_database(&cfg)?;
    let shared_state = Arc::new(SharedSystemState::new(cfg, database)?);

    spawn_session_listener(Arc::clone(&shared_state));
    spawn_session_purge(Arc::clone(&shared_state));

    let app = build_router(UnifiedAppState::new(shared_state));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_purge(state: Arc<SharedSystemState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = state.auth.purge_expired();
            if purged > 0 {
                info!("Purged {} expired sessions", purged);
            }
        }
    });
}

async fn track_requests(
    State(state): State<UnifiedAppState>,
    matched: Option<MatchedPath>,
    request: Request,
    next: Next,
) -> Response {
    let route = matched
        .as_ref()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let response = next.run(request).await;
    state.counters.inc_total_requests();
    metrics::inc_request(&route, response.status().as_str());
    response
}

/// Build the full HTTP router over `state`.
pub fn build_router(state: UnifiedAppState) -> axum::Router {
    use axum::{
        routing::{get, post, put},
        Router,
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        limit::RequestBodyLimitLayer,
        timeout::TimeoutLayer,
        trace::TraceLayer,
    };

    use crate::api::{admin_api, auth_api, dream_api, live_api, reality_api, search_api, stats_api};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    Router::new()
        // Authentication
        .route("/auth/signup", post(auth_api::sign_up))
        .route("/auth/signin", post(auth_api::sign_in))
        .route("/auth/federated", post(auth_api::sign_in_federated))
        .route("/auth/anonymous", post(auth_api::sign_in_anonymous))
        .route("/auth/signout", post(auth_api::sign_out))
        .route("/auth/state", get(auth_api::auth_state))
        // Dreams
        .route("/dreams/drafts", get(dream_api::list_drafts).post(dream_api::save_draft))
        .route("/dreams/drafts/current", get(dream_api::current_draft))
        .route("/dreams/drafts/:id", put(dream_api::update_draft).delete(dream_api::delete_draft))
        .route("/dreams/drafts/:id/analyze", post(dream_api::analyze_draft))
        .route("/dreams/archived", get(dream_api::list_archived))
        .route("/dreams/archived/:id", get(dream_api::get_archived).delete(dream_api::delete_archived))
        .route("/dreams/archived/:id/match", put(dream_api::set_match))
        // Reality log and chat
        .route("/reality/events", get(reality_api::recent_events).post(reality_api::log_event))
        .route("/reality/chat", get(reality_api::active_chat))
        .route("/reality/chat/messages", post(reality_api::send_message))
        .route("/reality/chat/images", post(reality_api::generate_image))
        .route("/reality/chat/archive", post(reality_api::archive_chat))
        .route("/reality/conversations", get(reality_api::list_conversations))
        .route("/reality/conversations/:id/messages", get(reality_api::conversation_messages))
        // Search and matching
        .route("/search", get(search_api::search))
        .route(
            "/match/selection",
            get(search_api::get_selection)
                .put(search_api::update_selection)
                .delete(search_api::clear_selection),
        )
        .route("/match/selection/confirm", post(search_api::confirm_selection))
        // Statistics and live lists
        .route("/stats", get(stats_api::get_stats))
        .route("/live/:collection", get(live_api::live))
        // Operations
        .route("/healthz", get(admin_api::health))
        .route("/metrics", get(metrics::get_metrics))
        .route("/admin/stats", get(admin_api::admin_stats))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
