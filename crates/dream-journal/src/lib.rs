// dream-journal/crates/dream-journal/src/lib.rs

pub mod analysis;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod journal;
pub mod journal_db;
pub mod metrics;
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use config::Config;
pub use error::{JournalError, JournalResult};
pub use server::{build_router, open_database, run_server};
pub use shared_state::{SharedSystemState, UnifiedAppState};

pub use analysis::{AnalysisView, GeminiClient, GenerativeBackend};
pub use auth::{AuthGateway, AuthUser};
pub use journal::{DreamLifecycle, RealityLog, SearchEngine, StatsAggregator, TimeScope};
pub use journal_db::JournalDatabase;
