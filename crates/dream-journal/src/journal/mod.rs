//! Journal managers: dream lifecycle, reality log and chat, search and
//! matching, statistics, and per-session context.

pub mod dreams;
pub mod reality;
pub mod search;
pub mod session;
pub mod stats;

pub use dreams::{ArchivedDreamDetail, DraftChanges, DreamLifecycle};
pub use reality::{ChatExchange, ConversationMessages, RealityLog};
pub use search::{MatchSelection, SearchEngine, SearchResults, SelectionTarget, TimeScope};
pub use session::SessionContext;
pub use stats::{JournalStats, StatsAggregator};
