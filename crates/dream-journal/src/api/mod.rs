//! HTTP API: handlers, session extraction and error mapping

pub mod admin_api;
pub mod auth_api;
pub mod dream_api;
pub mod error;
pub mod live_api;
pub mod reality_api;
pub mod search_api;
pub mod session;
pub mod stats_api;

pub use error::{ApiError, ApiResult};
pub use session::CurrentSession;
