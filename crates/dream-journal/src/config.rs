// dream-journal/crates/dream-journal/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub database_path: PathBuf,
    pub app_id: String,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub analysis_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub session_ttl_hours: u64,
    pub password_hash_cost: u32,
    pub federation_secret: Option<String>,
    pub recent_events_limit: usize,
    pub live_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let gemini_api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        if gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY is not set; dream analysis and chat requests will fail");
        }

        let federation_secret = env::var("FEDERATION_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty());

        Ok(Self {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8000".into())
                .parse()
                .context("API_PORT must be a valid port number")?,
            database_path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/dream_journal.db".into()),
            ),
            app_id: env::var("APP_ID").unwrap_or_else(|_| "default-app-id".into()),
            gemini_api_key,
            gemini_base_url: env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into())
                .trim_end_matches('/')
                .to_string(),
            gemini_text_model: env::var("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".into()),
            gemini_image_model: env::var("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|_| "imagen-3.0-generate-002".into()),
            analysis_timeout_seconds: env::var("ANALYSIS_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "120".into())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "180".into())
                .parse()?,
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "168".into())
                .parse()?,
            password_hash_cost: env::var("PASSWORD_HASH_COST")
                .unwrap_or_else(|_| bcrypt::DEFAULT_COST.to_string())
                .parse()?,
            federation_secret,
            recent_events_limit: env::var("RECENT_EVENTS_LIMIT")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            live_channel_capacity: env::var("LIVE_CHANNEL_CAPACITY")
                .unwrap_or_else(|_| "256".into())
                .parse()?,
        })
    }

    /// Configuration for tests and embedding: in-process defaults, no `.env` lookup.
    pub fn for_testing(gemini_base_url: &str) -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            database_path: PathBuf::from(":memory:"),
            app_id: "test-app".to_string(),
            gemini_api_key: "test-key".to_string(),
            gemini_base_url: gemini_base_url.trim_end_matches('/').to_string(),
            gemini_text_model: "gemini-2.0-flash".to_string(),
            gemini_image_model: "imagen-3.0-generate-002".to_string(),
            analysis_timeout_seconds: 5,
            request_timeout_seconds: 10,
            session_ttl_hours: 1,
            password_hash_cost: 4,
            federation_secret: Some("federation-test-secret".to_string()),
            recent_events_limit: 10,
            live_channel_capacity: 16,
        }
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Database: {}", self.database_path.display());
        info!("- App ID: {}", self.app_id);
        info!("- Gemini Base URL: {}", self.gemini_base_url);
        info!("- Text Model: {}", self.gemini_text_model);
        info!("- Image Model: {}", self.gemini_image_model);
        info!("- Gemini API Key: {}", if self.gemini_api_key.is_empty() { "missing" } else { "set" });
        info!("- Analysis Timeout: {}s", self.analysis_timeout_seconds);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Session TTL: {}h", self.session_ttl_hours);
        info!("- Federated Sign-in: {}", if self.federation_secret.is_some() { "enabled" } else { "disabled" });
        info!("- Recent Events Limit: {}", self.recent_events_limit);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }

    pub fn is_in_memory_database(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config::for_testing("http://127.0.0.1:9999/v1beta/")
    }

    // ===== API Address Tests =====

    #[test]
    fn test_api_addr_parsing() {
        let config = create_test_config();
        let addr = config.api_addr().unwrap();

        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_api_addr_with_zero_address() {
        let mut config = create_test_config();
        config.api_host = "0.0.0.0".to_string();
        config.api_port = 5000;

        let addr = config.api_addr().unwrap();
        assert_eq!(addr.port(), 5000);
        assert_eq!(addr.ip().to_string(), "0.0.0.0");
    }

    #[test]
    fn test_api_addr_rejects_hostname_garbage() {
        let mut config = create_test_config();
        config.api_host = "not a host".to_string();
        assert!(config.api_addr().is_err());
    }

    // ===== Endpoint Tests =====

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = create_test_config();
        assert_eq!(config.gemini_base_url, "http://127.0.0.1:9999/v1beta");
    }

    #[test]
    fn test_in_memory_database_detection() {
        let mut config = create_test_config();
        assert!(config.is_in_memory_database());

        config.database_path = PathBuf::from("./data/dream_journal.db");
        assert!(!config.is_in_memory_database());
    }

    // ===== Limits Tests =====

    #[test]
    fn test_recent_events_limit_defaults_to_ten() {
        let config = create_test_config();
        assert_eq!(config.recent_events_limit, 10);
    }

    #[test]
    fn test_timeouts_are_positive() {
        let config = create_test_config();
        assert!(config.analysis_timeout_seconds > 0);
        assert!(config.request_timeout_seconds >= config.analysis_timeout_seconds);
    }

    #[test]
    fn test_config_clone() {
        let config1 = create_test_config();
        let config2 = config1.clone();

        assert_eq!(config1.app_id, config2.app_id);
        assert_eq!(config1.federation_secret, config2.federation_secret);
    }
}
