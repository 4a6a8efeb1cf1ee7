//! Application configuration loaded from environment variables.
//!
//! Everything the session core needs to reach the identity service and
//! the profile store is resolved once at startup and held in memory.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Session core configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the backend project (identity service and profile
    /// store live under `/auth/v1` and `/rest/v1` of this URL).
    pub supabase_url: String,
    /// Project anon key, sent as the `apikey` header on every request.
    pub supabase_anon_key: String,

    /// Google OAuth client ID for the interactive sign-in flow.
    pub google_client_id: Option<String>,
    /// Google OAuth client secret (installed-app flow).
    pub google_client_secret: Option<String>,

    /// Where the cached session file lives. `None` picks the platform
    /// data directory.
    pub session_cache_path: Option<PathBuf>,

    /// Request timeout applied to every identity/profile-store call.
    pub http_timeout: Duration,
}

/// Default request timeout for identity and profile-store calls.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_ANON_KEY"))?,

            google_client_id: env::var("GOOGLE_OAUTH_CLIENT_ID").ok(),
            google_client_secret: env::var("GOOGLE_OAUTH_CLIENT_SECRET").ok(),

            session_cache_path: env::var("SESSION_CACHE_PATH").ok().map(PathBuf::from),

            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        })
    }

    /// Config for tests. Points at localhost; tests override the base
    /// URL with their mock server's address.
    pub fn test_default() -> Self {
        Self {
            supabase_url: "http://127.0.0.1:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            google_client_id: Some("test-client-id".to_string()),
            google_client_secret: Some("test-client-secret".to_string()),
            session_cache_path: None,
            http_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
