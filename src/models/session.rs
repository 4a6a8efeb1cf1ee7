//! Cached session bundle issued by the identity service.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::services::gotrue::AuthUser;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Session issued by the identity service.
///
/// The tokens are opaque; the only thing inspected locally is the
/// expiry. Serializable so the session survives restarts via the disk
/// cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Usually "bearer".
    pub token_type: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// Account record embedded in the token response.
    pub user: AuthUser,
}

impl Session {
    /// True once the access token's expiry has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True when the token is within the proactive-refresh margin of
    /// its expiry (or already past it).
    pub fn expires_soon(&self) -> bool {
        Utc::now() + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) >= self.expires_at
    }
}
