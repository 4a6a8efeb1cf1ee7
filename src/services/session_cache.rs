// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Disk cache for the session bundle.
//!
//! Lets a restart pick up where the last run left off. Cache trouble is
//! never allowed to break auth: every operation logs and carries on.

use crate::models::session::Session;
use std::path::PathBuf;

/// JSON file cache for the current session.
#[derive(Clone)]
pub struct SessionCache {
    /// `None` means ephemeral: nothing is read or written.
    path: Option<PathBuf>,
}

impl SessionCache {
    /// Create a cache at the given path, or at the platform data
    /// directory when no override is configured.
    pub fn new(path: Option<PathBuf>) -> Self {
        let path = path.or_else(default_path);
        if path.is_none() {
            tracing::warn!("No usable data directory, session will not survive restarts");
        }
        Self { path }
    }

    /// Cache that never touches the filesystem (tests, throwaway tools).
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Load the cached session, if a readable one exists.
    pub async fn load(&self) -> Option<Session> {
        let path = self.path.as_ref()?;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Could not read session cache");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Discarding unreadable session cache");
                None
            }
        }
    }

    /// Persist the session.
    pub async fn save(&self, session: &Session) {
        let Some(path) = self.path.as_ref() else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(error = %e, "Could not create session cache directory");
                return;
            }
        }

        match serde_json::to_vec_pretty(session) {
            Ok(bytes) => {
                if let Err(e) = tokio::fs::write(path, bytes).await {
                    tracing::warn!(error = %e, path = %path.display(), "Could not write session cache");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not encode session for cache"),
        }
    }

    /// Remove the cached session.
    pub async fn clear(&self) {
        let Some(path) = self.path.as_ref() else {
            return;
        };

        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, path = %path.display(), "Could not clear session cache");
            }
        }
    }
}

/// Platform data-directory location for the cache file.
fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("app", "Prepdeck", "prepdeck")
        .map(|dirs| dirs.data_dir().join("session.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::gotrue::AuthUser;
    use chrono::{Duration, Utc};

    fn session() -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: AuthUser {
                id: "u-1".to_string(),
                email: Some("al@b.com".to_string()),
                ..AuthUser::default()
            },
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SessionCache::new(Some(dir.path().join("session.json")));

        assert!(cache.load().await.is_none());

        cache.save(&session()).await;
        let loaded = cache.load().await.expect("session should load");
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.user.id, "u-1");

        cache.clear().await;
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let cache = SessionCache::new(Some(path));
        assert!(cache.load().await.is_none());
    }

    #[tokio::test]
    async fn test_ephemeral_cache_is_silent() {
        let cache = SessionCache::ephemeral();
        cache.save(&session()).await;
        assert!(cache.load().await.is_none());
        cache.clear().await;
    }
}
