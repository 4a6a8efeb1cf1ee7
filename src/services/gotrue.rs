// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity service client and session lifecycle.
//!
//! Handles:
//! - Password / OAuth id-token / refresh-token grants
//! - Sign-up with account metadata
//! - Account reads and updates, password recovery
//! - Session persistence and proactive refresh ahead of expiry

use crate::config::Config;
use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};

/// Low-level client for the identity service (GoTrue-compatible API).
#[derive(Clone)]
pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoTrueClient {
    /// Create a new identity client from the project configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("{}/auth/v1", config.supabase_url),
            api_key: config.supabase_anon_key.clone(),
        })
    }

    /// Password grant.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<TokenResponse> {
        let url = format!("{}/token?grant_type=password", self.base_url);
        let body = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// OAuth id-token grant (used after an interactive provider flow).
    pub async fn sign_in_with_id_token(
        &self,
        provider: &str,
        id_token: &str,
    ) -> Result<TokenResponse> {
        let url = format!("{}/token?grant_type=id_token", self.base_url);
        let body = serde_json::json!({
            "provider": provider,
            "id_token": id_token,
        });

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Exchange a refresh token for a fresh session.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<TokenResponse> {
        let url = format!("{}/token?grant_type=refresh_token", self.base_url);
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Token refresh request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Register a new account. `data` becomes the account's user
    /// metadata (display name, onboarding seed).
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: serde_json::Value,
    ) -> Result<SignUpResponse> {
        let url = format!("{}/signup", self.base_url);
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": data,
        });

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Revoke the session server-side.
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let url = format!("{}/logout", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response(response).await
    }

    /// Fetch the account behind the given access token.
    pub async fn get_account(&self, access_token: &str) -> Result<AuthUser> {
        let url = format!("{}/user", self.base_url);

        let response = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Update account credentials (email change requires confirmation
    /// via emailed links; password change is effective immediately).
    pub async fn update_account(
        &self,
        access_token: &str,
        update: &AccountUpdate,
    ) -> Result<AuthUser> {
        let url = format!("{}/user", self.base_url);

        let response = self
            .http
            .put(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .json(update)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Request a password-reset email.
    pub async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        let url = format!("{}/recover", self.base_url);
        let body = serde_json::json!({ "email": email });

        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        self.check_response(response).await
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Auth(service_error_message(status, &body)))
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Auth(service_error_message(status, &body)));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::Auth(format!("JSON parse error: {}", e)))
    }
}

/// Pull the service's own message out of a structured error body,
/// falling back to the raw status and body.
fn service_error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    format!("HTTP {}: {}", status, body)
}

/// Account record owned by the identity service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Set once the address has been confirmed.
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

/// Token grant response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: AuthUser,
}

impl TokenResponse {
    /// Convert the wire response into the cached session form.
    pub fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(self.expires_in));

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up response. Auto-confirm projects answer with a full session;
/// confirmation-required projects answer with the pending account.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(Box<TokenResponse>),
    Pending(AuthUser),
}

/// Account credential changes for `PUT /user`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// AuthService - session lifecycle over the raw client
// ─────────────────────────────────────────────────────────────────────────────

use crate::models::session::{Session, TOKEN_REFRESH_MARGIN_SECS};
use crate::models::user::ProfileSeed;
use crate::services::session_cache::SessionCache;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;

/// Session change pushed to subscribers.
///
/// Every variant carries the authoritative payload, so handlers derive
/// their state from the change itself and never from assumed ordering.
#[derive(Debug, Clone)]
pub enum AuthChange {
    /// Result of the startup bootstrap.
    InitialSession(Option<Session>),
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

impl AuthChange {
    /// The session carried by this change, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthChange::InitialSession(session) => session.as_ref(),
            AuthChange::SignedIn(session) | AuthChange::TokenRefreshed(session) => Some(session),
            AuthChange::SignedOut => None,
        }
    }
}

/// What the refresh timer is currently waiting on.
#[derive(Debug, Clone)]
struct RefreshTarget {
    expires_at: DateTime<Utc>,
    refresh_token: String,
}

/// High-level session service over the raw identity client.
///
/// Encapsulates:
/// - The cached session slot (single writer, many readers)
/// - Disk persistence so sessions survive restarts
/// - A proactive refresh timer with a 5-minute margin before expiry
/// - The `AuthChange` broadcast stream consumed by the session manager
///
/// The refresh timer task holds a clone of the service; call
/// [`AuthService::shutdown`] to stop it.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<AuthServiceInner>,
}

struct AuthServiceInner {
    client: GoTrueClient,
    cache: SessionCache,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
    refresh_target: watch::Sender<Option<RefreshTarget>>,
    refresh_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AuthService {
    /// Create the service and start its refresh timer.
    pub fn new(client: GoTrueClient, cache: SessionCache) -> Self {
        let (events, _) = broadcast::channel(32);
        let (refresh_target, targets) = watch::channel(None);

        let service = Self {
            inner: Arc::new(AuthServiceInner {
                client,
                cache,
                session: RwLock::new(None),
                events,
                refresh_target,
                refresh_task: std::sync::Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(refresh_loop(service.clone(), targets));
        if let Ok(mut guard) = service.inner.refresh_task.lock() {
            *guard = Some(handle);
        }

        service
    }

    /// Subscribe to session changes. The receiver must stay alive for
    /// as long as the subscriber wants notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.inner.events.subscribe()
    }

    /// Snapshot of the current session.
    pub async fn current_session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// Access token of the current session.
    pub async fn access_token(&self) -> Option<String> {
        self.inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    // ─── Startup ─────────────────────────────────────────────────────────────

    /// Recover any existing session at startup.
    ///
    /// A cached session close to expiry is exchanged for a fresh one
    /// before use; if that fails we start signed out rather than
    /// surfacing a startup error. Emits `InitialSession` either way and
    /// returns the session for the caller's own (racing) apply path.
    pub async fn bootstrap(&self) -> Option<Session> {
        let Some(cached) = self.inner.cache.load().await else {
            let _ = self
                .inner
                .events
                .send(AuthChange::InitialSession(None));
            return None;
        };

        let session = if cached.expires_soon() {
            match self
                .inner
                .client
                .refresh_session(&cached.refresh_token)
                .await
            {
                Ok(token) => token.into_session(),
                Err(e) => {
                    tracing::warn!(error = %e, "Cached session could not be refreshed, starting signed out");
                    self.inner.cache.clear().await;
                    let _ = self
                        .inner
                        .events
                        .send(AuthChange::InitialSession(None));
                    return None;
                }
            }
        } else {
            cached
        };

        self.install_session(session.clone()).await;
        tracing::info!(user_id = %session.user.id, "Existing session restored");
        let _ = self
            .inner
            .events
            .send(AuthChange::InitialSession(Some(session.clone())));
        Some(session)
    }

    // ─── Sign-in / Sign-up / Sign-out ────────────────────────────────────────

    /// Password sign-in.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let token = self
            .inner
            .client
            .sign_in_with_password(email, password)
            .await?;
        Ok(self.finalize_sign_in(token).await)
    }

    /// Sign in with an OAuth provider's ID token.
    pub async fn sign_in_with_id_token(&self, provider: &str, id_token: &str) -> Result<Session> {
        let token = self
            .inner
            .client
            .sign_in_with_id_token(provider, id_token)
            .await?;
        Ok(self.finalize_sign_in(token).await)
    }

    /// Register a new account. The display name and profile seed travel
    /// as account metadata. Returns the created account; when the
    /// service issues a session inline it is installed and announced.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
        seed: Option<&ProfileSeed>,
    ) -> Result<AuthUser> {
        let mut metadata = serde_json::json!({ "name": name });
        if let Some(seed) = seed {
            let extra = serde_json::to_value(seed)
                .map_err(|e| AuthError::Internal(anyhow::anyhow!("Metadata encoding failed: {}", e)))?;
            if let (Some(meta), serde_json::Value::Object(extra)) = (metadata.as_object_mut(), extra)
            {
                meta.extend(extra);
            }
        }

        match self.inner.client.sign_up(email, password, metadata).await? {
            SignUpResponse::Session(token) => {
                let session = self.finalize_sign_in(*token).await;
                Ok(session.user)
            }
            SignUpResponse::Pending(account) => {
                tracing::info!(user_id = %account.id, "Account created, awaiting email confirmation");
                Ok(account)
            }
        }
    }

    /// Sign out server-side, then clear local state and announce it.
    /// On failure nothing is cleared and no change is emitted.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.current_session().await else {
            return Ok(());
        };

        self.inner.client.sign_out(&session.access_token).await?;
        self.clear_session().await;
        let _ = self.inner.events.send(AuthChange::SignedOut);
        tracing::info!("Signed out");
        Ok(())
    }

    // ─── Account operations ──────────────────────────────────────────────────

    /// Fetch the current account, or `None` without an active session.
    /// No network call is made when signed out.
    pub async fn current_account(&self) -> Result<Option<AuthUser>> {
        let Some(token) = self.access_token().await else {
            return Ok(None);
        };
        self.inner.client.get_account(&token).await.map(Some)
    }

    /// Update account credentials.
    pub async fn update_account(&self, update: &AccountUpdate) -> Result<AuthUser> {
        let token = self
            .access_token()
            .await
            .ok_or(AuthError::Unauthenticated)?;
        self.inner.client.update_account(&token, update).await
    }

    /// Request a password-reset email.
    pub async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        self.inner.client.reset_password_for_email(email).await
    }

    /// Stop the refresh timer. The service keeps answering calls, but
    /// no proactive refresh happens after this.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.inner.refresh_task.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    async fn finalize_sign_in(&self, token: TokenResponse) -> Session {
        let session = token.into_session();
        self.install_session(session.clone()).await;
        tracing::info!(user_id = %session.user.id, "Signed in");
        let _ = self
            .inner
            .events
            .send(AuthChange::SignedIn(session.clone()));
        session
    }

    /// Store the session, persist it, and retarget the refresh timer.
    async fn install_session(&self, session: Session) {
        self.inner.cache.save(&session).await;
        self.inner
            .refresh_target
            .send_replace(Some(RefreshTarget {
                expires_at: session.expires_at,
                refresh_token: session.refresh_token.clone(),
            }));
        *self.inner.session.write().await = Some(session);
    }

    async fn clear_session(&self) {
        self.inner.cache.clear().await;
        self.inner.refresh_target.send_replace(None);
        *self.inner.session.write().await = None;
    }

    /// Exchange the refresh token now. Success re-arms the timer via
    /// `install_session`; failure means the session is gone (revoked or
    /// expired), so local state is cleared and `SignedOut` announced.
    async fn refresh_now(&self, refresh_token: &str) {
        match self.inner.client.refresh_session(refresh_token).await {
            Ok(token) => {
                let session = token.into_session();
                self.install_session(session.clone()).await;
                tracing::info!(user_id = %session.user.id, "Session token refreshed");
                let _ = self
                    .inner
                    .events
                    .send(AuthChange::TokenRefreshed(session));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed, signing out");
                self.clear_session().await;
                let _ = self.inner.events.send(AuthChange::SignedOut);
            }
        }
    }
}

/// Background timer that exchanges the refresh token shortly before the
/// access token expires. One per service; aborted by `shutdown`.
async fn refresh_loop(
    service: AuthService,
    mut targets: watch::Receiver<Option<RefreshTarget>>,
) {
    loop {
        let target = targets.borrow_and_update().clone();
        match target {
            None => {
                if targets.changed().await.is_err() {
                    break;
                }
            }
            Some(target) => {
                let margin = chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
                // The floor keeps a misbehaving expiry from spinning the loop.
                let wait = ((target.expires_at - margin) - Utc::now())
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO)
                    .max(std::time::Duration::from_secs(1));

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        service.refresh_now(&target.refresh_token).await;
                    }
                    changed = targets.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}
