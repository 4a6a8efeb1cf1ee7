// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session manager: owns the app-facing auth state.
//!
//! Mediates sign-in/sign-up/sign-out and profile operations against the
//! identity service, stays subscribed to its session-change stream, and
//! exposes derived state (current user, onboarding flags) to consuming
//! UI through a watch channel.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::ProfileStore;
use crate::error::{AuthError, Result};
use crate::models::session::Session;
use crate::models::{ProfileSeed, ProfileUpdate, User};
use crate::services::google_auth::GoogleSignIn;
use crate::services::gotrue::{
    AccountUpdate, AuthChange, AuthService, AuthUser, GoTrueClient,
};
use crate::services::session_cache::SessionCache;

/// Auth state bundle exposed to consuming UI.
///
/// Read it via [`SessionManager::state`] or re-render on change via
/// [`SessionManager::subscribe`].
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    /// Derived user view (identity account merged with the profile row).
    pub user: Option<User>,
    /// The identity service's own account record.
    pub auth_user: Option<AuthUser>,
    /// Current session, if signed in.
    pub session: Option<Session>,
    /// True while startup or an operation is in flight.
    pub loading: bool,
    /// Set after a successful sign-up; the UI clears it once onboarding
    /// is done.
    pub new_user: bool,
    /// True when the signed-in user still has onboarding fields
    /// (school, grade, target score) to fill in.
    pub needs_profile_completion: bool,
}

/// The session manager. Cheap to clone; all clones share state.
///
/// Call [`SessionManager::shutdown`] when done with it — the change
/// stream listener and the refresh timer are kept alive until then.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    auth: AuthService,
    profiles: ProfileStore,
    google: Arc<dyn GoogleSignIn>,
    state: watch::Sender<AuthState>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build the manager from configuration and start it.
    pub async fn start(config: &Config, google: Arc<dyn GoogleSignIn>) -> Result<Self> {
        let client = GoTrueClient::new(config)?;
        let cache = SessionCache::new(config.session_cache_path.clone());
        let auth = AuthService::new(client, cache);
        let profiles = ProfileStore::new(config)?;
        Ok(Self::with_services(auth, profiles, google).await)
    }

    /// Start the manager with injected collaborators.
    ///
    /// Subscribes to the session-change stream, then runs the startup
    /// bootstrap. Bootstrap trouble is logged and swallowed: the
    /// manager settles into a signed-out state rather than failing
    /// startup over a transient network problem.
    pub async fn with_services(
        auth: AuthService,
        profiles: ProfileStore,
        google: Arc<dyn GoogleSignIn>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState {
            loading: true,
            ..AuthState::default()
        });

        // Subscribe before the bootstrap so no change is missed.
        let events = auth.subscribe();

        let manager = Self {
            inner: Arc::new(ManagerInner {
                auth,
                profiles,
                google,
                state,
                listener: std::sync::Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(listen(manager.clone(), events));
        if let Ok(mut guard) = manager.inner.listener.lock() {
            *guard = Some(handle);
        }

        // Startup bootstrap. This races with the listener handling the
        // InitialSession change; both apply the same payload, so
        // last-write-wins converges.
        let session = manager.inner.auth.bootstrap().await;
        manager.apply_session(session).await;

        manager
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Watch the state; receivers see every update.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Flip the "new user" flag (the UI clears it after onboarding).
    pub fn set_new_user(&self, value: bool) {
        self.inner.state.send_modify(|s| s.new_user = value);
    }

    /// Tear down the change-stream listener and the refresh timer.
    /// No further push notifications are processed after this.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.inner.listener.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        self.inner.auth.shutdown();
    }

    // ─── Operations ──────────────────────────────────────────────────────────

    /// Password sign-in. On success the state update arrives through
    /// the change stream, not inline.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        self.set_loading(true);

        match self.inner.auth.sign_in_with_password(email, password).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Sign in failed");
                self.set_loading(false);
                Err(e.friendly_sign_in())
            }
        }
    }

    /// Interactive Google sign-in. The user backing out of the consent
    /// flow is not an error; everything else is rethrown.
    pub async fn sign_in_with_google(&self) -> Result<()> {
        self.set_loading(true);

        let id_token = match self.inner.google.sign_in().await {
            Ok(token) => token,
            Err(e) if e.is_cancelled() => {
                tracing::info!("Google sign-in cancelled by user");
                self.set_loading(false);
                return Ok(());
            }
            Err(e) => {
                tracing::error!(error = %e, "Google sign-in failed");
                self.set_loading(false);
                return Err(e);
            }
        };

        match self.inner.auth.sign_in_with_id_token("google", &id_token).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Google token sign-in failed");
                self.set_loading(false);
                Err(e)
            }
        }
    }

    /// Register a new account. The display name and optional profile
    /// seed travel as account metadata; the backend's provisioning hook
    /// turns them into the profile row.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
        seed: Option<ProfileSeed>,
    ) -> Result<()> {
        self.set_loading(true);

        match self
            .inner
            .auth
            .sign_up(email, password, name, seed.as_ref())
            .await
        {
            Ok(_account) => {
                // Session state arrives via the change stream once the
                // service issues it.
                self.inner.state.send_modify(|s| s.new_user = true);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Sign up failed");
                self.set_loading(false);
                Err(e)
            }
        }
    }

    /// Sign out. Local state cleanup happens through the change
    /// stream; the loading flag is cleared here regardless of outcome.
    pub async fn sign_out(&self) -> Result<()> {
        self.set_loading(true);
        let result = self.inner.auth.sign_out().await;
        self.set_loading(false);

        if let Err(e) = &result {
            tracing::error!(error = %e, "Sign out failed");
        }
        result
    }

    /// Re-fetch the identity account and profile, recomputing the
    /// derived user. Silent no-op without an active session.
    pub async fn refresh_user(&self) -> Result<()> {
        let Some(account) = self.inner.auth.current_account().await? else {
            return Ok(());
        };

        let user = self
            .load_user(&account)
            .await
            .unwrap_or_else(|| User::from_account(&account));

        self.inner.state.send_modify(|s| {
            s.auth_user = Some(account);
            s.needs_profile_completion = user.needs_profile_completion();
            s.user = Some(user);
        });
        Ok(())
    }

    /// Write profile fields to the store, then refresh the derived
    /// user.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<()> {
        // Local precheck: never hit the store unauthenticated.
        let current = self.state().user.ok_or(AuthError::Unauthenticated)?;

        let token = self.inner.auth.access_token().await;
        self.inner
            .profiles
            .update_profile(&current.id, &update, token.as_deref())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Profile update failed");
                e
            })?;

        self.refresh_user().await?;

        // Optimistic recompute against merged data, so the onboarding
        // prompt clears without waiting for the provisioning hook.
        if self.state().needs_profile_completion {
            let merged = current.merged_with(&update);
            self.inner.state.send_modify(|s| {
                s.needs_profile_completion = merged.needs_profile_completion();
            });
        }

        Ok(())
    }

    /// Request an email change. The service mails confirmation links to
    /// the old and the new address; the cached user keeps the old email
    /// until the change is confirmed, so no local refresh happens here.
    pub async fn update_email(&self, email: &str) -> Result<()> {
        if self.state().user.is_none() {
            return Err(AuthError::Unauthenticated);
        }

        let update = AccountUpdate {
            email: Some(email.to_string()),
            ..AccountUpdate::default()
        };
        self.inner.auth.update_account(&update).await.map_err(|e| {
            tracing::error!(error = %e, "Email update failed");
            e
        })?;
        Ok(())
    }

    /// Change the password (effective immediately), then refresh the
    /// derived user.
    pub async fn update_password(&self, password: &str) -> Result<()> {
        if self.state().user.is_none() {
            return Err(AuthError::Unauthenticated);
        }

        let update = AccountUpdate {
            password: Some(password.to_string()),
            ..AccountUpdate::default()
        };
        self.inner.auth.update_account(&update).await.map_err(|e| {
            tracing::error!(error = %e, "Password update failed");
            e
        })?;

        self.refresh_user().await
    }

    /// Request a password-reset email. No local state change.
    pub async fn reset_password_for_email(&self, email: &str) -> Result<()> {
        self.inner
            .auth
            .reset_password_for_email(email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password reset request failed");
                e
            })
    }

    // ─── State derivation ────────────────────────────────────────────────────

    fn set_loading(&self, value: bool) {
        self.inner.state.send_modify(|s| s.loading = value);
    }

    /// Apply an authoritative session payload to the exposed state.
    ///
    /// Used by both the startup bootstrap and the change-stream
    /// listener; the two paths race benignly because each derives the
    /// whole state from its payload.
    async fn apply_session(&self, session: Option<Session>) {
        match session {
            Some(session) => {
                let account = session.user.clone();

                // Session and identity record update synchronously; the
                // profile fetch below may suspend.
                self.inner.state.send_modify(|s| {
                    s.session = Some(session);
                    s.auth_user = Some(account.clone());
                });

                // A session always yields some user representation,
                // even if the profile path degrades.
                let user = self
                    .load_user(&account)
                    .await
                    .unwrap_or_else(|| User::from_account(&account));

                self.inner.state.send_modify(|s| {
                    s.needs_profile_completion = user.needs_profile_completion();
                    s.user = Some(user);
                    s.loading = false;
                });
            }
            None => {
                self.inner.state.send_modify(|s| {
                    s.session = None;
                    s.auth_user = None;
                    s.user = None;
                    s.needs_profile_completion = false;
                    s.loading = false;
                });
            }
        }
    }

    /// Fetch the profile row for an account and derive the user view.
    ///
    /// Falls back instead of failing: stored row → account endpoint →
    /// `None`; an unexpected failure inside the fallback produces the
    /// fixed placeholder. This path hands back data, never an error.
    async fn load_user(&self, account: &AuthUser) -> Option<User> {
        let token = self.inner.auth.access_token().await;

        match self
            .inner
            .profiles
            .get_profile(&account.id, token.as_deref())
            .await
        {
            Ok(Some(record)) => Some(User::from_record(record)),
            Ok(None) => {
                // Expected for fresh accounts: no profile row yet.
                tracing::debug!(user_id = %account.id, "No profile row yet, deriving user from account");
                self.account_fallback(&account.id).await
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %account.id, "Profile read failed, deriving user from account");
                self.account_fallback(&account.id).await
            }
        }
    }

    async fn account_fallback(&self, id: &str) -> Option<User> {
        match self.inner.auth.current_account().await {
            Ok(Some(account)) => Some(User::from_account(&account)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, user_id = %id, "Account fetch failed, returning placeholder user");
                Some(User::placeholder(id))
            }
        }
    }
}

/// Change-stream listener: applies every pushed session change to the
/// exposed state. Runs until the manager shuts down.
async fn listen(manager: SessionManager, mut events: broadcast::Receiver<AuthChange>) {
    loop {
        match events.recv().await {
            Ok(change) => {
                let session = change.session().cloned();
                manager.apply_session(session).await;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Resync from the authoritative slot rather than from
                // the changes we missed.
                tracing::warn!(missed, "Auth change stream lagged, resyncing");
                let session = manager.inner.auth.current_session().await;
                manager.apply_session(session).await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
