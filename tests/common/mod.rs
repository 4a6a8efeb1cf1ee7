// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared fixtures: a mock identity/profile server, manager builders
//! and stub Google flows.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prepdeck_session::config::Config;
use prepdeck_session::db::ProfileStore;
use prepdeck_session::error::AuthError;
use prepdeck_session::services::{AuthService, GoTrueClient, GoogleSignIn, SessionCache};
use prepdeck_session::session::AuthState;
use prepdeck_session::SessionManager;

pub const USER_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const EMAIL: &str = "al@b.com";

/// Test config pointing at the mock server.
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::test_default();
    config.supabase_url = server.uri();
    config
}

/// Manager wired to the mock server with an ephemeral session cache.
pub async fn test_manager(server: &MockServer, google: Arc<dyn GoogleSignIn>) -> SessionManager {
    test_manager_with_cache(server, google, SessionCache::ephemeral()).await
}

/// Manager wired to the mock server with the given session cache.
pub async fn test_manager_with_cache(
    server: &MockServer,
    google: Arc<dyn GoogleSignIn>,
    cache: SessionCache,
) -> SessionManager {
    let config = test_config(server);
    let client = GoTrueClient::new(&config).expect("identity client");
    let auth = AuthService::new(client, cache);
    let profiles = ProfileStore::new(&config).expect("profile store");
    SessionManager::with_services(auth, profiles, google).await
}

// ─── Response bodies ─────────────────────────────────────────────────────────

pub fn account_json(user_id: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "id": user_id,
        "email": email,
        "email_confirmed_at": "2026-01-01T00:00:00Z",
        "user_metadata": {},
    })
}

pub fn token_response_json(user_id: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": "access-token-1",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-token-1",
        "user": account_json(user_id, email),
    })
}

/// A fully filled-in profile row.
pub fn profile_row_json(user_id: &str, email: &str) -> serde_json::Value {
    serde_json::json!({
        "id": user_id,
        "email": email,
        "name": "Al",
        "avatar_url": null,
        "school": "Lincoln High",
        "grade": 11,
        "target_score": 1500,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
    })
}

// ─── Identity service mocks ──────────────────────────────────────────────────

pub async fn mount_password_grant(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response_json(USER_ID, EMAIL)),
        )
        .mount(server)
        .await;
}

pub async fn mount_grant_refresh(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response_json(USER_ID, EMAIL)),
        )
        .mount(server)
        .await;
}

/// Mount a failing grant with the service's structured error body.
pub async fn mount_grant_error(server: &MockServer, grant: &str, status: u16, msg: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", grant))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_json(serde_json::json!({ "code": status, "msg": msg })),
        )
        .mount(server)
        .await;
}

pub async fn mount_account(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_json(USER_ID, EMAIL)))
        .mount(server)
        .await;
}

pub async fn mount_logout(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

// ─── Profile store mocks ─────────────────────────────────────────────────────

pub async fn mount_profile_row(server: &MockServer, row: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(row))
        .mount(server)
        .await;
}

/// The store's "no rows" answer for a single-object point read.
pub async fn mount_profile_no_rows(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_profiles"))
        .respond_with(ResponseTemplate::new(406).set_body_json(serde_json::json!({
            "code": "PGRST116",
            "details": "The result contains 0 rows",
            "message": "JSON object requested, multiple (or no) rows returned",
        })))
        .mount(server)
        .await;
}

pub async fn mount_profile_error(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/user_profiles"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({ "message": "profile store down" })),
        )
        .mount(server)
        .await;
}

// ─── Stub Google flows ───────────────────────────────────────────────────────

enum StubBehavior {
    Cancelled,
    Failing(String),
    Token(String),
}

/// Scripted `GoogleSignIn` implementation.
pub struct GoogleStub(StubBehavior);

impl GoogleStub {
    pub fn cancelled() -> Arc<Self> {
        Arc::new(Self(StubBehavior::Cancelled))
    }

    pub fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self(StubBehavior::Failing(msg.to_string())))
    }

    pub fn token(token: &str) -> Arc<Self> {
        Arc::new(Self(StubBehavior::Token(token.to_string())))
    }
}

impl GoogleSignIn for GoogleStub {
    fn sign_in(&self) -> BoxFuture<'_, prepdeck_session::Result<String>> {
        Box::pin(async move {
            match &self.0 {
                StubBehavior::Cancelled => Err(AuthError::Cancelled),
                StubBehavior::Failing(msg) => Err(AuthError::Auth(msg.clone())),
                StubBehavior::Token(token) => Ok(token.clone()),
            }
        })
    }
}

// ─── State helpers ───────────────────────────────────────────────────────────

/// Wait until the exposed state satisfies the predicate (5s deadline).
pub async fn wait_for_state<F>(manager: &SessionManager, predicate: F) -> AuthState
where
    F: Fn(&AuthState) -> bool,
{
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            {
                let state = rx.borrow_and_update().clone();
                if predicate(&state) {
                    return state;
                }
            }
            if rx.changed().await.is_err() {
                panic!("state channel closed while waiting");
            }
        }
    })
    .await
    .expect("timed out waiting for state")
}
