// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

mod common;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_profile_row_merges_into_user() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;
    mount_profile_row(&server, profile_row_json(USER_ID, EMAIL)).await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager.sign_in(EMAIL, "secret").await.expect("sign in");

    let state = wait_for_state(&manager, |s| s.user.is_some()).await;
    let user = state.user.unwrap();
    assert_eq!(user.name, "Al");
    assert_eq!(user.school.as_deref(), Some("Lincoln High"));
    assert_eq!(user.grade, Some(11));
    assert_eq!(user.target_score, Some(1500));
    assert!(!state.needs_profile_completion);

    manager.shutdown();
}

#[tokio::test]
async fn test_no_rows_falls_back_to_account() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;
    mount_profile_no_rows(&server).await;
    mount_account(&server).await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager.sign_in(EMAIL, "secret").await.expect("sign in");

    let state = wait_for_state(&manager, |s| s.user.is_some()).await;
    let user = state.user.unwrap();
    // Minimal user derived from the identity account.
    assert_eq!(user.id, USER_ID);
    assert_eq!(user.email, EMAIL);
    assert_eq!(user.name, "al");
    assert!(user.school.is_none());
    assert!(state.needs_profile_completion);

    manager.shutdown();
}

#[tokio::test]
async fn test_store_error_falls_back_to_account() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;
    mount_profile_error(&server).await;
    mount_account(&server).await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager.sign_in(EMAIL, "secret").await.expect("sign in");

    // The failed read degrades, it does not fail the sign-in.
    let state = wait_for_state(&manager, |s| s.user.is_some()).await;
    assert_eq!(state.user.as_ref().unwrap().name, "al");

    manager.shutdown();
}

#[tokio::test]
async fn test_fallback_failure_returns_placeholder() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;
    mount_profile_error(&server).await;
    // The account endpoint is down too.
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({ "msg": "boom" })),
        )
        .mount(&server)
        .await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager.sign_in(EMAIL, "secret").await.expect("sign in");

    // Even a fully broken profile path hands the UI a user, never an
    // error.
    let state = wait_for_state(&manager, |s| s.user.is_some()).await;
    let user = state.user.unwrap();
    assert_eq!(user.id, USER_ID);
    assert_eq!(user.email, "user@example.com");
    assert_eq!(user.name, "User");

    manager.shutdown();
}

#[tokio::test]
async fn test_partial_profile_sets_completion_flag() {
    let server = MockServer::start().await;
    mount_password_grant(&server).await;

    let mut row = profile_row_json(USER_ID, EMAIL);
    row["target_score"] = serde_json::Value::Null;
    mount_profile_row(&server, row).await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager.sign_in(EMAIL, "secret").await.expect("sign in");

    let state = wait_for_state(&manager, |s| s.user.is_some()).await;
    assert!(state.needs_profile_completion);

    manager.shutdown();
}
