// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

mod common;

use common::*;
use prepdeck_session::models::ProfileSeed;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_sign_up_sets_new_user_flag_before_session() {
    let server = MockServer::start().await;
    // Confirmation-required project: the response is the pending
    // account, with no session attached.
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(account_json(USER_ID, "a@b.com")))
        .mount(&server)
        .await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager
        .sign_up("a@b.com", "x", "Al", None)
        .await
        .expect("sign up");

    let state = manager.state();
    assert!(state.new_user);
    // No session notification yet, so the user stays unset.
    assert!(state.user.is_none());
    assert!(state.session.is_none());

    // The UI clears the flag once onboarding is done.
    manager.set_new_user(false);
    assert!(!manager.state().new_user);

    manager.shutdown();
}

#[tokio::test]
async fn test_sign_up_metadata_carries_name_and_seed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_partial_json(serde_json::json!({
            "email": "a@b.com",
            "data": {
                "name": "Al",
                "school": "Lincoln High",
                "grade": 11,
            },
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_response_json(USER_ID, "a@b.com")),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_profile_no_rows(&server).await;
    mount_account(&server).await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    manager
        .sign_up(
            "a@b.com",
            "x",
            "Al",
            Some(ProfileSeed {
                school: Some("Lincoln High".to_string()),
                grade: Some(11),
                ..ProfileSeed::default()
            }),
        )
        .await
        .expect("sign up");

    // Auto-confirm project: the session arrives via the change stream.
    let state = wait_for_state(&manager, |s| s.session.is_some() && s.user.is_some()).await;
    assert!(state.new_user);
    assert_eq!(state.user.as_ref().unwrap().id, USER_ID);

    manager.shutdown();
}

#[tokio::test]
async fn test_sign_up_error_rethrown_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(serde_json::json!({ "msg": "User already registered" })),
        )
        .mount(&server)
        .await;

    let manager = test_manager(&server, GoogleStub::cancelled()).await;
    let err = manager
        .sign_up("a@b.com", "x", "Al", None)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "User already registered");
    assert!(!manager.state().loading);
    assert!(!manager.state().new_user);

    manager.shutdown();
}
