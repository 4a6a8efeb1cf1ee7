// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session smoke tool.
//!
//! Starts the session core against the configured project, optionally
//! runs a password sign-in end to end, prints the resulting state and
//! signs out again. Useful for checking a project's auth configuration
//! without booting the app.

use prepdeck_session::config::Config;
use prepdeck_session::services::{GoogleOAuth, GoogleSignIn, GoogleUnavailable};
use prepdeck_session::SessionManager;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(url = %config.supabase_url, "Starting session probe");

    let google: Arc<dyn GoogleSignIn> = match GoogleOAuth::new(&config) {
        Ok(flow) => Arc::new(flow),
        Err(_) => Arc::new(GoogleUnavailable),
    };

    let manager = SessionManager::start(&config, google).await?;
    let mut state_rx = manager.subscribe();

    if let Some(user) = &manager.state().user {
        tracing::info!(user_id = %user.id, email = %user.email, "Existing session restored");
    }

    let (Ok(email), Ok(password)) = (
        std::env::var("PREPDECK_EMAIL"),
        std::env::var("PREPDECK_PASSWORD"),
    ) else {
        tracing::info!("Set PREPDECK_EMAIL and PREPDECK_PASSWORD to exercise a password sign-in");
        manager.shutdown();
        return Ok(());
    };

    manager.sign_in(&email, &password).await?;

    // Wait for the change stream to deliver the signed-in state.
    let deadline = tokio::time::sleep(Duration::from_secs(15));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::warn!("Timed out waiting for session state");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow().clone();
                if let (Some(session), Some(user)) = (&state.session, &state.user) {
                    tracing::info!(
                        user_id = %user.id,
                        name = %user.name,
                        needs_profile_completion = state.needs_profile_completion,
                        expires_at = %session.expires_at,
                        "Signed in"
                    );
                    break;
                }
            }
        }
    }

    manager.sign_out().await?;
    manager.shutdown();
    Ok(())
}

/// Initialize logging; RUST_LOG overrides the default filter.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("prepdeck_session=debug,info")),
        )
        .init();
}
