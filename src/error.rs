// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the session core.

/// Error type shared by the identity client, the profile store and the
/// session manager.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    Unauthenticated,

    /// Structured error reported by the identity service. The payload is
    /// the service's own message string.
    #[error("{0}")]
    Auth(String),

    /// Profile store error.
    #[error("{0}")]
    Store(String),

    /// Transport-level failure: connect, timeout, or body decode.
    #[error("{0}")]
    Network(String),

    /// The user cancelled an interactive sign-in flow. Not surfaced as a
    /// failure by the session manager.
    #[error("Sign-in cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// User-facing message for connectivity trouble during sign-in.
    pub const CONNECTION_HELP: &'static str = "Connection error: Please check your internet connection and try again. If the problem persists, the service may be temporarily unavailable.";

    /// User-facing message for rejected credentials.
    pub const BAD_CREDENTIALS_HELP: &'static str =
        "Invalid email or password. Please check your credentials and try again.";

    /// User-facing message for an unconfirmed email address.
    pub const UNCONFIRMED_EMAIL_HELP: &'static str =
        "Please check your email and click the confirmation link before signing in.";

    /// True when this error is the user cancelling an interactive flow.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AuthError::Cancelled)
    }

    /// True when this error looks like a transport/connectivity problem
    /// rather than a decision made by the identity service.
    pub fn is_connectivity(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::Auth(msg) => msg.contains("JSON"),
            _ => false,
        }
    }

    /// Remap a sign-in failure to a user-facing message.
    ///
    /// Known conditions get a fixed help text; anything else passes
    /// through with the service's raw message.
    pub fn friendly_sign_in(self) -> AuthError {
        if self.is_connectivity() {
            return AuthError::Auth(Self::CONNECTION_HELP.to_string());
        }
        match self {
            AuthError::Auth(msg) if msg.contains("Invalid login credentials") => {
                AuthError::Auth(Self::BAD_CREDENTIALS_HELP.to_string())
            }
            AuthError::Auth(msg) if msg.contains("Email not confirmed") => {
                AuthError::Auth(Self::UNCONFIRMED_EMAIL_HELP.to_string())
            }
            AuthError::Auth(msg) if msg.is_empty() => {
                AuthError::Auth("Sign in failed. Please try again.".to_string())
            }
            other => other,
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AuthError>;
