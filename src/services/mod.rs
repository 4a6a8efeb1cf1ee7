// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - identity client, session lifecycle, sign-in flows.

pub mod google_auth;
pub mod gotrue;
pub mod session_cache;

pub use google_auth::{GoogleOAuth, GoogleSignIn, GoogleUnavailable};
pub use gotrue::{AuthChange, AuthService, AuthUser, GoTrueClient};
pub use session_cache::SessionCache;
