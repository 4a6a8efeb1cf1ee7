// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Prepdeck session core.
//!
//! The authentication/session layer of the Prepdeck practice-test app:
//! sign-in, sign-up, sign-out and profile operations against the hosted
//! identity service, with derived state exposed to consuming UI through
//! a watch channel.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod session;

pub use error::{AuthError, Result};
pub use session::{AuthState, SessionManager};
