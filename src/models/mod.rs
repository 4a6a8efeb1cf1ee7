// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the session core.

pub mod session;
pub mod user;

pub use session::Session;
pub use user::{ProfileRecord, ProfileSeed, ProfileUpdate, User};
