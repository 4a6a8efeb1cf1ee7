//! Profile store layer (PostgREST).

pub mod postgrest;

pub use postgrest::ProfileStore;

/// Table names as constants.
pub mod tables {
    pub const USER_PROFILES: &str = "user_profiles";
}
