//! User profile models: the stored row, the derived view, and the
//! mutation payloads.

use serde::{Deserialize, Serialize};

use crate::services::gotrue::AuthUser;

/// Profile row stored in the `user_profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Account id (also the row key)
    pub id: String,
    /// Email address copied into the row at provisioning time
    pub email: String,
    /// Display name
    pub name: Option<String>,
    /// Avatar URL
    pub avatar_url: Option<String>,
    /// School name
    pub school: Option<String>,
    /// School grade/year
    pub grade: Option<u32>,
    /// Practice-test target score
    pub target_score: Option<u32>,
    /// Row timestamps (ISO 8601), set server-side
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Derived user view: identity account merged with the stored profile.
///
/// Never persisted — recomputed whenever the session or the profile
/// changes.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub school: Option<String>,
    pub grade: Option<u32>,
    pub target_score: Option<u32>,
}

/// Fixed fallback identity used when even the account endpoint fails.
const PLACEHOLDER_EMAIL: &str = "user@example.com";
const PLACEHOLDER_NAME: &str = "User";

impl User {
    /// Build the full view from a stored profile row.
    ///
    /// A row without a display name gets the local part of its email.
    pub fn from_record(record: ProfileRecord) -> Self {
        let name = record
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| local_part(&record.email).to_string());
        Self {
            id: record.id,
            email: record.email,
            name,
            avatar: record.avatar_url,
            school: record.school,
            grade: record.grade,
            target_score: record.target_score,
        }
    }

    /// Minimal view derived from the identity account alone, used when
    /// no profile row exists yet.
    pub fn from_account(account: &AuthUser) -> Self {
        let email = account.email.clone().unwrap_or_default();
        let name = if email.is_empty() {
            PLACEHOLDER_NAME.to_string()
        } else {
            local_part(&email).to_string()
        };
        Self {
            id: account.id.clone(),
            email,
            name,
            avatar: None,
            school: None,
            grade: None,
            target_score: None,
        }
    }

    /// Last-resort placeholder returned when the whole profile path
    /// fails unexpectedly. Downstream code always gets data, never an
    /// error, out of the profile fetch.
    pub fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: PLACEHOLDER_EMAIL.to_string(),
            name: PLACEHOLDER_NAME.to_string(),
            avatar: None,
            school: None,
            grade: None,
            target_score: None,
        }
    }

    /// True when any of the essential onboarding fields is missing.
    pub fn needs_profile_completion(&self) -> bool {
        self.school.is_none() || self.grade.is_none() || self.target_score.is_none()
    }

    /// Optimistic merge of a pending profile update into this view.
    pub fn merged_with(&self, update: &ProfileUpdate) -> Self {
        Self {
            id: self.id.clone(),
            email: self.email.clone(),
            name: update.name.clone().unwrap_or_else(|| self.name.clone()),
            avatar: update.avatar_url.clone().or_else(|| self.avatar.clone()),
            school: update.school.clone().or_else(|| self.school.clone()),
            grade: update.grade.or(self.grade),
            target_score: update.target_score.or(self.target_score),
        }
    }
}

/// Local part of an email address ("al" for "al@b.com").
fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Partial profile update written to the profile store. `None` fields
/// are left untouched by the store.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_score: Option<u32>,
}

/// Optional profile fields captured at sign-up and passed along as
/// account metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileSeed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_score: Option<u32>,
}
