// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile store client with typed operations.
//!
//! The store is a PostgREST-compatible keyed record API: point reads by
//! account id and partial updates with an arbitrary field set.

use crate::config::Config;
use crate::db::tables;
use crate::error::{AuthError, Result};
use crate::models::{ProfileRecord, ProfileUpdate};
use chrono::Utc;

/// Error code the store returns for a point read that matched no rows.
/// Expected for accounts whose profile row has not been provisioned yet.
const NO_ROWS_CODE: &str = "PGRST116";

/// Profile store client.
#[derive(Clone)]
pub struct ProfileStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ProfileStore {
    /// Create a new profile store client from the project configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("{}/rest/v1", config.supabase_url),
            api_key: config.supabase_anon_key.clone(),
        })
    }

    /// Point read of a profile row by account id.
    ///
    /// `Ok(None)` is the store's "no rows" condition; any other failure
    /// is a real error.
    pub async fn get_profile(
        &self,
        id: &str,
        access_token: Option<&str>,
    ) -> Result<Option<ProfileRecord>> {
        let url = format!(
            "{}/{}?id=eq.{}&select=*",
            self.base_url,
            tables::USER_PROFILES,
            urlencoding::encode(id)
        );

        let mut request = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            // Single-object form: exactly one row or a PGRST116 error.
            .header(reqwest::header::ACCEPT, "application/vnd.pgrst.object+json");
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if response.status().is_success() {
            return response
                .json()
                .await
                .map(Some)
                .map_err(|e| AuthError::Store(format!("JSON parse error: {}", e)));
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if is_no_rows(&body) {
            return Ok(None);
        }

        Err(AuthError::Store(format!("HTTP {}: {}", status, body)))
    }

    /// Update profile fields by account id. Only the fields set on
    /// `update` are written, plus the update timestamp.
    pub async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
        access_token: Option<&str>,
    ) -> Result<()> {
        let url = format!(
            "{}/{}?id=eq.{}",
            self.base_url,
            tables::USER_PROFILES,
            urlencoding::encode(id)
        );

        let mut body = serde_json::to_value(update)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Update encoding failed: {}", e)))?;
        if let serde_json::Value::Object(map) = &mut body {
            map.insert(
                "updated_at".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }

        let mut request = self
            .http
            .patch(&url)
            .header("apikey", &self.api_key)
            .header("Prefer", "return=minimal")
            .json(&body);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AuthError::Store(format!("HTTP {}: {}", status, body)))
    }
}

/// True when an error body is the store's "no rows" condition.
fn is_no_rows(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("code")
                .and_then(|code| code.as_str())
                .map(|code| code == NO_ROWS_CODE)
        })
        .unwrap_or(false)
}
