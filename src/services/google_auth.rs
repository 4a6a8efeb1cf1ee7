// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google sign-in helper.
//!
//! The session manager only depends on the [`GoogleSignIn`] seam: one
//! interactive call that resolves to a Google ID token, or to
//! `AuthError::Cancelled` when the user backs out. [`GoogleOAuth`] is
//! the shipped implementation: an installed-app authorization-code flow
//! with PKCE (S256) and a loopback redirect listener.

use crate::config::Config;
use crate::error::{AuthError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use uuid::Uuid;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// How long the whole interactive flow may take before we give up.
const FLOW_TIMEOUT: Duration = Duration::from_secs(180);

/// Interactive Google sign-in seam.
pub trait GoogleSignIn: Send + Sync {
    /// Runs the interactive flow. Resolves to a Google ID token, or
    /// `AuthError::Cancelled` when the user backs out.
    fn sign_in(&self) -> BoxFuture<'_, Result<String>>;
}

/// Stand-in used when no Google OAuth client is configured.
pub struct GoogleUnavailable;

impl GoogleSignIn for GoogleUnavailable {
    fn sign_in(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async {
            Err(AuthError::Auth(
                "Google sign-in is not configured".to_string(),
            ))
        })
    }
}

/// Installed-app Google OAuth flow: open the consent page in the
/// system browser, catch the redirect on a loopback listener, exchange
/// the code for tokens.
pub struct GoogleOAuth {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    flow_timeout: Duration,
}

impl GoogleOAuth {
    pub fn new(config: &Config) -> Result<Self> {
        let client_id = config
            .google_client_id
            .clone()
            .ok_or_else(|| AuthError::Auth("Google sign-in is not configured".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            client_id,
            client_secret: config.google_client_secret.clone().unwrap_or_default(),
            flow_timeout: FLOW_TIMEOUT,
        })
    }

    async fn run_flow(&self) -> Result<String> {
        // PKCE verifier: 64 chars of uuid material, challenge = S256.
        let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let challenge = pkce_challenge(&verifier);
        let state = Uuid::new_v4().simple().to_string();

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::Network(format!("Could not bind redirect listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Network(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);

        let auth_url = build_authorize_url(&self.client_id, &redirect_uri, &challenge, &state);

        tracing::info!("Opening Google consent page in the browser");
        if open::that(&auth_url).is_err() {
            tracing::info!(url = %auth_url, "Could not launch a browser; open the URL manually");
        }

        let redirect = tokio::time::timeout(self.flow_timeout, accept_redirect(&listener))
            .await
            .map_err(|_| {
                AuthError::Network("Timed out waiting for the sign-in redirect".to_string())
            })??;

        if let Some(error) = redirect.error {
            // Denying the consent screen is the user cancelling.
            if error == "access_denied" {
                return Err(AuthError::Cancelled);
            }
            return Err(AuthError::Auth(format!("Google sign-in failed: {}", error)));
        }

        if redirect.state.as_deref() != Some(state.as_str()) {
            return Err(AuthError::Auth("OAuth state mismatch".to_string()));
        }

        let code = redirect
            .code
            .ok_or_else(|| AuthError::Auth("Redirect missing authorization code".to_string()))?;

        self.exchange_code(&code, &verifier, &redirect_uri).await
    }

    /// Exchange the authorization code for an ID token.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<String> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("code_verifier", verifier),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange failed");
            return Err(AuthError::Auth(format!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let token: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Auth(format!("Failed to parse token response: {}", e)))?;

        Ok(token.id_token)
    }
}

impl GoogleSignIn for GoogleOAuth {
    fn sign_in(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.run_flow())
    }
}

#[derive(Debug, serde::Deserialize)]
struct GoogleTokenResponse {
    id_token: String,
}

/// Query parameters delivered on the loopback redirect.
#[derive(Debug, Default, PartialEq)]
struct RedirectParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Accept a single redirect request and answer it with a tiny page.
async fn accept_redirect(listener: &TcpListener) -> Result<RedirectParams> {
    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| AuthError::Network(e.to_string()))?;

    // The request line is all we need; one read is enough for it.
    let mut buf = vec![0u8; 4096];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| AuthError::Network(e.to_string()))?;
    let request = String::from_utf8_lossy(&buf[..n]);

    let params = parse_redirect_request(&request)
        .ok_or_else(|| AuthError::Auth("Malformed redirect request".to_string()))?;

    let page = "<html><body>Sign-in complete. You can close this window.</body></html>";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        page.len(),
        page
    );
    let _ = stream.write_all(response.as_bytes()).await;

    Ok(params)
}

/// Pull code/state/error out of the redirect's request line.
fn parse_redirect_request(request: &str) -> Option<RedirectParams> {
    // "GET /?code=...&state=... HTTP/1.1"
    let line = request.lines().next()?;
    let path = line.split_whitespace().nth(1)?;
    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");

    let mut params = RedirectParams::default();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(value).ok()?.into_owned();
        match key {
            "code" => params.code = Some(value),
            "state" => params.state = Some(value),
            "error" => params.error = Some(value),
            _ => {}
        }
    }
    Some(params)
}

/// PKCE S256 challenge for a verifier.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn build_authorize_url(client_id: &str, redirect_uri: &str, challenge: &str, state: &str) -> String {
    format!(
        "{}?client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope=openid%20email%20profile&\
         code_challenge={}&\
         code_challenge_method=S256&\
         state={}",
        AUTHORIZE_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        challenge,
        state
    )
}
