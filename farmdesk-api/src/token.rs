//! Warehouse bearer tokens.
//!
//! A static token short-circuits everything. Otherwise each call performs a
//! fresh OAuth client-credentials exchange; nothing is cached.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;

use crate::config::OAuthConfig;

/// Number of response characters written to the debug log.
const RESPONSE_LOG_CHARS: usize = 300;

/// Errors raised while obtaining a bearer token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing OAuth configuration: {0}")]
    MissingCredentials(&'static str),

    #[error("Token endpoint rejected the request with status {status}")]
    Rejected { status: u16, payload: Value },

    #[error("No access_token in token response")]
    MissingAccessToken,

    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

/// Source of bearer tokens for the warehouse.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<SecretString, TokenError>;
}

/// Token source backed by `OAuthConfig`.
pub struct OAuthTokenProvider {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthTokenProvider {
    pub fn new(config: OAuthConfig, timeout: Duration) -> Result<Self, TokenError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { config, http })
    }

    async fn exchange(&self) -> Result<SecretString, TokenError> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or(TokenError::MissingCredentials("DATABRICKS_CLIENT_ID"))?;
        let client_secret = self
            .config
            .client_secret
            .as_ref()
            .ok_or(TokenError::MissingCredentials("DATABRICKS_CLIENT_SECRET"))?;

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret()),
            ("scope", "all"),
        ];

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let payload: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));

        tracing::debug!(
            status = status.as_u16(),
            response = %redacted_preview(&payload),
            "Token response (partial)"
        );

        if !status.is_success() {
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                payload,
            });
        }

        parse_access_token(&payload)
    }
}

#[async_trait]
impl TokenSource for OAuthTokenProvider {
    async fn bearer_token(&self) -> Result<SecretString, TokenError> {
        if let Some(token) = &self.config.static_token {
            return Ok(token.clone());
        }
        self.exchange().await.inspect_err(|e| {
            tracing::error!(error = %e, endpoint = %self.config.token_endpoint, "Token fetch failed");
        })
    }
}

/// Pull `access_token` out of a successful token response.
fn parse_access_token(payload: &Value) -> Result<SecretString, TokenError> {
    if !payload.is_object() {
        return Err(TokenError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    }
    payload
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(|t| SecretString::new(t.into()))
        .ok_or(TokenError::MissingAccessToken)
}

/// First characters of the response with the token value masked.
fn redacted_preview(payload: &Value) -> String {
    let mut shown = payload.clone();
    if let Some(token) = shown.get_mut("access_token") {
        *token = Value::String("[REDACTED]".to_string());
    }
    shown.to_string().chars().take(RESPONSE_LOG_CHARS).collect()
}
