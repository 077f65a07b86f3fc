// OIDC client-credentials token provider
//
// Tokens are fetched from the configured token endpoint and cached until
// shortly before expiry. The cache lock is held only around reads and
// writes, never across the token request; concurrent refreshes are
// harmless duplicates.

use crate::core::errors::BackendError;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Mutex;
use tracing::debug;

/// Refresh this many seconds before the reported expiry
const EXPIRY_LEEWAY_SECS: i64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Client-credentials grant against an OIDC token endpoint
pub struct OidcClientCredentials {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl OidcClientCredentials {
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            cached: Mutex::new(None),
        }
    }

    /// A currently-valid access token, fetching a fresh one when the cached
    /// token is absent or about to expire.
    pub async fn access_token(&self) -> Result<String, BackendError> {
        let now = Utc::now();
        {
            let cached = self.cached.lock().expect("token cache poisoned");
            if let Some(token) = cached.as_ref() {
                if token.expires_at > now {
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!(token_url = %self.token_url, "fetching access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Deserialize(format!("token response: {}", e)))?;

        let expires_at =
            now + Duration::seconds((token.expires_in - EXPIRY_LEEWAY_SECS).max(0));
        let mut cached = self.cached.lock().expect("token cache poisoned");
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at,
        });

        Ok(token.access_token)
    }
}
