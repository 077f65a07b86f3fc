// HTTP client for the remote session/firewall service

use crate::api::SessionBackend;
use crate::config::Config;
use crate::core::errors::{BackendError, GuardrailError};
use crate::core::models::{PolicyVerdict, SessionEvent};
use crate::infra::oidc::OidcClientCredentials;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    session_id: String,
}

/// reqwest-backed implementation of the session service contract.
///
/// Session creation and event appends go to the base API; policy lookups
/// go to the firewall endpoint. Both share one pooled client. When OIDC
/// credentials are configured every request carries a bearer token.
pub struct HttpSessionBackend {
    client: Client,
    base_url: String,
    application_id: String,
    environment: String,
    firewall_base_url: String,
    auth: Option<OidcClientCredentials>,
}

impl HttpSessionBackend {
    pub fn from_config(config: &Config) -> Result<Self, GuardrailError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(Duration::from_secs(2))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                GuardrailError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let auth = match (&config.oidc_token_url, &config.oidc_client_id, &config.oidc_client_secret)
        {
            (Some(token_url), Some(client_id), Some(secret)) => Some(OidcClientCredentials::new(
                client.clone(),
                token_url.clone(),
                client_id.clone(),
                secret.clone(),
            )),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            application_id: config.application_id.clone(),
            environment: config.environment.clone(),
            firewall_base_url: config.firewall_base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Test/embedding constructor with explicit endpoints and no auth
    pub fn new_unauthenticated(
        base_url: impl Into<String>,
        application_id: impl Into<String>,
        environment: impl Into<String>,
        firewall_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_id: application_id.into(),
            environment: environment.into(),
            firewall_base_url: firewall_base_url.into().trim_end_matches('/').to_string(),
            auth: None,
        }
    }

    async fn bearer_token(&self) -> Result<Option<String>, BackendError> {
        match &self.auth {
            Some(auth) => Ok(Some(auth.access_token().await?)),
            None => Ok(None),
        }
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        token: Option<String>,
    ) -> reqwest::RequestBuilder {
        match token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn create_session(
        &self,
        attributes: &HashMap<String, String>,
    ) -> Result<String, BackendError> {
        let url = format!(
            "{}/v1/applications/{}/sessions",
            self.base_url, self.application_id
        );
        let token = self.bearer_token().await?;

        debug!(url = %url, "creating session");
        let response = self
            .authorize(self.client.post(&url), token)
            .json(&json!({
                "environment": self.environment,
                "attributes": attributes,
            }))
            .send()
            .await?;

        // The service contract says 200 with a session_id body. Defective
        // deployments answer 201 and land in the Http error below; callers
        // rescue those via rescue_session_id.
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Deserialize(format!("create session: {}", e)))?;
        Ok(created.session_id)
    }

    async fn append_event(
        &self,
        session_id: &str,
        event: SessionEvent,
    ) -> Result<(), BackendError> {
        let url = format!("{}/v1/sessions/{}/actions", self.base_url, session_id);
        let token = self.bearer_token().await?;

        let response = self
            .authorize(self.client.post(&url), token)
            .json(&event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn evaluate_policy(&self, session_id: &str) -> Result<PolicyVerdict, BackendError> {
        let url = format!(
            "{}/v1/sessions/{}/firewall",
            self.firewall_base_url, session_id
        );
        let token = self.bearer_token().await?;

        debug!(session_id = %session_id, "requesting firewall verdict");
        let response = self.authorize(self.client.get(&url), token).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Deserialize(format!("firewall verdict: {}", e)))
    }
}
