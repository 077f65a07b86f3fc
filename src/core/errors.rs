// Domain error types - typed end to end, no string matching on messages

use thiserror::Error;

/// Main error type for the guardrail
///
/// Only `PolicyViolation` is ever surfaced to the proxy boundary; every
/// other variant is caught at the narrowest scope and degrades to
/// pass-through plus a log line.
#[derive(Error, Debug)]
pub enum GuardrailError {
    /// Firewall verdict was Block - the one deliberate hard failure
    #[error("Request blocked by firewall. Session terminated. Violated policies: {0}")]
    PolicyViolation(String),

    /// Session backend not reachable/initialized - degrade to pass-through
    #[error("Session backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Best-effort telemetry failed - logged and absorbed
    #[error("Tracking failure: {0}")]
    Tracking(String),

    /// Configuration error - surfaced at construction time only
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Remote collaborator call failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl GuardrailError {
    /// Whether this error must propagate to the proxy boundary as a hard
    /// rejection. Everything else fails open.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, GuardrailError::PolicyViolation(_))
    }
}

/// Errors from the remote session/firewall service
#[derive(Error, Debug)]
pub enum BackendError {
    /// Non-success HTTP status with response body
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Network-level failure (connect, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("Unexpected response shape: {0}")]
    Deserialize(String),

    /// Token endpoint rejected the credential exchange
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err.to_string())
    }
}
