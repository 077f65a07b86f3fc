// Public trait seams: the remote collaborator contract and the host
// proxy's hook contract.

pub mod extract;
pub mod hooks;

use crate::core::errors::{BackendError, GuardrailError};
use crate::core::models::{PolicyVerdict, SessionEvent};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

pub use hooks::SessionGuardrail;

/// Remote session/telemetry and policy-evaluation service.
///
/// Three operations: create a session, append an event to it, and evaluate
/// firewall policy over its accumulated history. Event appends are
/// fire-and-forget from the guardrail's perspective.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Create a session tagged with the given attributes, returning its
    /// backend-assigned identifier.
    ///
    /// Some deployments report a successful creation through the error
    /// channel with the identifier embedded in the message; callers apply
    /// `state::session_binder::rescue_session_id` before treating an error
    /// as fatal.
    async fn create_session(
        &self,
        attributes: &HashMap<String, String>,
    ) -> Result<String, BackendError>;

    /// Append one event to a session's history
    async fn append_event(
        &self,
        session_id: &str,
        event: SessionEvent,
    ) -> Result<(), BackendError>;

    /// Firewall verdict for the session's accumulated history
    async fn evaluate_policy(&self, session_id: &str) -> Result<PolicyVerdict, BackendError>;
}

/// The host proxy's hook contract.
///
/// `pre_call` may fail to abort the model call; the only error this crate
/// deliberately produces there is `GuardrailError::PolicyViolation`.
/// `post_call_success` never fails - the response goes back to the caller
/// unchanged regardless of tracking. `post_call_failure` hands the original
/// error back so the host re-raises it.
#[async_trait]
pub trait ProxyHooks: Send + Sync {
    async fn pre_call(
        &self,
        request_data: &mut Value,
        call_type: &str,
    ) -> Result<(), GuardrailError>;

    async fn post_call_success(&self, request_data: &Value, response: &Value, call_type: &str);

    #[must_use = "the host must re-raise the returned error"]
    async fn post_call_failure(
        &self,
        error: anyhow::Error,
        request_data: &Value,
        call_type: &str,
    ) -> anyhow::Error;
}
