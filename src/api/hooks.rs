// Pre/post-call hook implementation wired into the host proxy
//
// Control flow: pre-call resolves or creates a session, records the prompt,
// and asks the firewall for a verdict; a block aborts the call, everything
// else passes through. Post-call success records the response once; post-call
// failure annotates the newest session and hands the error back unchanged.

use crate::api::extract;
use crate::api::{ProxyHooks, SessionBackend};
use crate::config::Config;
use crate::core::errors::GuardrailError;
use crate::engine::DecisionTracker;
use crate::infra::HttpSessionBackend;
use crate::state::{Resolution, ResponseDedup, SessionBinder};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Keys stamped into the request mapping on a successful pre-call so the
/// post-call hooks can correlate the response with its session.
pub const SESSION_ID_KEY: &str = "_palisade_session_id";
pub const USER_ID_KEY: &str = "_palisade_user_id";
pub const REQUEST_ID_KEY: &str = "_palisade_request_id";

/// Stateful guardrail instance owning a session binder and decision tracker
pub struct SessionGuardrail {
    binder: Arc<SessionBinder>,
    tracker: DecisionTracker,
}

impl SessionGuardrail {
    /// Wire a guardrail from parts. `response_dedup` is shared across all
    /// instances in the process; pass the same `Arc` to each.
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        response_dedup: Arc<ResponseDedup>,
        request_dedup_capacity: u64,
    ) -> Self {
        let binder = Arc::new(SessionBinder::new(backend.clone(), request_dedup_capacity));
        let tracker = DecisionTracker::new(backend, binder.clone(), response_dedup);
        Self { binder, tracker }
    }

    /// Construct from configuration with an HTTP backend
    pub fn from_config(
        config: &Config,
        response_dedup: Arc<ResponseDedup>,
    ) -> Result<Self, GuardrailError> {
        let backend = Arc::new(HttpSessionBackend::from_config(config)?);
        Ok(Self::new(
            backend,
            response_dedup,
            config.request_dedup_capacity,
        ))
    }

    /// Binder handle, for embedders that inspect session state
    pub fn binder(&self) -> &Arc<SessionBinder> {
        &self.binder
    }

    /// The tracked part of pre-call: resolve, record, evaluate, stamp.
    /// Every error propagates to the caller, which fails open on anything
    /// that is not a policy violation.
    async fn pre_call_tracked(
        &self,
        request_data: &mut Value,
        fingerprint: &str,
    ) -> Result<(), GuardrailError> {
        let user_id = extract::extract_user_id(request_data);
        let model = extract::extract_model(request_data).to_string();

        let session = match self
            .binder
            .resolve_session(&user_id, &model, fingerprint)
            .await?
        {
            Resolution::Bound(session) => session,
            Resolution::Duplicate => return Ok(()),
        };

        let messages = extract::extract_messages(request_data);
        self.tracker.record_prompt(&session, &model, &messages).await;

        self.tracker.evaluate(&session).await?;

        if let Some(map) = request_data.as_object_mut() {
            map.insert(SESSION_ID_KEY.to_string(), json!(session.session_id));
            map.insert(USER_ID_KEY.to_string(), json!(user_id));
            map.insert(REQUEST_ID_KEY.to_string(), json!(fingerprint));
        }
        Ok(())
    }
}

#[async_trait]
impl ProxyHooks for SessionGuardrail {
    /// Pre-call: bind a session, track the prompt, enforce the firewall.
    ///
    /// Fails open: any internal fault leaves the request untouched. The
    /// only error returned is a policy violation, which the host turns
    /// into a hard rejection.
    async fn pre_call(
        &self,
        request_data: &mut Value,
        call_type: &str,
    ) -> Result<(), GuardrailError> {
        let fingerprint = extract::request_fingerprint(request_data);
        debug!(call_type = %call_type, fingerprint = %fingerprint, "pre-call");

        if !self.binder.ensure_backend_ready().await {
            return Ok(());
        }

        match self.pre_call_tracked(request_data, &fingerprint).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_policy_violation() => Err(err),
            Err(err) => {
                warn!(error = %err, "pre-call tracking failed; passing request through");
                Ok(())
            }
        }
    }

    /// Post-call success: record the response once. The response is never
    /// modified and tracking faults are absorbed.
    async fn post_call_success(&self, request_data: &Value, response: &Value, call_type: &str) {
        let Some(session_id) = request_data.get(SESSION_ID_KEY).and_then(Value::as_str) else {
            debug!(call_type = %call_type, "no session recorded for response; skipping");
            return;
        };

        // Responses without a provider-assigned id fall back to a generated
        // one; the content fingerprint still collapses exact redeliveries.
        let response_id = extract::response_id(response)
            .map(str::to_string)
            .unwrap_or_else(|| format!("resp_{}", Uuid::new_v4()));
        let content = extract::response_content(response);
        let model = extract::extract_model(request_data);

        let outcome = self
            .tracker
            .record_response(&response_id, session_id, model, content)
            .await;
        debug!(
            session_id = %session_id,
            response_id = %response_id,
            outcome = ?outcome,
            "post-call success"
        );
    }

    /// Post-call failure: annotate the newest session, then hand the
    /// original error back for the host to re-raise. Never swallows it.
    async fn post_call_failure(
        &self,
        error: anyhow::Error,
        _request_data: &Value,
        call_type: &str,
    ) -> anyhow::Error {
        debug!(call_type = %call_type, error = %error, "post-call failure");
        self.tracker.record_terminal_failure(&error).await;
        error
    }
}
