// Decision enforcement and event recording
//
// Records prompt/response/notice events against a session and enforces the
// block transition after each prompt. Tracking is a side channel: every
// failure here except a policy violation is logged and absorbed.

use crate::api::SessionBackend;
use crate::core::errors::GuardrailError;
use crate::core::models::{DedupOutcome, Session, SessionEvent};
use crate::state::{ResponseDedup, SessionBinder};
use crate::api::extract::response_fingerprint;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Evaluates firewall policy after each recorded prompt and deduplicates
/// response recording under at-least-once callback delivery.
pub struct DecisionTracker {
    backend: Arc<dyn SessionBackend>,
    binder: Arc<SessionBinder>,
    response_dedup: Arc<ResponseDedup>,
}

impl DecisionTracker {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        binder: Arc<SessionBinder>,
        response_dedup: Arc<ResponseDedup>,
    ) -> Self {
        Self {
            backend,
            binder,
            response_dedup,
        }
    }

    /// Append a Prompt event. Best-effort: failures are logged and must
    /// never block the request pipeline by themselves.
    pub async fn record_prompt(&self, session: &Session, model: &str, messages: &[serde_json::Value]) {
        let event = SessionEvent::prompt(model, messages);
        match self.backend.append_event(&session.session_id, event).await {
            Ok(()) => debug!(session_id = %session.session_id, "recorded prompt"),
            Err(err) => warn!(
                session_id = %session.session_id,
                error = %err,
                "failed to record prompt"
            ),
        }
    }

    /// Ask the firewall for a verdict on the session's history.
    ///
    /// A block verdict quarantines the session, drops the user binding,
    /// appends a termination notice, and returns the one error that must
    /// reach the proxy boundary. Evaluation-service failures are treated
    /// as Allow - firewall unavailability must not itself block traffic.
    pub async fn evaluate(&self, session: &Session) -> Result<(), GuardrailError> {
        let verdict = match self.backend.evaluate_policy(&session.session_id).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(
                    session_id = %session.session_id,
                    error = %err,
                    "firewall check failed; allowing request"
                );
                return Ok(());
            }
        };

        if !verdict.is_block() {
            debug!(
                session_id = %session.session_id,
                decision = %verdict.decision,
                "request allowed"
            );
            return Ok(());
        }

        let policy_names = verdict.policy_names();
        info!(
            session_id = %session.session_id,
            user_id = %session.owning_user,
            policies = ?policy_names,
            "firewall blocked request; terminating session"
        );

        self.binder.mark_blocked(session);

        let notice = SessionEvent::blocked_notice(&session.owning_user, &policy_names);
        if let Err(err) = self.backend.append_event(&session.session_id, notice).await {
            warn!(
                session_id = %session.session_id,
                error = %err,
                "failed to record session termination notice"
            );
        }

        Err(GuardrailError::PolicyViolation(policy_names.join(", ")))
    }

    /// Append a Response event exactly once per logical response.
    ///
    /// Deduplicated both by response identity and by identity+content
    /// fingerprint in the shared process-wide cache. Never raises outward;
    /// the response always goes back to the caller unchanged.
    pub async fn record_response(
        &self,
        response_id: &str,
        session_id: &str,
        model: &str,
        content: &str,
    ) -> DedupOutcome {
        if !self.response_dedup.check_and_insert(response_id) {
            debug!(response_id = %response_id, "duplicate response delivery; skipping");
            return DedupOutcome::DuplicateId;
        }

        let fingerprint = response_fingerprint(response_id, content);
        if !self.response_dedup.check_and_insert(&fingerprint) {
            debug!(
                response_id = %response_id,
                "duplicate response content; skipping"
            );
            return DedupOutcome::DuplicateContent;
        }

        let event = SessionEvent::response(model, content);
        match self.backend.append_event(session_id, event).await {
            Ok(()) => {
                debug!(session_id = %session_id, response_id = %response_id, "recorded response");
                DedupOutcome::Recorded
            }
            Err(err) => {
                warn!(
                    session_id = %session_id,
                    error = %err,
                    "failed to record response"
                );
                DedupOutcome::AppendFailed
            }
        }
    }

    /// Annotate a post-call failure against the most recently created
    /// session. Classified `blocked` when the error is this crate's
    /// policy-violation condition, `failed` otherwise. The caller re-raises
    /// the original error unconditionally; this only attempts to log.
    pub async fn record_terminal_failure(&self, original_error: &anyhow::Error) {
        let Some(session) = self.binder.latest_session() else {
            debug!("no session bound; terminal failure not recorded");
            return;
        };

        let blocked = original_error
            .downcast_ref::<GuardrailError>()
            .map(GuardrailError::is_policy_violation)
            .unwrap_or(false);

        let notice = SessionEvent::terminal_notice(&original_error.to_string(), blocked);
        match self.backend.append_event(&session.session_id, notice).await {
            Ok(()) => {
                if blocked {
                    info!(session_id = %session.session_id, "recorded firewall block");
                } else {
                    info!(session_id = %session.session_id, "recorded upstream failure");
                }
            }
            Err(err) => warn!(
                session_id = %session.session_id,
                error = %err,
                "failed to record terminal failure"
            ),
        }
    }
}
