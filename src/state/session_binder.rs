// User-to-session binding, blocked-session quarantine, and request dedup
//
// All state is in-memory and scoped to one guardrail instance, except the
// response dedup which is injected separately (see state::response_dedup).
// The mutex is never held across an await: remote calls are awaited first,
// then the result is folded into state under a short lock.

use crate::api::SessionBackend;
use crate::core::errors::{BackendError, GuardrailError};
use crate::core::models::{Session, SessionState};
use moka::sync::Cache;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Attribute tag stamped on every session this guardrail creates
const SOURCE_TAG: &str = "palisade-guardrail";

/// Default capacity of the per-instance request-fingerprint cache
pub const DEFAULT_REQUEST_DEDUP_CAPACITY: u64 = 10_000;

/// Outcome of resolving a user to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A usable session, freshly created or reused
    Bound(Session),
    /// This request fingerprint was already handled by this instance;
    /// the caller passes the request through unmodified.
    Duplicate,
}

#[derive(Default)]
struct BinderState {
    bindings: HashMap<String, Session>,
    /// Quarantined session ids. Monotonic: ids are never removed, so a
    /// blocked session can never be rebound.
    blocked: HashSet<String>,
}

/// Maps user identities to remote sessions and guards against duplicate
/// request processing.
pub struct SessionBinder {
    backend: Arc<dyn SessionBackend>,
    ready: AtomicBool,
    state: Mutex<BinderState>,
    seen_requests: Cache<String, ()>,
}

impl SessionBinder {
    pub fn new(backend: Arc<dyn SessionBackend>, request_dedup_capacity: u64) -> Self {
        Self {
            backend,
            ready: AtomicBool::new(false),
            state: Mutex::new(BinderState::default()),
            seen_requests: Cache::builder()
                .max_capacity(request_dedup_capacity)
                .build(),
        }
    }

    /// Idempotent readiness probe against the backend.
    ///
    /// On first call, attempts a trial session creation. A failure that
    /// carries an embedded session id is the success-as-error quirk and
    /// counts as ready. Any other failure returns false - never an error -
    /// and the probe is retried on the next request.
    pub async fn ensure_backend_ready(&self) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return true;
        }

        let probe_attributes =
            HashMap::from([("test".to_string(), "init_check".to_string())]);
        match self.backend.create_session(&probe_attributes).await {
            Ok(session_id) => {
                debug!(session_id = %session_id, "backend readiness probe succeeded");
                self.ready.store(true, Ordering::Release);
                true
            }
            Err(err) => match rescue_session_id(&err) {
                Some(session_id) => {
                    debug!(
                        session_id = %session_id,
                        "backend readiness probe succeeded through the error channel"
                    );
                    self.ready.store(true, Ordering::Release);
                    true
                }
                None => {
                    warn!(error = %err, "session backend not ready; requests pass through untracked");
                    false
                }
            },
        }
    }

    /// Resolve a user identity to a usable session for the current request.
    ///
    /// Returns `Resolution::Duplicate` if this fingerprint was already
    /// processed by this instance. Otherwise reuses the existing binding
    /// unless it points at a quarantined session, in which case the binding
    /// is discarded and a fresh session is created.
    ///
    /// Backend failures during creation propagate; the pre-call hook fails
    /// open on everything except a policy violation.
    pub async fn resolve_session(
        &self,
        user_id: &str,
        model: &str,
        request_fingerprint: &str,
    ) -> Result<Resolution, GuardrailError> {
        if !self
            .seen_requests
            .entry(request_fingerprint.to_string())
            .or_insert(())
            .is_fresh()
        {
            debug!(fingerprint = %request_fingerprint, "duplicate request delivery; skipping");
            return Ok(Resolution::Duplicate);
        }

        if let Some(session) = self.lookup_binding(user_id) {
            debug!(user_id = %user_id, session_id = %session.session_id, "reusing session");
            return Ok(Resolution::Bound(session));
        }

        let attributes = HashMap::from([
            ("user.id".to_string(), user_id.to_string()),
            ("model.name".to_string(), model.to_string()),
            ("source".to_string(), SOURCE_TAG.to_string()),
        ]);

        let session_id = match self.backend.create_session(&attributes).await {
            Ok(id) => id,
            Err(err) => match rescue_session_id(&err) {
                Some(id) => {
                    info!(session_id = %id, "extracted session id from creation error channel");
                    id
                }
                None => return Err(err.into()),
            },
        };

        let session = Session::new(session_id, user_id);

        // Two concurrent first requests from the same user can both reach
        // the create call. Re-check under the lock and prefer whichever
        // binding landed first; the loser's session is simply abandoned.
        let mut state = self.state.lock().expect("binder state poisoned");
        if let Some(current) = state.bindings.get(user_id) {
            if !state.blocked.contains(&current.session_id) {
                return Ok(Resolution::Bound(current.clone()));
            }
        }
        info!(user_id = %user_id, session_id = %session.session_id, "created session");
        state.bindings.insert(user_id.to_string(), session.clone());
        Ok(Resolution::Bound(session))
    }

    /// Existing non-quarantined binding for `user_id`, dropping a
    /// quarantined one on the way.
    fn lookup_binding(&self, user_id: &str) -> Option<Session> {
        let mut state = self.state.lock().expect("binder state poisoned");
        match state.bindings.get(user_id) {
            Some(session) if !state.blocked.contains(&session.session_id) => {
                Some(session.clone())
            }
            Some(session) => {
                info!(
                    user_id = %user_id,
                    session_id = %session.session_id,
                    "previous session was blocked; a new one will be created"
                );
                state.bindings.remove(user_id);
                None
            }
            None => None,
        }
    }

    /// Quarantine a session and drop its user binding if it still points
    /// at this session. Monotonic: there is no way back to Active.
    pub fn mark_blocked(&self, session: &Session) {
        let mut state = self.state.lock().expect("binder state poisoned");
        state.blocked.insert(session.session_id.clone());
        let still_bound = state
            .bindings
            .get(&session.owning_user)
            .map(|bound| bound.session_id == session.session_id)
            .unwrap_or(false);
        if still_bound {
            state.bindings.remove(&session.owning_user);
            info!(
                user_id = %session.owning_user,
                session_id = %session.session_id,
                "removed blocked session binding"
            );
        }
    }

    /// Lifecycle state of a session id. Blocked is terminal.
    pub fn session_state(&self, session_id: &str) -> SessionState {
        let state = self.state.lock().expect("binder state poisoned");
        if state.blocked.contains(session_id) {
            SessionState::Blocked
        } else {
            SessionState::Active
        }
    }

    /// Current binding for a user, if any
    pub fn bound_session(&self, user_id: &str) -> Option<Session> {
        let state = self.state.lock().expect("binder state poisoned");
        state.bindings.get(user_id).cloned()
    }

    /// Most recently created session across all current bindings, by the
    /// explicit creation timestamp.
    pub fn latest_session(&self) -> Option<Session> {
        let state = self.state.lock().expect("binder state poisoned");
        state
            .bindings
            .values()
            .max_by_key(|session| session.created_at)
            .cloned()
    }
}

/// Recognize the backend defect where a successful creation is reported
/// through the failure channel: a 201 response surfaced as an error whose
/// message embeds the assigned `"session_id"`. Returns the identifier when
/// the error is recognizably that case.
pub fn rescue_session_id(err: &BackendError) -> Option<String> {
    let message = err.to_string();
    if !message.contains("201") {
        return None;
    }
    embedded_session_id(&message)
}

fn embedded_session_id(message: &str) -> Option<String> {
    let key = "\"session_id\"";
    let at = message.find(key)?;
    let rest = message[at + key.len()..].trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    if end == 0 {
        return None;
    }
    Some(rest[..end].to_string())
}
