//! Domain models for the session guardrail.
//!
//! Pure data structures representing sessions, session events, and firewall
//! verdicts. Free of I/O side effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One remote-tracked conversation bound to an end user.
///
/// The identifier is assigned by the backend; `created_at` gives an explicit
/// recency ordering across bindings instead of relying on map iteration
/// order. Blocked-ness is tracked by the binder's quarantine set, not on the
/// session value itself (copies of `Session` are handed across hooks and
/// would go stale).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub owning_user: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, owning_user: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            owning_user: owning_user.into(),
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a session. `Blocked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Blocked,
}

/// Wire-level event kind accepted by the backend's append endpoint.
///
/// Block and failure notices travel as `completion_output` events with
/// status attributes, the same channel the service uses for responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CompletionPrompt,
    CompletionOutput,
}

/// Error description attached to a failure notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventError {
    pub message: String,
}

/// One append-only record attached to a session.
///
/// Owned by the backend once appended; the guardrail holds no local copy.
/// Start and end timestamps are both taken at construction time.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl SessionEvent {
    fn stamped(kind: EventKind) -> Self {
        let now = Utc::now();
        Self {
            kind,
            start_time: now,
            end_time: now,
            attributes: Map::new(),
            data: None,
            error: None,
        }
    }

    /// Prompt recorded before the model call
    pub fn prompt(model: &str, messages: &[Value]) -> Self {
        let mut event = Self::stamped(EventKind::CompletionPrompt);
        event.attributes.insert("model.id".to_string(), json!(model));
        event.data = Some(json!({ "messages": messages }));
        event
    }

    /// Assistant response recorded after a successful model call
    pub fn response(model: &str, content: &str) -> Self {
        let mut event = Self::stamped(EventKind::CompletionOutput);
        event.attributes.insert("model.id".to_string(), json!(model));
        event.data = Some(json!({
            "messages": [{ "role": "assistant", "content": content }]
        }));
        event
    }

    /// Notice appended when the firewall terminates a session
    pub fn blocked_notice(user_id: &str, policy_names: &[String]) -> Self {
        let mut event = Self::stamped(EventKind::CompletionOutput);
        event
            .attributes
            .insert("status".to_string(), json!("session_blocked"));
        event
            .attributes
            .insert("block_reason".to_string(), json!("firewall_policy_violation"));
        event.attributes.insert("user.id".to_string(), json!(user_id));
        event.data = Some(json!({
            "action": "session_terminated_due_to_policy_violation",
            "violated_policies": policy_names,
        }));
        event
    }

    /// Notice appended when the wrapped model call itself fails
    pub fn terminal_notice(message: &str, blocked: bool) -> Self {
        let mut event = Self::stamped(EventKind::CompletionOutput);
        let (status, reason) = if blocked {
            ("blocked", "firewall_policy")
        } else {
            ("failed", "error")
        };
        event.attributes.insert("status".to_string(), json!(status));
        event
            .attributes
            .insert("block_reason".to_string(), json!(reason));
        event.error = Some(EventError {
            message: message.to_string(),
        });
        event
    }
}

/// One violated policy reported by the firewall. Extra fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolatedPolicy {
    #[serde(default)]
    pub name: Option<String>,
}

impl ViolatedPolicy {
    pub fn name_or_unknown(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerdictContext {
    #[serde(default)]
    pub violated_policies: Vec<ViolatedPolicy>,
}

/// Firewall decision for a session's accumulated history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub decision: String,
    #[serde(default)]
    pub context: VerdictContext,
}

impl PolicyVerdict {
    /// Decision comparison is case-insensitive; anything that is not
    /// "block" counts as allow.
    pub fn is_block(&self) -> bool {
        self.decision.eq_ignore_ascii_case("block")
    }

    /// Violated policy names in report order
    pub fn policy_names(&self) -> Vec<String> {
        self.context
            .violated_policies
            .iter()
            .map(|p| p.name_or_unknown().to_string())
            .collect()
    }
}

/// Outcome of recording a response, for observability and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// First delivery - a Response event was appended
    Recorded,
    /// Response identity already seen - no event appended
    DuplicateId,
    /// Identity was fresh but content fingerprint already seen
    DuplicateContent,
    /// Event append failed; tracking is best-effort so this is terminal
    AppendFailed,
}
