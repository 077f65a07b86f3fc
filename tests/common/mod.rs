// Common test utilities and helpers for all test modules

use async_trait::async_trait;
use palisade::core::errors::BackendError;
use palisade::core::models::{EventKind, PolicyVerdict, SessionEvent, VerdictContext, ViolatedPolicy};
use palisade::SessionBackend;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted mock SessionBackend for unit tests
///
/// Create calls return scripted results first, then generated sequential
/// session ids. Appends are recorded for inspection. Verdicts are consumed
/// in script order; with an empty script every evaluation allows.
pub struct MockBackend {
    create_count: AtomicUsize,
    scripted_creates: Mutex<VecDeque<Result<String, BackendError>>>,
    pub append_should_fail: AtomicBool,
    appended: Mutex<Vec<(String, SessionEvent)>>,
    scripted_verdicts: Mutex<VecDeque<Result<PolicyVerdict, BackendError>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            create_count: AtomicUsize::new(0),
            scripted_creates: Mutex::new(VecDeque::new()),
            append_should_fail: AtomicBool::new(false),
            appended: Mutex::new(Vec::new()),
            scripted_verdicts: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a result for the next create_session call
    pub fn script_create(&self, result: Result<String, BackendError>) {
        self.scripted_creates.lock().unwrap().push_back(result);
    }

    /// Queue a result for the next evaluate_policy call
    pub fn script_verdict(&self, result: Result<PolicyVerdict, BackendError>) {
        self.scripted_verdicts.lock().unwrap().push_back(result);
    }

    pub fn create_calls(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn appended_events(&self) -> Vec<(String, SessionEvent)> {
        self.appended.lock().unwrap().clone()
    }

    pub fn appended_of_kind(&self, kind: EventKind) -> Vec<(String, SessionEvent)> {
        self.appended
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| event.kind == kind)
            .cloned()
            .collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn create_session(
        &self,
        _attributes: &HashMap<String, String>,
    ) -> Result<String, BackendError> {
        let n = self.create_count.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.scripted_creates.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(format!("session-{}", n))
    }

    async fn append_event(
        &self,
        session_id: &str,
        event: SessionEvent,
    ) -> Result<(), BackendError> {
        if self.append_should_fail.load(Ordering::SeqCst) {
            return Err(BackendError::Transport("append refused".to_string()));
        }
        self.appended
            .lock()
            .unwrap()
            .push((session_id.to_string(), event));
        Ok(())
    }

    async fn evaluate_policy(&self, _session_id: &str) -> Result<PolicyVerdict, BackendError> {
        if let Some(scripted) = self.scripted_verdicts.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(allow_verdict())
    }
}

pub fn allow_verdict() -> PolicyVerdict {
    PolicyVerdict {
        decision: "allow".to_string(),
        context: VerdictContext::default(),
    }
}

pub fn block_verdict(decision: &str, policy_names: &[&str]) -> PolicyVerdict {
    PolicyVerdict {
        decision: decision.to_string(),
        context: VerdictContext {
            violated_policies: policy_names
                .iter()
                .map(|name| ViolatedPolicy {
                    name: Some(name.to_string()),
                })
                .collect(),
        },
    }
}

/// The quirky deployment's "success through the error channel"
pub fn success_as_error(session_id: &str) -> BackendError {
    BackendError::Http {
        status: 201,
        body: format!(r#"{{"session_id": "{}"}}"#, session_id),
    }
}
