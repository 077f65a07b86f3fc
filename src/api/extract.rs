// Request/response field extraction and dedup fingerprints
//
// Extraction is pure and deterministic: the same request payload always
// yields the same identity and fingerprint.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Sentinel identity used when no user id can be extracted
pub const DEFAULT_USER_ID: &str = "default_user_id";

/// Recognized user-id header names, checked in priority order.
/// Matching against the request's header keys is case-insensitive.
const USER_ID_HEADERS: [&str; 2] = ["x-user-id", "user-id"];

/// Extract the end-user identity from a request payload.
///
/// Priority order, first non-empty wins:
/// 1. a user-id header inside `metadata.headers`
/// 2. the top-level `user` field
/// 3. the `DEFAULT_USER_ID` sentinel
pub fn extract_user_id(request: &Value) -> String {
    if let Some(headers) = request
        .get("metadata")
        .and_then(|m| m.get("headers"))
        .and_then(Value::as_object)
    {
        for wanted in USER_ID_HEADERS {
            let found = headers.iter().find_map(|(key, value)| {
                if key.eq_ignore_ascii_case(wanted) {
                    value.as_str().filter(|v| !v.is_empty())
                } else {
                    None
                }
            });
            if let Some(user_id) = found {
                return user_id.to_string();
            }
        }
    }

    if let Some(user) = request.get("user").and_then(Value::as_str) {
        if !user.is_empty() {
            return user.to_string();
        }
    }

    DEFAULT_USER_ID.to_string()
}

/// Model name from the request, with the conventional fallback
pub fn extract_model(request: &Value) -> &str {
    request.get("model").and_then(Value::as_str).unwrap_or("unknown")
}

/// Ordered message records from the request body
pub fn extract_messages(request: &Value) -> Vec<Value> {
    request
        .get("messages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Fingerprint identifying one delivery of a request.
///
/// Derived from the host-assigned call id (when the host provides one)
/// plus the serialized message content. Without a call id the fingerprint
/// degrades to content-only, which collapses byte-identical resends.
pub fn request_fingerprint(request: &Value) -> String {
    let mut hasher = Sha256::new();
    if let Some(call_id) = request.get("litellm_call_id").and_then(Value::as_str) {
        hasher.update(call_id.as_bytes());
        hasher.update(b"\x1f");
    }
    let messages = request.get("messages").cloned().unwrap_or(Value::Null);
    hasher.update(messages.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Fingerprint identifying one logical response delivery.
///
/// Keyed by response identity plus a hash of the content so that
/// redelivered callbacks collapse even when the host re-wraps the payload.
pub fn response_fingerprint(response_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(response_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(content.as_bytes());
    format!("content_{}", hex::encode(hasher.finalize()))
}

/// Response identity assigned by the upstream provider, if any
pub fn response_id(response: &Value) -> Option<&str> {
    response
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Assistant content of the first choice, empty when absent
pub fn response_content(response: &Value) -> &str {
    response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
}
