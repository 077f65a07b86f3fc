// End-to-end request flow against a mocked session service

use mockito::Server;
use palisade::api::hooks::SESSION_ID_KEY;
use palisade::infra::HttpSessionBackend;
use palisade::state::ResponseDedup;
use palisade::{ProxyHooks, SessionGuardrail};
use serde_json::{json, Value};
use std::sync::Arc;

fn guardrail_for(server: &Server) -> SessionGuardrail {
    let backend = Arc::new(HttpSessionBackend::new_unauthenticated(
        server.url(),
        "app-test",
        "test",
        server.url(),
    ));
    SessionGuardrail::new(backend, Arc::new(ResponseDedup::new(1024)), 1024)
}

fn request(call_id: &str, content: &str) -> Value {
    json!({
        "model": "gpt-4o",
        "user": "u1",
        "litellm_call_id": call_id,
        "messages": [{ "role": "user", "content": content }]
    })
}

#[tokio::test]
async fn test_allowed_flow_tracks_prompt_and_response() {
    let mut server = Server::new_async().await;
    let guardrail = guardrail_for(&server);

    // Readiness probe plus one real session
    let create_mock = server
        .mock("POST", "/v1/applications/app-test/sessions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "session_id": "s-1" }).to_string())
        .expect(2)
        .create();

    // Prompt append, then response append
    let append_mock = server
        .mock("POST", "/v1/sessions/s-1/actions")
        .with_status(200)
        .expect(2)
        .create();

    let firewall_mock = server
        .mock("GET", "/v1/sessions/s-1/firewall")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "decision": "allow" }).to_string())
        .create();

    let mut data = request("call-1", "hello");
    guardrail.pre_call(&mut data, "completion").await.unwrap();
    assert_eq!(data[SESSION_ID_KEY], json!("s-1"));

    let response = json!({
        "id": "resp-1",
        "choices": [{ "message": { "role": "assistant", "content": "hi" } }]
    });
    guardrail.post_call_success(&data, &response, "completion").await;

    create_mock.assert();
    append_mock.assert();
    firewall_mock.assert();
}

#[tokio::test]
async fn test_blocked_flow_aborts_the_call() {
    let mut server = Server::new_async().await;
    let guardrail = guardrail_for(&server);

    let _create_mock = server
        .mock("POST", "/v1/applications/app-test/sessions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "session_id": "s-1" }).to_string())
        .expect(2)
        .create();

    // Prompt append plus the termination notice
    let append_mock = server
        .mock("POST", "/v1/sessions/s-1/actions")
        .with_status(200)
        .expect(2)
        .create();

    let firewall_mock = server
        .mock("GET", "/v1/sessions/s-1/firewall")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "decision": "block",
                "context": { "violated_policies": [{ "name": "pii-leak" }] }
            })
            .to_string(),
        )
        .create();

    let mut data = request("call-1", "my ssn is 123-45-6789");
    let err = guardrail.pre_call(&mut data, "completion").await.unwrap_err();

    assert!(err.is_policy_violation());
    assert!(err.to_string().contains("pii-leak"));
    append_mock.assert();
    firewall_mock.assert();
}

#[tokio::test]
async fn test_quirky_deployment_still_binds_sessions() {
    let mut server = Server::new_async().await;
    let guardrail = guardrail_for(&server);

    // Every creation reports success through the error channel
    let create_mock = server
        .mock("POST", "/v1/applications/app-test/sessions")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "session_id": "abc-123" }).to_string())
        .expect(2)
        .create();

    let _append_mock = server
        .mock("POST", "/v1/sessions/abc-123/actions")
        .with_status(200)
        .create();

    let _firewall_mock = server
        .mock("GET", "/v1/sessions/abc-123/firewall")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "decision": "allow" }).to_string())
        .create();

    let mut data = request("call-1", "hello");
    guardrail.pre_call(&mut data, "completion").await.unwrap();

    create_mock.assert();
    assert_eq!(data[SESSION_ID_KEY], json!("abc-123"));
}

#[tokio::test]
async fn test_unreachable_service_passes_requests_through() {
    // Point at a closed port; the readiness probe fails and the guardrail
    // degrades to pass-through without touching the request
    let backend = Arc::new(HttpSessionBackend::new_unauthenticated(
        "http://127.0.0.1:1",
        "app-test",
        "test",
        "http://127.0.0.1:1",
    ));
    let guardrail = SessionGuardrail::new(backend, Arc::new(ResponseDedup::new(1024)), 1024);

    let mut data = request("call-1", "hello");
    let before = data.clone();
    guardrail.pre_call(&mut data, "completion").await.unwrap();

    assert_eq!(data, before);
}
