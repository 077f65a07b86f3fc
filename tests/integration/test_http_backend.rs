// Integration tests for the HTTP session backend

use mockito::Server;
use palisade::core::errors::BackendError;
use palisade::core::models::SessionEvent;
use palisade::infra::HttpSessionBackend;
use palisade::state::session_binder::rescue_session_id;
use palisade::SessionBackend;
use serde_json::json;
use std::collections::HashMap;

fn backend_for(server: &Server) -> HttpSessionBackend {
    HttpSessionBackend::new_unauthenticated(server.url(), "app-test", "test", server.url())
}

#[tokio::test]
async fn test_create_session_success() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("POST", "/v1/applications/app-test/sessions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "session_id": "s-1" }).to_string())
        .create();

    let attributes = HashMap::from([("user.id".to_string(), "u1".to_string())]);
    let session_id = backend.create_session(&attributes).await.unwrap();

    mock.assert();
    assert_eq!(session_id, "s-1");
}

#[tokio::test]
async fn test_create_session_quirk_is_rescuable() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    // Defective deployment: success delivered with a 201 status, which the
    // strict client surfaces through the error channel
    let mock = server
        .mock("POST", "/v1/applications/app-test/sessions")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "session_id": "abc-123" }).to_string())
        .create();

    let attributes = HashMap::new();
    let err = backend.create_session(&attributes).await.unwrap_err();

    mock.assert();
    assert!(matches!(err, BackendError::Http { status: 201, .. }));
    assert_eq!(rescue_session_id(&err).as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn test_create_session_server_error() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("POST", "/v1/applications/app-test/sessions")
        .with_status(503)
        .with_body("maintenance")
        .create();

    let err = backend.create_session(&HashMap::new()).await.unwrap_err();

    mock.assert();
    match &err {
        BackendError::Http { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("expected Http error, got {:?}", other),
    }
    assert_eq!(rescue_session_id(&err), None);
}

#[tokio::test]
async fn test_append_event_success() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("POST", "/v1/sessions/s-1/actions")
        .with_status(200)
        .create();

    let event = SessionEvent::prompt("gpt-4o", &[json!({ "role": "user", "content": "hi" })]);
    backend.append_event("s-1", event).await.unwrap();

    mock.assert();
}

#[tokio::test]
async fn test_append_event_failure_is_reported() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("POST", "/v1/sessions/s-1/actions")
        .with_status(500)
        .with_body("append failed")
        .create();

    let event = SessionEvent::response("gpt-4o", "hello");
    let err = backend.append_event("s-1", event).await.unwrap_err();

    mock.assert();
    assert!(matches!(err, BackendError::Http { status: 500, .. }));
}

#[tokio::test]
async fn test_evaluate_policy_block_verdict() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("GET", "/v1/sessions/s-1/firewall")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "decision": "BLOCK",
                "context": {
                    "violated_policies": [{ "name": "pii-leak", "severity": "high" }]
                }
            })
            .to_string(),
        )
        .create();

    let verdict = backend.evaluate_policy("s-1").await.unwrap();

    mock.assert();
    assert!(verdict.is_block());
    assert_eq!(verdict.policy_names(), vec!["pii-leak"]);
}

#[tokio::test]
async fn test_evaluate_policy_allow_verdict() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("GET", "/v1/sessions/s-1/firewall")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "decision": "allow" }).to_string())
        .create();

    let verdict = backend.evaluate_policy("s-1").await.unwrap();

    mock.assert();
    assert!(!verdict.is_block());
}

#[tokio::test]
async fn test_evaluate_policy_malformed_body() {
    let mut server = Server::new_async().await;
    let backend = backend_for(&server);

    let mock = server
        .mock("GET", "/v1/sessions/s-1/firewall")
        .with_status(200)
        .with_body("not json")
        .create();

    let err = backend.evaluate_policy("s-1").await.unwrap_err();

    mock.assert();
    assert!(matches!(err, BackendError::Deserialize(_)));
}
