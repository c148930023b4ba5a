//! Event ingress endpoint tests.
//!
//! Drives the router with in-memory requests against the stub provider and
//! checks status codes, response bodies and what reached the provider.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hookrelay_api::{create_router, handlers::notifications::MAX_PAYLOAD_SIZE, AppState};
use hookrelay_dispatch::{PoolConfig, RelayError, WorkerPool};
use hookrelay_testing::{routes, Operation, TestEnv};
use serde_json::{json, Value};
use tower::ServiceExt;

fn build_app(env: &TestEnv) -> (Router, Arc<WorkerPool>) {
    let pool = Arc::new(
        WorkerPool::new(PoolConfig { max_workers: 2, queue_capacity: 8 }, env.event_handler())
            .expect("pool should start"),
    );
    let state = AppState::new(
        pool.clone(),
        env.client.clone(),
        routes(&[("dev", "app_dev"), ("prod", "app_prod")]),
        Arc::new(env.clock.clone()),
    );
    (create_router(state, Duration::from_secs(30)), pool)
}

fn valid_document() -> Value {
    json!({
        "id": "evt_1",
        "type": "user.created",
        "project": "dev",
        "created_at": "2024-05-01T10:00:00Z",
        "data": {"user": {"id": "usr_1"}}
    })
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response should be valid JSON")
}

#[tokio::test]
async fn valid_event_is_accepted_and_relayed() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let response =
        app.oneshot(post("/notifications", valid_document().to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["event_id"], "evt_1");
    assert_eq!(body["status"], "accepted");

    let messages = env.provider.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "app_dev");
    assert_eq!(messages[0].1.event_id, "evt_1");
    assert_eq!(messages[0].1.event_type, "user.created");
    assert_eq!(messages[0].1.payload["user"]["id"], "usr_1");
}

#[tokio::test]
async fn invalid_fields_are_listed_and_nothing_is_sent() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let document = json!({"id": "bad", "type": "nope", "project": "dev"});
    let response = app.oneshot(post("/notifications", document.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    let fields: Vec<&str> =
        body["errors"].as_array().unwrap().iter().map(|e| e["field"].as_str().unwrap()).collect();
    assert_eq!(fields, vec!["id", "type"]);
    assert_eq!(env.provider.call_count(Operation::CreateMessage), 0);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let body = vec![b' '; MAX_PAYLOAD_SIZE + 1];
    let response = app.oneshot(post("/notifications", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "payload_too_large");
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let mut document = valid_document();
    document["project"] = json!("staging");
    let response = app.oneshot(post("/notifications", document.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "unknown_project");
    assert_eq!(env.provider.call_count(Operation::CreateMessage), 0);
}

#[tokio::test]
async fn duplicate_delivery_is_still_accepted() {
    let env = TestEnv::new();
    env.provider.fail_next(Operation::CreateMessage, RelayError::conflict("already sent"));
    let (app, _pool) = build_app(&env);

    let response =
        app.oneshot(post("/notifications", valid_document().to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(env.events.suppressed_duplicates().len(), 1);
}

#[tokio::test]
async fn permanent_provider_error_is_surfaced() {
    let env = TestEnv::new();
    env.provider.fail_next(Operation::CreateMessage, RelayError::forbidden("no access"));
    let (app, _pool) = build_app(&env);

    let response =
        app.oneshot(post("/notifications", valid_document().to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "forbidden");
    assert_eq!(env.provider.call_count(Operation::CreateMessage), 1);
}

#[tokio::test]
async fn pubsub_push_envelope_is_decoded() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let mut document = valid_document();
    document["project"] = json!("prod");
    let envelope = json!({
        "message": {
            "data": STANDARD.encode(document.to_string()),
            "messageId": "1234",
            "attributes": {"origin": "billing"}
        },
        "subscription": "projects/acme/subscriptions/hookrelay"
    });

    let response = app.oneshot(post("/pubsub/push", envelope.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let messages = env.provider.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "app_prod");
}

fn push_envelope(document: &Value) -> String {
    json!({"message": {"data": STANDARD.encode(document.to_string())}}).to_string()
}

#[tokio::test]
async fn pubsub_push_accepts_document_near_size_limit() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let mut document = valid_document();
    document["data"]["padding"] = json!("");
    let padding = MAX_PAYLOAD_SIZE - document.to_string().len();
    document["data"]["padding"] = json!("x".repeat(padding));
    assert_eq!(document.to_string().len(), MAX_PAYLOAD_SIZE);

    let envelope = push_envelope(&document);
    assert!(envelope.len() > MAX_PAYLOAD_SIZE);
    let response = app.oneshot(post("/pubsub/push", envelope)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(env.provider.messages().len(), 1);
}

#[tokio::test]
async fn pubsub_push_rejects_oversized_decoded_document() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let mut document = valid_document();
    document["data"]["padding"] = json!("x".repeat(MAX_PAYLOAD_SIZE));

    let response = app.oneshot(post("/pubsub/push", push_envelope(&document))).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(env.provider.call_count(Operation::CreateMessage), 0);
}

#[tokio::test]
async fn pubsub_push_with_bad_base64_is_rejected() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let envelope = json!({"message": {"data": "%%% not base64 %%%"}});
    let response = app.oneshot(post("/pubsub/push", envelope.to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn submissions_after_close_fail() {
    let env = TestEnv::new();
    let (app, pool) = build_app(&env);
    pool.close().await;

    let response =
        app.oneshot(post("/notifications", valid_document().to_string())).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "pool_closed");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let env = TestEnv::new();
    let (app, _pool) = build_app(&env);

    let response = app
        .clone()
        .oneshot(post("/notifications", valid_document().to_string()))
        .await
        .unwrap();
    let generated = response.headers().get("x-request-id").expect("request id header");
    assert!(!generated.is_empty());

    let request = Request::builder()
        .method("GET")
        .uri("/live")
        .header("x-request-id", "req-42")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");
}
