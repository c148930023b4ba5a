//! End-to-end service tests.
//!
//! Wires the service the way `main` does, with the in-memory provider in
//! place of the real one: provision applications, serve ingress, drain.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use hookrelay_api::{create_router, AppState};
use hookrelay_core::EventType;
use hookrelay_dispatch::{initialize_applications, PoolConfig, ProvisioningConfig, WorkerPool};
use hookrelay_testing::{Operation, TestEnv};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn notification(project: &str, id: &str) -> Request<Body> {
    let document = serde_json::json!({
        "id": id,
        "type": "payment.succeeded",
        "project": project,
        "data": {"payment": {"id": "pay_1", "amount": 1200}}
    });

    Request::builder()
        .method("POST")
        .uri("/notifications")
        .header("content-type", "application/json")
        .body(Body::from(document.to_string()))
        .unwrap()
}

#[tokio::test]
async fn provisioned_projects_receive_relayed_events() {
    let env = TestEnv::new();
    let projects = vec!["dev".to_string(), "prod".to_string()];

    let routes = initialize_applications(
        &env.client,
        &projects,
        &ProvisioningConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .expect("provisioning should succeed");

    assert_eq!(routes.projects(), vec!["dev", "prod"]);
    assert_eq!(env.provider.event_types().len(), EventType::ALL.len());

    let pool = Arc::new(
        WorkerPool::new(PoolConfig::default(), env.event_handler()).expect("pool should start"),
    );
    let state =
        AppState::new(pool.clone(), env.client.clone(), Arc::new(routes), Arc::new(env.clock.clone()));
    let app = create_router(state, Duration::from_secs(30));

    let response = app.clone().oneshot(notification("prod", "evt_100")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.clone().oneshot(notification("qa", "evt_101")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let prod_app = env
        .provider
        .applications()
        .into_iter()
        .find(|app| app.name == "hookrelay-prod")
        .expect("prod application should exist");
    let messages = env.provider.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, prod_app.id);
    assert_eq!(messages[0].1.event_type, "payment.succeeded");

    pool.close_with_timeout(Duration::from_secs(5)).await.expect("pool should drain");

    let response = app.oneshot(notification("prod", "evt_102")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(env.provider.call_count(Operation::CreateMessage), 1);
}
