//! Dispatch task routing tests.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use hookrelay_dispatch::{ErrorKind, RelayError, Task, TaskContext};
use hookrelay_testing::{routes, sample_event, EventBuilder, Operation, TestEnv};

#[tokio::test]
async fn routes_event_to_project_application() {
    let env = TestEnv::new();
    let task = env.dispatch_task(sample_event(), routes(&[("dev", "app_42"), ("prod", "app_7")]));

    task.execute(&TaskContext::detached()).await.expect("dispatched");

    let messages = env.provider.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "app_42");
}

#[tokio::test]
async fn task_id_is_event_id() {
    let env = TestEnv::new();
    let task = env.dispatch_task(sample_event(), routes(&[]));
    assert_eq!(task.id(), "evt_1");
}

#[tokio::test]
async fn empty_project_is_validation_error_without_provider_call() {
    let env = TestEnv::new();

    for project in ["", "   "] {
        let event = EventBuilder::new().project(project).build();
        let task = env.dispatch_task(event, routes(&[("dev", "app_42")]));

        let error = task.execute(&TaskContext::detached()).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(error.code(), "missing_project");
    }

    assert!(env.provider.calls().is_empty());
}

#[tokio::test]
async fn unknown_project_is_not_found_without_provider_call() {
    let env = TestEnv::new();
    let event = EventBuilder::new().project("staging").build();
    let task = env.dispatch_task(event, routes(&[("dev", "app_42")]));

    let error = task.execute(&TaskContext::detached()).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.code(), "unknown_project");
    assert!(env.provider.calls().is_empty());
}

#[tokio::test]
async fn project_with_surrounding_whitespace_is_routed() {
    let env = TestEnv::new();
    let event = EventBuilder::new().project(" dev ").build();
    let task = env.dispatch_task(event, routes(&[("dev", "app_42")]));

    task.execute(&TaskContext::detached()).await.expect("dispatched");
    assert_eq!(env.provider.call_count(Operation::CreateMessage), 1);
}

#[tokio::test]
async fn delivery_error_is_returned_unchanged() {
    let env = TestEnv::new();
    env.provider.fail_next(Operation::CreateMessage, RelayError::payload_too_large("too big"));
    let task = env.dispatch_task(sample_event(), routes(&[("dev", "app_42")]));

    let error = task.execute(&TaskContext::detached()).await.unwrap_err();

    assert_eq!(error, RelayError::payload_too_large("too big"));
}
