//! Worker pool concurrency and lifecycle tests.
//!
//! Gated tasks block until released, which makes the concurrency bound and
//! the drain behaviour observable without timing assumptions.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{sync::Arc, time::Duration};

use hookrelay_core::NoOpEventHandler;
use hookrelay_dispatch::{PoolConfig, PoolState, RelayError, ShutdownError, WorkerPool};
use hookrelay_testing::{Gate, GatedTask, RecordingEventHandler};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn pool_with(max_workers: usize, events: Arc<RecordingEventHandler>) -> Arc<WorkerPool> {
    let config = PoolConfig { max_workers, ..Default::default() };
    Arc::new(WorkerPool::new(config, events).expect("pool should start"))
}

#[tokio::test]
async fn concurrency_is_bounded_by_worker_count() {
    let pool = pool_with(2, Arc::new(RecordingEventHandler::new()));
    let gate = Gate::new();

    let mut submissions = Vec::new();
    for i in 0..3 {
        let pool = pool.clone();
        let task = GatedTask::new(format!("task-{i}"), gate.clone());
        submissions.push(tokio::spawn(async move { pool.submit(task).await }));
    }

    timeout(WAIT, gate.wait_for_started(2)).await.expect("two tasks should start");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gate.started(), 2, "third task must wait for a free worker");
    assert_eq!(pool.in_flight(), 2);

    gate.release(1);
    timeout(WAIT, gate.wait_for_started(3)).await.expect("third task should start");

    gate.release(2);
    for submission in submissions {
        let outcome = timeout(WAIT, submission).await.expect("submission completes").unwrap();
        assert_eq!(outcome, Ok(()));
    }

    assert_eq!(gate.max_concurrent(), 2);
    pool.close().await;
}

#[tokio::test]
async fn failed_task_does_not_stop_pool() {
    let events = Arc::new(RecordingEventHandler::new());
    let pool = pool_with(1, events.clone());
    let gate = Gate::new();
    gate.release(2);

    let failing =
        GatedTask::failing("bad", gate.clone(), RelayError::validation("invalid_request", "nope"));
    let error = pool.submit(failing).await.unwrap_err();
    assert_eq!(error.code(), "invalid_request");

    pool.submit(GatedTask::new("good", gate.clone())).await.expect("pool keeps working");

    assert_eq!(events.failed_tasks(), vec![("bad".to_string(), "invalid_request".to_string())]);
    assert_eq!(events.succeeded_tasks(), vec!["good".to_string()]);
    pool.close().await;
}

#[tokio::test]
async fn close_drains_queued_and_in_flight_tasks() {
    let pool = pool_with(1, Arc::new(RecordingEventHandler::new()));
    let gate = Gate::new();

    let first = {
        let pool = pool.clone();
        let task = GatedTask::new("first", gate.clone());
        tokio::spawn(async move { pool.submit(task).await })
    };
    timeout(WAIT, gate.wait_for_started(1)).await.expect("first task started");

    let queued = {
        let pool = pool.clone();
        let task = GatedTask::new("queued", gate.clone());
        tokio::spawn(async move { pool.submit(task).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let closer = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.close().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.state(), PoolState::Draining);

    let rejected = pool.submit(GatedTask::new("late", gate.clone())).await.unwrap_err();
    assert_eq!(rejected.code(), "pool_closed");

    gate.release(2);
    assert_eq!(timeout(WAIT, first).await.unwrap().unwrap(), Ok(()));
    assert_eq!(timeout(WAIT, queued).await.unwrap().unwrap(), Ok(()));
    timeout(WAIT, closer).await.expect("close completes").unwrap();

    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(gate.started(), 2);
}

#[tokio::test]
async fn close_with_timeout_cancels_stuck_tasks() {
    let pool = pool_with(1, Arc::new(RecordingEventHandler::new()));
    let gate = Gate::new();

    let stuck = {
        let pool = pool.clone();
        let task = GatedTask::new("stuck", gate.clone());
        tokio::spawn(async move { pool.submit(task).await })
    };
    timeout(WAIT, gate.wait_for_started(1)).await.expect("task started");

    let result = pool.close_with_timeout(Duration::from_millis(50)).await;

    assert_eq!(result, Err(ShutdownError::Timeout { timeout: Duration::from_millis(50) }));
    assert_eq!(pool.state(), PoolState::Stopped);

    let outcome = timeout(WAIT, stuck).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap_err().code(), "cancelled");
}

#[tokio::test]
async fn close_with_timeout_aborts_tasks_that_ignore_cancellation() {
    let pool = pool_with(1, Arc::new(RecordingEventHandler::new()));
    let gate = Gate::new();

    let stuck = {
        let pool = pool.clone();
        let task = GatedTask::ignoring_cancellation("stubborn", gate.clone());
        tokio::spawn(async move { pool.submit(task).await })
    };
    timeout(WAIT, gate.wait_for_started(1)).await.expect("task started");

    let result = timeout(WAIT, pool.close_with_timeout(Duration::from_millis(50)))
        .await
        .expect("close must not hang on a task that ignores cancellation");

    assert_eq!(result, Err(ShutdownError::Timeout { timeout: Duration::from_millis(50) }));
    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(pool.in_flight(), 0);

    let outcome = timeout(WAIT, stuck).await.unwrap().unwrap();
    assert_eq!(outcome.unwrap_err().code(), "worker_lost");
}

#[tokio::test]
async fn close_finishes_after_an_abandoned_close() {
    let pool = pool_with(1, Arc::new(RecordingEventHandler::new()));
    let gate = Gate::new();

    let busy = {
        let pool = pool.clone();
        let task = GatedTask::new("busy", gate.clone());
        tokio::spawn(async move { pool.submit(task).await })
    };
    timeout(WAIT, gate.wait_for_started(1)).await.expect("task started");

    let abandoned = timeout(Duration::from_millis(20), pool.close()).await;
    assert!(abandoned.is_err(), "close waits for the busy task");
    assert_eq!(pool.state(), PoolState::Draining);

    gate.release(1);
    timeout(WAIT, pool.close()).await.expect("second close completes");

    assert_eq!(pool.state(), PoolState::Stopped);
    assert_eq!(timeout(WAIT, busy).await.unwrap().unwrap(), Ok(()));
}

#[tokio::test]
async fn close_with_timeout_succeeds_when_idle() {
    let pool = pool_with(4, Arc::new(RecordingEventHandler::new()));

    pool.close_with_timeout(Duration::from_secs(1)).await.expect("idle pool drains at once");
    assert_eq!(pool.state(), PoolState::Stopped);
}

#[tokio::test]
async fn accessors_report_configuration() {
    let config = PoolConfig { max_workers: 7, queue_capacity: 3 };
    let pool = WorkerPool::new(config, Arc::new(NoOpEventHandler::new())).unwrap();

    assert_eq!(pool.max_workers(), 7);
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(pool.state(), PoolState::Running);

    pool.close().await;
}
