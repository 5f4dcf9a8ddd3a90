//! End-to-end protocol behavior over real worker threads.

use futures_util::future::{join_all, try_join_all};
use std::time::Duration;
use threadlet::builtin::builtin_registry;
use serde_json::json;
use threadlet::host::SHUTDOWN_TIMEOUT;
use threadlet::protocol::{ControlMessage, LifecycleMessage};
use threadlet::transport::WorkerPort;
use threadlet::worker::{run_worker, Requests};
use threadlet::{
    with_worker, with_worker_until, Outcome, ThreadletError, WorkerHandle, WorkerOptions, WorkerRegistry, WorkerResource,
};
use tokio_util::sync::CancellationToken;

/// Answers `n` with `n * 10` after a delay that shrinks as `n` grows; 13 fails.
async fn scaled(port: WorkerPort) {
    run_worker(port, |(): (), requests: Requests<u64, u64>| async move {
        requests
            .for_each(|n| async move {
                tokio::time::sleep(Duration::from_millis(10 * (10 - n.min(10)))).await;
                if n == 13 {
                    return Err(format!("{n} is unlucky"));
                }
                Ok(n * 10)
            })
            .await;
        Ok::<_, String>(())
    })
    .await;
}

/// Returns twice its init data without serving any request.
async fn doubler(port: WorkerPort) {
    run_worker(port, |n: u64, _requests: Requests<(), ()>| async move { Ok::<_, String>(n * 2) }).await;
}

/// Never answers.
async fn stalled(port: WorkerPort) {
    run_worker(port, |(): (), requests: Requests<u64, u64>| async move {
        requests
            .for_each(|_| std::future::pending::<Result<u64, String>>())
            .await;
        Ok::<_, String>(())
    })
    .await;
}

/// Opens, then answers `close` only after a long pause.
async fn stubborn(mut port: WorkerPort) {
    port.post(LifecycleMessage::Open);
    while let Some(message) = port.recv().await {
        if matches!(message, ControlMessage::Close) {
            tokio::time::sleep(Duration::from_millis(300)).await;
            port.post(LifecycleMessage::Close {
                result: Outcome::Ok(json!("late")),
            });
            return;
        }
    }
}

fn registry() -> WorkerRegistry {
    let mut registry = builtin_registry();
    registry
        .register("scaled", |port| Box::pin(scaled(port)))
        .register("doubler", |port| Box::pin(doubler(port)))
        .register("stalled", |port| Box::pin(stalled(port)))
        .register("stubborn", |port| Box::pin(stubborn(port)))
        .register("silent", |_port| Box::pin(async {}))
        .register("hung", |_port| Box::pin(std::future::pending::<()>()))
        .register("crashing", |port: WorkerPort| {
            Box::pin(async move {
                port.post(LifecycleMessage::Open);
                tokio::time::sleep(Duration::from_millis(20)).await;
                panic!("worker crashed");
            })
        });
    registry
}

fn options(script: &str) -> WorkerOptions {
    WorkerOptions::new(script).with_shutdown_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn ping_round_trips_to_pong() {
    let reply: String = with_worker(&registry(), options("echo"), |worker| async move { worker.send(&"ping").await })
        .await
        .unwrap();
    assert_eq!(reply, "pong");
}

#[tokio::test]
async fn concurrent_sends_get_their_own_responses() {
    let replies = with_worker(&registry(), options("scaled"), |worker| async move {
        let sends = (1..=6u64).map(|n| {
            let worker = worker.clone();
            async move { worker.send::<_, u64>(&n).await }
        });
        try_join_all(sends).await
    })
    .await
    .unwrap();

    assert_eq!(replies, vec![10, 20, 30, 40, 50, 60]);
}

#[tokio::test]
async fn one_failing_request_does_not_fail_the_others() {
    let results = with_worker(&registry(), options("scaled"), |worker| async move {
        let sends = [4u64, 13, 5].map(|n| {
            let worker = worker.clone();
            async move { worker.send::<_, u64>(&n).await }
        });
        let results = join_all(sends).await;

        // The worker keeps serving after a failure.
        let after = worker.send::<_, u64>(&1).await?;
        Ok::<_, ThreadletError>((results, after))
    })
    .await
    .unwrap();

    let (results, after) = results;
    assert_eq!(results[0].as_ref().unwrap(), &40);
    assert!(matches!(&results[1], Err(ThreadletError::Request(e)) if e.message == "13 is unlucky"));
    assert_eq!(results[2].as_ref().unwrap(), &50);
    assert_eq!(after, 10);
}

#[tokio::test]
async fn natural_completion_reports_the_body_result() {
    let options = options("doubler").with_data(&21).unwrap();
    let doubled: u64 = with_worker(&registry(), options, |worker| async move { worker.outcome().await })
        .await
        .unwrap();
    assert_eq!(doubled, 42);
}

#[tokio::test]
async fn teardown_terminates_a_running_body() {
    let mut resource = WorkerResource::acquire(&registry(), options("echo")).await.unwrap();
    let handle = resource.handle();
    assert_eq!(handle.send::<_, String>(&"hello").await.unwrap(), "hello");

    let outcome = resource.teardown().await;
    assert!(outcome.error().is_some_and(|e| e.is_terminated()));

    // Idempotent, and the handle refuses further sends.
    assert_eq!(resource.teardown().await, outcome);
    assert!(matches!(handle.send::<_, String>(&"late").await, Err(ThreadletError::Closed)));
}

#[tokio::test]
async fn send_after_close_fails_without_posting() {
    let mut leaked: Option<WorkerHandle> = None;
    with_worker(&registry(), options("echo"), |worker| {
        leaked = Some(worker.clone());
        async move { Ok::<_, ThreadletError>(()) }
    })
    .await
    .unwrap();

    let handle = leaked.unwrap();
    assert!(handle.is_closed());
    assert!(matches!(handle.send::<_, String>(&"ping").await, Err(ThreadletError::Closed)));
    assert!(handle.try_outcome().is_some());
}

#[tokio::test]
async fn cancelling_the_scope_still_awaits_the_terminal_outcome() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let mut leaked: Option<WorkerHandle> = None;
    let result = with_worker_until(&registry(), options("stalled"), token, |worker| {
        leaked = Some(worker.clone());
        async move { worker.send::<_, u64>(&1).await }
    })
    .await;

    assert!(matches!(result, Err(ThreadletError::Cancelled)));

    let handle = leaked.unwrap();
    assert!(handle.is_closed());
    let outcome = handle.try_outcome().expect("outcome settled before the scope returned");
    assert!(outcome.error().is_some_and(|e| e.is_terminated()));
}

#[tokio::test]
async fn dropping_the_scope_future_closes_the_worker() {
    let registry = registry();
    let mut leaked: Option<WorkerHandle> = None;
    let scope = with_worker(&registry, options("stalled"), |worker| {
        leaked = Some(worker.clone());
        async move { worker.send::<_, u64>(&1).await }
    });

    assert!(tokio::time::timeout(Duration::from_millis(100), scope).await.is_err());

    let handle = leaked.unwrap();
    assert!(handle.is_closed());
    let outcome = handle.settled().await;
    assert!(outcome.error().is_some_and(|e| e.is_terminated()));
}

#[tokio::test]
async fn a_shutdown_timeout_stays_the_terminal_outcome() {
    let options = WorkerOptions::new("stubborn").with_shutdown_timeout(Duration::from_millis(50));
    let mut resource = WorkerResource::acquire(&registry(), options).await.unwrap();
    let handle = resource.handle();

    let outcome = resource.teardown().await;
    assert_eq!(outcome.error().map(|e| e.name.as_str()), Some(SHUTDOWN_TIMEOUT));

    assert_eq!(resource.teardown().await, outcome);
    assert_eq!(handle.settled().await, outcome);
    assert!(matches!(
        handle.outcome::<String>().await,
        Err(ThreadletError::Task(e)) if e.name == SHUTDOWN_TIMEOUT
    ));

    // The worker's own close arrives after the deadline and is not recorded.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.try_outcome(), Some(outcome));
}

#[tokio::test]
async fn transport_errors_abort_the_scope() {
    let result = with_worker(&registry(), options("crashing"), |_worker| async move {
        std::future::pending::<threadlet::Result<()>>().await
    })
    .await;

    assert!(matches!(result, Err(ThreadletError::Transport(message)) if message == "worker crashed"));
}

#[tokio::test]
async fn a_worker_that_never_opens_fails_the_handshake() {
    let err = WorkerResource::acquire(&registry(), options("silent")).await.unwrap_err();
    assert!(matches!(err, ThreadletError::Handshake(_)));

    let hung = WorkerOptions::new("hung")
        .with_handshake_timeout(Duration::from_millis(50))
        .with_shutdown_timeout(Duration::from_millis(50));
    let err = WorkerResource::acquire(&registry(), hung).await.unwrap_err();
    assert!(matches!(err, ThreadletError::Timeout(_)));
}

#[tokio::test]
async fn unknown_scripts_are_rejected() {
    let err = WorkerResource::acquire(&registry(), options("missing")).await.unwrap_err();
    assert!(matches!(err, ThreadletError::UnknownScript(script) if script == "missing"));
}
