use std::sync::Arc;
use std::time::Duration;

use lookout_core::config::PollingConfig;
use lookout_core::{ExecutionStatus, LookoutError};
use lookout_remote::RemoteError;
use lookout_scheduler::{cancel_pair, CancelToken, ExecutionFilter, ExecutionHistory, ExecutionPoller};

use crate::helpers::{at, execution, schedule_config, FakeRemote};

fn poller(remote: &Arc<FakeRemote>, page_size: u32) -> ExecutionPoller {
    let polling = PollingConfig {
        poll_interval_secs: 60,
        max_wait_secs: 0,
        page_size,
        aggregation_concurrency: 1,
    };
    ExecutionPoller::new(remote.clone(), &schedule_config("pump-sched", "pump-model"), &polling)
}

#[tokio::test]
async fn test_list_drains_pages_in_fire_time_order() {
    let remote = FakeRemote::new();
    for minute in [20, 5, 15, 10, 25] {
        remote.push_execution(execution("pump-sched", at(9, minute, 0), ExecutionStatus::Success));
    }
    remote.push_execution(execution("other-sched", at(9, 30, 0), ExecutionStatus::Success));

    let listed = poller(&remote, 2).list(&ExecutionFilter::all()).await.unwrap();
    let fire_times: Vec<_> = listed.iter().map(|s| s.fire_time).collect();
    assert_eq!(
        fire_times,
        vec![at(9, 5, 0), at(9, 10, 0), at(9, 15, 0), at(9, 20, 0), at(9, 25, 0)]
    );
    assert_eq!(remote.count("list"), 3);
}

#[tokio::test]
async fn test_list_stops_on_repeated_page_token() {
    let remote = FakeRemote::new();
    for minute in [5, 10, 15] {
        remote.push_execution(execution("pump-sched", at(9, minute, 0), ExecutionStatus::Success));
    }
    *remote.stuck_token.lock().unwrap() = Some("page-2".into());

    let err = poller(&remote, 2).list(&ExecutionFilter::all()).await.unwrap_err();
    assert!(matches!(err, LookoutError::TransportFailure { operation: "ListExecutions", .. }));
    assert!(err.to_string().contains("page-2"));
    assert_eq!(remote.count("list"), 2);
}

#[tokio::test]
async fn test_list_is_idempotent() {
    let remote = FakeRemote::new();
    remote.push_execution(execution("pump-sched", at(9, 10, 0), ExecutionStatus::Success));
    remote.push_execution(execution("pump-sched", at(9, 15, 0), ExecutionStatus::Failed));
    remote.push_execution(execution("pump-sched", at(9, 20, 0), ExecutionStatus::InProgress));

    let poller = poller(&remote, 50);
    let filter = ExecutionFilter::since(at(9, 0, 0));
    let first = poller.list(&filter).await.unwrap();
    let second = poller.list(&filter).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_list_applies_status_filter() {
    let remote = FakeRemote::new();
    remote.push_execution(execution("pump-sched", at(9, 10, 0), ExecutionStatus::Success));
    remote.push_execution(execution("pump-sched", at(9, 15, 0), ExecutionStatus::Failed));

    let listed = poller(&remote, 50)
        .list(&ExecutionFilter::all().with_status(ExecutionStatus::Failed))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].fire_time, at(9, 15, 0));
}

#[tokio::test]
async fn test_list_surfaces_transport_failure() {
    let remote = FakeRemote::new();
    remote.fail_next_list(RemoteError::Transport("dns".into()));
    let err = poller(&remote, 50).list(&ExecutionFilter::all()).await.unwrap_err();
    assert!(matches!(err, LookoutError::TransportFailure { operation: "ListExecutions", .. }));
}

#[tokio::test]
async fn test_refresh_returns_only_new_or_changed() {
    let remote = FakeRemote::new();
    remote.push_execution(execution("pump-sched", at(9, 10, 0), ExecutionStatus::InProgress));
    let poller = poller(&remote, 50);
    let mut history = ExecutionHistory::new();

    let fresh = poller.refresh(&mut history, &ExecutionFilter::all()).await.unwrap();
    assert_eq!(fresh.len(), 1);
    assert!(poller.refresh(&mut history, &ExecutionFilter::all()).await.unwrap().is_empty());

    // Status upgrade plus one new execution.
    {
        let mut executions = remote.executions.lock().unwrap();
        executions.clear();
        executions.push(execution("pump-sched", at(9, 10, 0), ExecutionStatus::Success));
        executions.push(execution("pump-sched", at(9, 15, 0), ExecutionStatus::InProgress));
    }
    let fresh = poller.refresh(&mut history, &ExecutionFilter::all()).await.unwrap();
    assert_eq!(fresh.len(), 2);
    assert_eq!(fresh[0].status, ExecutionStatus::Success);
    assert_eq!(history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_await_first_result_returns_once_available() {
    let remote = FakeRemote::new();
    let poller = Arc::new(poller(&remote, 50));

    let waiter = tokio::spawn({
        let poller = poller.clone();
        async move {
            poller
                .await_first_result(&ExecutionFilter::all(), Some(Duration::from_secs(3_600)), &CancelToken::never())
                .await
        }
    });

    // Two empty polls, then an execution shows up.
    tokio::time::sleep(Duration::from_secs(90)).await;
    remote.push_execution(execution("pump-sched", at(9, 10, 0), ExecutionStatus::Success));

    let found = waiter.await.unwrap().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(remote.count("list"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_await_first_result_times_out() {
    let remote = FakeRemote::new();
    let start = tokio::time::Instant::now();

    let err = poller(&remote, 50)
        .await_first_result(&ExecutionFilter::all(), Some(Duration::from_secs(150)), &CancelToken::never())
        .await
        .unwrap_err();

    match err {
        LookoutError::WaitTimeout { waited_secs, .. } => assert_eq!(waited_secs, 150),
        other => panic!("expected WaitTimeout, got {other}"),
    }
    assert_eq!(start.elapsed(), Duration::from_secs(150));
    // Polls at 0s, 60s, 120s.
    assert_eq!(remote.count("list"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_await_first_result_is_cancellable() {
    let remote = FakeRemote::new();
    let poller = Arc::new(poller(&remote, 50));
    let (handle, token) = cancel_pair();

    let waiter = tokio::spawn({
        let poller = poller.clone();
        async move { poller.await_first_result(&ExecutionFilter::all(), None, &token).await }
    });

    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, LookoutError::Cancelled { .. }));
    assert_eq!(remote.count("list"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_await_first_result_retries_transient_only() {
    let remote = FakeRemote::new();
    remote.fail_next_list(RemoteError::Throttled("rate exceeded".into()));
    remote.push_execution(execution("pump-sched", at(9, 10, 0), ExecutionStatus::Success));

    let found = poller(&remote, 50)
        .await_first_result(&ExecutionFilter::all(), Some(Duration::from_secs(600)), &CancelToken::never())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(remote.count("list"), 2);

    remote.fail_next_list(RemoteError::AccessDenied("no lookoutequipment:ListInferenceExecutions".into()));
    let err = poller(&remote, 50)
        .await_first_result(&ExecutionFilter::all(), Some(Duration::from_secs(600)), &CancelToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, LookoutError::TransportFailure { .. }));
}
