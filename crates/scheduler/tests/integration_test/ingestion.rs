use std::time::Duration;

use lookout_core::config::PollingConfig;
use lookout_core::{JobStatus, LookoutError, ObjectRef};
use lookout_remote::{IngestionRequest, RemoteError};
use lookout_scheduler::{cancel_pair, CancelToken, IngestionController, JobProgress};

use crate::helpers::FakeRemote;

fn request() -> IngestionRequest {
    IngestionRequest::new(
        "pump-dataset",
        "arn:aws:iam::123456789012:role/lookout",
        ObjectRef::new("sensor-history", "training-data/"),
    )
}

fn polling(max_wait_secs: u64) -> PollingConfig {
    PollingConfig {
        poll_interval_secs: 60,
        max_wait_secs,
        ..PollingConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_job_polled_to_success_with_elapsed_transitions() {
    let remote = FakeRemote::new();
    remote.script_job(&[JobStatus::InProgress, JobStatus::InProgress, JobStatus::Success]);
    let controller = IngestionController::new(remote.clone(), &polling(0));

    let mut seen: Vec<JobProgress> = Vec::new();
    let job = controller
        .run(&request(), &CancelToken::never(), |p| seen.push(p.clone()))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.job_id, "job-1");
    assert_eq!(job.dataset_name, "pump-dataset");
    assert_eq!(job.source, ObjectRef::new("sensor-history", "training-data/"));

    let transitions: Vec<_> = seen.iter().map(|p| (p.status, p.elapsed)).collect();
    assert_eq!(
        transitions,
        vec![
            (JobStatus::InProgress, Duration::ZERO),
            (JobStatus::Success, Duration::from_secs(180)),
        ]
    );
    assert_eq!(remote.count("describe_ingestion"), 3);
    assert_eq!(remote.count("start_ingestion"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_reported_not_resubmitted() {
    let remote = FakeRemote::new();
    remote.script_job(&[JobStatus::InProgress, JobStatus::Failed]);
    *remote.job_failed_reason.lock().unwrap() = Some("no files found under training-data/".into());

    let job = IngestionController::new(remote.clone(), &polling(0))
        .run(&request(), &CancelToken::never(), |_| {})
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_reason.as_deref(), Some("no files found under training-data/"));
    assert_eq!(remote.count("start_ingestion"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_describe_errors_are_retried() {
    let remote = FakeRemote::new();
    remote.script_job(&[JobStatus::Success]);
    remote
        .describe_errors
        .lock()
        .unwrap()
        .push_back(RemoteError::Transport("connection reset".into()));

    let job = IngestionController::new(remote.clone(), &polling(0))
        .run(&request(), &CancelToken::never(), |_| {})
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(remote.count("describe_ingestion"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_job_wait_is_bounded() {
    let remote = FakeRemote::new();
    remote.script_job(&[JobStatus::InProgress]);

    let err = IngestionController::new(remote.clone(), &polling(0))
        .with_max_wait(Some(Duration::from_secs(300)))
        .run(&request(), &CancelToken::never(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, LookoutError::WaitTimeout { waited_secs: 300, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_job_wait_is_cancellable() {
    let remote = FakeRemote::new();
    remote.script_job(&[JobStatus::InProgress]);
    let (handle, token) = cancel_pair();

    let task = tokio::spawn({
        let remote = remote.clone();
        async move {
            IngestionController::new(remote, &polling(3_600))
                .run(&request(), &token, |_| {})
                .await
        }
    });
    tokio::time::sleep(Duration::from_secs(130)).await;
    handle.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, LookoutError::Cancelled { .. }));
    assert_eq!(remote.count("describe_ingestion"), 2);
}
