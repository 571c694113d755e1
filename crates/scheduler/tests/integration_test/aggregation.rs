use std::sync::Arc;

use lookout_core::{ExecutionStatus, LookoutError, Timeline};
use lookout_scheduler::ResultAggregator;
use lookout_storage::StorageEngine;

use crate::helpers::{at, execution, output_ref, put, result_lines};

const SCHEDULE: &str = "pump-sched";

/// Storage holding two executions (09:10 and 09:15) with disjoint timestamps.
async fn two_executions() -> Arc<StorageEngine> {
    let storage = Arc::new(StorageEngine::in_memory());
    put(
        &storage,
        &output_ref(at(9, 10, 0)),
        result_lines(&[at(9, 5, 0), at(9, 6, 1), at(9, 7, 0)]),
    )
    .await;
    put(
        &storage,
        &output_ref(at(9, 15, 0)),
        result_lines(&[at(9, 10, 0), at(9, 11, 1)]),
    )
    .await;
    storage
}

#[tokio::test]
async fn test_disjoint_executions_merge_into_sorted_timeline() {
    let storage = two_executions().await;
    let mut aggregator = ResultAggregator::new(storage, 4);

    let executions = vec![
        execution(SCHEDULE, at(9, 15, 0), ExecutionStatus::Success),
        execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success),
    ];
    let report = aggregator.aggregate(&executions).await;

    assert!(report.is_clean(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.merged, vec![at(9, 10, 0), at(9, 15, 0)]);
    assert_eq!(report.records_added, 5);

    let timeline = aggregator.timeline();
    assert_eq!(timeline.len(), 5);
    let stamps: Vec<_> = timeline.iter().map(|r| r.timestamp).collect();
    let mut sorted = stamps.clone();
    sorted.sort();
    assert_eq!(stamps, sorted);
    assert_eq!(timeline.anomaly_count(), 2);
    assert_eq!(timeline.anomalies().next().unwrap().contributions[0].sensor, "pump\\Sensor0");
}

#[tokio::test]
async fn test_already_aggregated_executions_are_skipped() {
    let storage = two_executions().await;
    let mut aggregator = ResultAggregator::new(storage, 2);
    let executions = vec![execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success)];

    aggregator.aggregate(&executions).await;
    let again = aggregator.aggregate(&executions).await;

    assert!(again.is_clean());
    assert!(again.merged.is_empty());
    assert_eq!(again.already_aggregated, 1);
    assert_eq!(aggregator.timeline().len(), 3);
    assert!(aggregator.is_aggregated(&at(9, 10, 0)));
}

#[tokio::test]
async fn test_collision_leaves_timeline_unchanged() {
    let storage = two_executions().await;
    // A second schedule run reporting 09:11:01 again.
    let clash = output_ref(at(9, 20, 0));
    put(&storage, &clash, result_lines(&[at(9, 11, 1), at(9, 16, 0)])).await;

    let mut aggregator = ResultAggregator::new(storage, 4);
    aggregator
        .aggregate(&[
            execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success),
            execution(SCHEDULE, at(9, 15, 0), ExecutionStatus::Success),
        ])
        .await;
    let before: Vec<_> = aggregator.timeline().iter().cloned().collect();

    let report = aggregator
        .aggregate(&[execution(SCHEDULE, at(9, 20, 0), ExecutionStatus::Success)])
        .await;

    assert_eq!(report.errors.len(), 1);
    match &report.errors[0] {
        LookoutError::InconsistentTimeline { schedule, fire_time, key, timestamp, .. } => {
            assert_eq!(schedule, SCHEDULE);
            assert_eq!(*fire_time, at(9, 20, 0));
            assert_eq!(key, &clash.key);
            assert_eq!(*timestamp, at(9, 11, 1));
        }
        other => panic!("expected InconsistentTimeline, got {other}"),
    }
    // 09:16:00 from the same object must not have slipped in.
    let after: Vec<_> = aggregator.timeline().iter().cloned().collect();
    assert_eq!(before, after);
    assert!(!aggregator.is_aggregated(&at(9, 20, 0)));
}

#[tokio::test]
async fn test_malformed_object_is_all_or_nothing() {
    let storage = two_executions().await;
    let bad = output_ref(at(9, 20, 0));
    let mut body = result_lines(&[at(9, 15, 0), at(9, 16, 0)]);
    body.push_str("\n{\"timestamp\":\"2021-01-27T09:17:00\",\"prediction\":1}");
    put(&storage, &bad, body).await;

    let mut aggregator = ResultAggregator::new(storage, 4);
    let report = aggregator
        .aggregate(&[
            execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success),
            execution(SCHEDULE, at(9, 20, 0), ExecutionStatus::Success),
        ])
        .await;

    assert_eq!(report.merged, vec![at(9, 10, 0)]);
    assert_eq!(report.errors.len(), 1);
    let err = &report.errors[0];
    assert!(matches!(err, LookoutError::MalformedResult { .. }));
    assert!(err.to_string().contains(&bad.key), "{err}");
    assert!(err.to_string().contains("line 3"), "{err}");
    assert_eq!(aggregator.timeline().len(), 3);
}

#[tokio::test]
async fn test_failed_and_in_progress_are_reported_not_fatal() {
    let storage = two_executions().await;
    let mut failed = execution(SCHEDULE, at(9, 20, 0), ExecutionStatus::Failed);
    failed.failed_reason = Some("no data found in window".into());

    let mut aggregator = ResultAggregator::new(storage, 4);
    let report = aggregator
        .aggregate(&[
            execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success),
            failed,
            execution(SCHEDULE, at(9, 25, 0), ExecutionStatus::InProgress),
        ])
        .await;

    assert!(report.is_clean());
    assert_eq!(report.merged.len(), 1);
    assert_eq!(report.in_progress, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].fire_time, at(9, 20, 0));
    assert_eq!(report.failed[0].reason.as_deref(), Some("no data found in window"));
}

#[tokio::test]
async fn test_missing_object_is_retryable() {
    let storage = Arc::new(StorageEngine::in_memory());
    let mut aggregator = ResultAggregator::new(storage.clone(), 1);
    let executions = vec![execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success)];

    let report = aggregator.aggregate(&executions).await;
    assert!(matches!(report.errors[0], LookoutError::TransportFailure { operation: "GetObject", .. }));
    assert!(!report.has_integrity_failures());

    put(&storage, &output_ref(at(9, 10, 0)), result_lines(&[at(9, 5, 0)])).await;
    let report = aggregator.aggregate(&executions).await;
    assert_eq!(report.merged, vec![at(9, 10, 0)]);
}

#[tokio::test]
async fn test_existing_timeline_is_extended() {
    let storage = two_executions().await;
    let mut first = ResultAggregator::new(storage.clone(), 1);
    first
        .aggregate(&[execution(SCHEDULE, at(9, 10, 0), ExecutionStatus::Success)])
        .await;
    let timeline: Timeline = first.into_timeline();

    let mut second = ResultAggregator::with_timeline(storage, timeline, 1);
    let report = second
        .aggregate(&[execution(SCHEDULE, at(9, 15, 0), ExecutionStatus::Success)])
        .await;
    assert!(report.is_clean());
    assert_eq!(second.timeline().len(), 5);
}
