//! Result Aggregator: turn successful executions into Timeline records.
//!
//! Fetch and parse run concurrently per execution; merging into the
//! Timeline is serial, in fire-time order. Each execution contributes all
//! of its records or none of them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use lookout_core::anomaly::parse_results;
use lookout_core::{AnomalyRecord, ExecutionStatus, ExecutionSummary, LookoutError, ObjectRef, Timeline};
use lookout_storage::ObjectSource;

/// A FAILED execution, reported for visibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedExecution {
    pub schedule_name: String,
    pub fire_time: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Outcome of one aggregation pass.
#[derive(Debug, Default)]
pub struct AggregationReport {
    /// Fire times whose records were merged, ascending.
    pub merged: Vec<DateTime<Utc>>,
    pub records_added: usize,
    pub failed: Vec<FailedExecution>,
    pub in_progress: usize,
    /// SUCCESS executions skipped because an earlier pass merged them.
    pub already_aggregated: usize,
    /// Per-execution failures; those executions stay unaggregated.
    pub errors: Vec<LookoutError>,
}

impl AggregationReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_integrity_failures(&self) -> bool {
        self.errors.iter().any(LookoutError::is_integrity_failure)
    }
}

pub struct ResultAggregator {
    storage: Arc<dyn ObjectSource>,
    timeline: Timeline,
    aggregated: BTreeSet<DateTime<Utc>>,
    concurrency: usize,
}

impl ResultAggregator {
    pub fn new(storage: Arc<dyn ObjectSource>, concurrency: usize) -> Self {
        Self::with_timeline(storage, Timeline::new(), concurrency)
    }

    /// Continue from an existing timeline.
    ///
    /// Fire times are tracked per aggregator, so executions merged into
    /// `timeline` elsewhere are detected as collisions, not skipped.
    pub fn with_timeline(storage: Arc<dyn ObjectSource>, timeline: Timeline, concurrency: usize) -> Self {
        Self {
            storage,
            timeline,
            aggregated: BTreeSet::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn into_timeline(self) -> Timeline {
        self.timeline
    }

    pub fn is_aggregated(&self, fire_time: &DateTime<Utc>) -> bool {
        self.aggregated.contains(fire_time)
    }

    /// Aggregate every SUCCESS execution not merged yet.
    ///
    /// FAILED and IN_PROGRESS executions are counted, not errors. Failures of
    /// one execution (fetch, parse, collision) are recorded in the report and
    /// leave the Timeline untouched by that execution.
    pub async fn aggregate(&mut self, executions: &[ExecutionSummary]) -> AggregationReport {
        let mut report = AggregationReport::default();
        let mut pending: BTreeMap<DateTime<Utc>, &ExecutionSummary> = BTreeMap::new();

        for execution in executions {
            match execution.status {
                ExecutionStatus::InProgress => report.in_progress += 1,
                ExecutionStatus::Failed => report.failed.push(FailedExecution {
                    schedule_name: execution.schedule_name.clone(),
                    fire_time: execution.fire_time,
                    reason: execution.failed_reason.clone(),
                }),
                ExecutionStatus::Success if self.aggregated.contains(&execution.fire_time) => {
                    report.already_aggregated += 1;
                }
                ExecutionStatus::Success => {
                    pending.insert(execution.fire_time, execution);
                }
            }
        }

        if !report.failed.is_empty() {
            warn!(count = report.failed.len(), "Skipping failed executions");
        }

        let storage = &self.storage;
        let mut parsed: Vec<_> = stream::iter(pending.into_values())
            .map(|execution| async move {
                let records = fetch_and_parse(storage.as_ref(), execution).await;
                (execution, records)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        parsed.sort_by_key(|(execution, _)| execution.fire_time);

        for (execution, outcome) in parsed {
            let (object, records) = match outcome {
                Ok(ok) => ok,
                Err(err) => {
                    warn!(schedule = %execution.schedule_name, fire_time = %execution.fire_time, error = %err, "Execution not aggregated");
                    report.errors.push(err);
                    continue;
                }
            };

            let count = records.len();
            match self.timeline.merge(records) {
                Ok(added) => {
                    self.aggregated.insert(execution.fire_time);
                    report.merged.push(execution.fire_time);
                    report.records_added += added;
                    debug!(
                        schedule = %execution.schedule_name,
                        fire_time = %execution.fire_time,
                        records = count,
                        "Merged execution"
                    );
                }
                Err(timestamp) => {
                    let err = LookoutError::InconsistentTimeline {
                        schedule: execution.schedule_name.clone(),
                        fire_time: execution.fire_time,
                        bucket: object.bucket,
                        key: object.key,
                        timestamp,
                    };
                    warn!(error = %err, "Timestamp collision, execution not merged");
                    report.errors.push(err);
                }
            }
        }

        info!(
            merged = report.merged.len(),
            records_added = report.records_added,
            failed = report.failed.len(),
            in_progress = report.in_progress,
            errors = report.errors.len(),
            timeline_len = self.timeline.len(),
            "Aggregation pass complete"
        );
        report
    }
}

async fn fetch_and_parse(
    storage: &dyn ObjectSource,
    execution: &ExecutionSummary,
) -> Result<(ObjectRef, Vec<AnomalyRecord>), LookoutError> {
    let malformed = |bucket: &str, key: &str, reason: String| LookoutError::MalformedResult {
        schedule: execution.schedule_name.clone(),
        fire_time: execution.fire_time,
        bucket: bucket.to_string(),
        key: key.to_string(),
        reason,
    };

    let Some(object) = execution.output.clone() else {
        return Err(malformed("", "", "successful execution has no output object".into()));
    };

    let bytes = storage
        .get_object(&object)
        .await
        .map_err(|e| LookoutError::TransportFailure {
            operation: "GetObject",
            target: format!("{object} (schedule {}, fire time {})", execution.schedule_name, execution.fire_time),
            message: e.to_string(),
        })?;

    let records = parse_results(&bytes).map_err(|reason| malformed(&object.bucket, &object.key, reason))?;
    debug!(object = %object, records = records.len(), "Parsed result object");
    Ok((object, records))
}
