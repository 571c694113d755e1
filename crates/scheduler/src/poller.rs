//! Execution Poller: list a schedule's executions, optionally waiting for
//! the first one to appear.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use lookout_core::config::PollingConfig;
use lookout_core::{ExecutionStatus, ExecutionSummary, LookoutError, Result, ScheduleConfig, UploadFrequency};
use lookout_remote::{ExecutionQuery, RemoteApi, RemoteError, TimeRange};

use crate::cancel::{pause, CancelToken, Pause};
use crate::remote_error::remote_failure;

/// Time range and status constraint for a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionFilter {
    pub range: TimeRange,
    pub status: Option<ExecutionStatus>,
}

impl ExecutionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            range: TimeRange::since(start),
            status: None,
        }
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

// ── Poller ────────────────────────────────────────────────────

pub struct ExecutionPoller {
    remote: Arc<dyn RemoteApi>,
    schedule_name: String,
    frequency: UploadFrequency,
    page_size: u32,
    poll_interval: Duration,
}

impl ExecutionPoller {
    pub fn new(remote: Arc<dyn RemoteApi>, config: &ScheduleConfig, polling: &PollingConfig) -> Self {
        Self {
            remote,
            schedule_name: config.schedule_name.clone(),
            frequency: config.upload_frequency,
            page_size: polling.page_size.max(1),
            poll_interval: polling.poll_interval(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn schedule_name(&self) -> &str {
        &self.schedule_name
    }

    /// All executions matching `filter`, ascending by fire time.
    ///
    /// Drains every page. If pages overlap, the later copy of a fire time
    /// wins, so the result has one summary per fire time. A page token seen
    /// twice ends the listing with an error.
    pub async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<ExecutionSummary>> {
        self.list_raw(filter)
            .await
            .map_err(|e| remote_failure("ListExecutions", &self.schedule_name, e))
    }

    async fn list_raw(&self, filter: &ExecutionFilter) -> std::result::Result<Vec<ExecutionSummary>, RemoteError> {
        let mut query = ExecutionQuery {
            schedule_name: self.schedule_name.clone(),
            range: filter.range,
            status: filter.status,
            page_size: self.page_size,
            next_token: None,
            frequency: self.frequency,
        };

        let mut by_fire_time = BTreeMap::new();
        let mut seen_tokens = HashSet::new();
        let mut pages = 0usize;
        loop {
            let page = self.remote.list_executions(&query).await?;
            pages += 1;
            for summary in page.summaries {
                by_fire_time.insert(summary.fire_time, summary);
            }
            match page.next_token {
                Some(token) if !token.is_empty() => {
                    // A repeated token would page forever.
                    if !seen_tokens.insert(token.clone()) {
                        return Err(RemoteError::Service(format!(
                            "ListInferenceExecutions returned page token {token:?} twice"
                        )));
                    }
                    query.next_token = Some(token);
                }
                _ => break,
            }
        }

        debug!(
            schedule = %self.schedule_name,
            pages,
            count = by_fire_time.len(),
            "Listed executions"
        );
        Ok(by_fire_time.into_values().collect())
    }

    /// Poll `list` until it returns at least one execution.
    ///
    /// Gives up with `WaitTimeout` once `max_wait` has passed (`None` means
    /// no bound) and with `Cancelled` when `cancel` fires. Transient remote
    /// failures are retried at the poll interval.
    pub async fn await_first_result(
        &self,
        filter: &ExecutionFilter,
        max_wait: Option<Duration>,
        cancel: &CancelToken,
    ) -> Result<Vec<ExecutionSummary>> {
        let start = Instant::now();
        let deadline = max_wait.map(|w| start + w);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.list_raw(filter).await {
                Ok(found) if !found.is_empty() => {
                    info!(
                        schedule = %self.schedule_name,
                        count = found.len(),
                        attempts,
                        elapsed_secs = start.elapsed().as_secs(),
                        "First executions available"
                    );
                    return Ok(found);
                }
                Ok(_) => debug!(schedule = %self.schedule_name, attempts, "No executions yet"),
                Err(e) if e.is_transient() => {
                    warn!(schedule = %self.schedule_name, error = %e, "ListExecutions failed, retrying");
                }
                Err(e) => return Err(remote_failure("ListExecutions", &self.schedule_name, e)),
            }

            match pause(cancel, self.poll_interval, deadline).await {
                Pause::Elapsed => {}
                Pause::Cancelled => {
                    info!(schedule = %self.schedule_name, attempts, "Wait for executions cancelled");
                    return Err(LookoutError::Cancelled {
                        target: format!("executions of {}", self.schedule_name),
                    });
                }
                Pause::DeadlineReached => {
                    return Err(LookoutError::WaitTimeout {
                        target: format!("executions of {}", self.schedule_name),
                        waited_secs: start.elapsed().as_secs(),
                    });
                }
            }
        }
    }

    /// List with `filter` and fold the result into `history`, returning only
    /// summaries that were new or changed.
    pub async fn refresh(
        &self,
        history: &mut ExecutionHistory,
        filter: &ExecutionFilter,
    ) -> Result<Vec<ExecutionSummary>> {
        let listed = self.list(filter).await?;
        let fresh: Vec<_> = listed
            .into_iter()
            .filter(|s| history.record(s.clone()))
            .collect();
        debug!(schedule = %self.schedule_name, fresh = fresh.len(), known = history.len(), "Refreshed history");
        Ok(fresh)
    }
}

// ── History ───────────────────────────────────────────────────

/// Accumulated view of a schedule's executions, keyed by fire time.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    by_fire_time: BTreeMap<DateTime<Utc>, ExecutionSummary>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_fire_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fire_time.is_empty()
    }

    pub fn get(&self, fire_time: &DateTime<Utc>) -> Option<&ExecutionSummary> {
        self.by_fire_time.get(fire_time)
    }

    /// Ascending by fire time.
    pub fn summaries(&self) -> impl Iterator<Item = &ExecutionSummary> {
        self.by_fire_time.values()
    }

    pub fn with_status(&self, status: ExecutionStatus) -> impl Iterator<Item = &ExecutionSummary> {
        self.summaries().filter(move |s| s.status == status)
    }

    /// Latest fire time seen, useful as the lower bound of the next listing.
    pub fn latest_fire_time(&self) -> Option<DateTime<Utc>> {
        self.by_fire_time.keys().next_back().copied()
    }

    /// Insert or replace. Returns true when the summary was unknown or differs
    /// from the stored one.
    pub fn record(&mut self, summary: ExecutionSummary) -> bool {
        match self.by_fire_time.get(&summary.fire_time) {
            Some(known) if *known == summary => false,
            _ => {
                self.by_fire_time.insert(summary.fire_time, summary);
                true
            }
        }
    }
}
