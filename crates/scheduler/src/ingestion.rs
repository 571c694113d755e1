//! Ingestion Job Controller: start a one-shot job and poll it to completion.
//!
//! A FAILED job is returned as data, never resubmitted.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use lookout_core::config::PollingConfig;
use lookout_core::{IngestionJob, JobStatus, LookoutError, Result};
use lookout_remote::{IngestionRequest, RemoteApi};

use crate::cancel::{pause, CancelToken, Pause};
use crate::remote_error::remote_failure;

/// One observed job status, stamped with time since the job was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobProgress {
    pub job_id: String,
    pub status: JobStatus,
    pub elapsed: Duration,
}

pub struct IngestionController {
    remote: Arc<dyn RemoteApi>,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl IngestionController {
    pub fn new(remote: Arc<dyn RemoteApi>, polling: &PollingConfig) -> Self {
        Self {
            remote,
            poll_interval: polling.poll_interval(),
            max_wait: polling.max_wait(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// `None` waits until the job is terminal or the token is cancelled.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Start the job and poll until SUCCESS or FAILED.
    ///
    /// `on_progress` sees the initial status and every change after it.
    /// Transient describe failures are retried at the poll interval; any
    /// other remote failure ends the wait.
    pub async fn run<F>(
        &self,
        request: &IngestionRequest,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<IngestionJob>
    where
        F: FnMut(&JobProgress),
    {
        let dataset = request.dataset_name.as_str();
        debug!(dataset = %dataset, source = %request.source, "StartIngestionJob");
        let started = self
            .remote
            .start_ingestion_job(request)
            .await
            .map_err(|e| remote_failure("StartIngestionJob", dataset, e))?;

        let start = Instant::now();
        let deadline = self.max_wait.map(|w| start + w);
        let job_id = started.job_id;
        let mut status = started.status;
        let mut failed_reason = started.failed_reason;
        info!(dataset = %dataset, job_id = %job_id, status = %status, "Ingestion job started");
        on_progress(&JobProgress {
            job_id: job_id.clone(),
            status,
            elapsed: Duration::ZERO,
        });

        while !status.is_terminal() {
            match pause(cancel, self.poll_interval, deadline).await {
                Pause::Elapsed => {}
                Pause::Cancelled => {
                    info!(job_id = %job_id, "Ingestion wait cancelled");
                    return Err(LookoutError::Cancelled {
                        target: format!("ingestion job {job_id}"),
                    });
                }
                Pause::DeadlineReached => {
                    return Err(LookoutError::WaitTimeout {
                        target: format!("ingestion job {job_id}"),
                        waited_secs: start.elapsed().as_secs(),
                    });
                }
            }

            let handle = match self.remote.describe_ingestion_job(&job_id).await {
                Ok(handle) => handle,
                Err(e) if e.is_transient() => {
                    warn!(job_id = %job_id, error = %e, "DescribeIngestionJob failed, retrying");
                    continue;
                }
                Err(e) => return Err(remote_failure("DescribeIngestionJob", &job_id, e)),
            };

            let elapsed = start.elapsed();
            debug!(job_id = %job_id, status = %handle.status, elapsed_ms = elapsed.as_millis() as u64, "Polled ingestion job");
            if handle.status != status {
                info!(
                    job_id = %job_id,
                    from = %status,
                    to = %handle.status,
                    elapsed_secs = elapsed.as_secs(),
                    "Ingestion job status changed"
                );
                status = handle.status;
                on_progress(&JobProgress {
                    job_id: job_id.clone(),
                    status,
                    elapsed,
                });
            }
            failed_reason = handle.failed_reason;
        }

        if status == JobStatus::Failed {
            warn!(
                job_id = %job_id,
                reason = failed_reason.as_deref().unwrap_or("unknown"),
                "Ingestion job failed"
            );
        }

        Ok(IngestionJob {
            job_id,
            status,
            source: request.source.clone(),
            dataset_name: request.dataset_name.clone(),
            failed_reason,
        })
    }
}
