//! Remote detection-service capability.
//!
//! The scheduler only ever talks to the service through [`RemoteApi`], so the
//! AWS client and in-process test doubles are interchangeable.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lookout_core::{ExecutionStatus, ExecutionSummary, JobStatus, ObjectRef, ScheduleConfig, UploadFrequency};

use crate::error::RemoteError;

/// Status the remote reports for a schedule after a lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteScheduleStatus {
    Pending,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for RemoteScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteScheduleStatus::Pending => "PENDING",
            RemoteScheduleStatus::Running => "RUNNING",
            RemoteScheduleStatus::Stopping => "STOPPING",
            RemoteScheduleStatus::Stopped => "STOPPED",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub config: ScheduleConfig,
    /// Idempotency token; a retried create with the same token is a no-op.
    pub client_token: String,
}

impl CreateScheduleRequest {
    pub fn new(config: ScheduleConfig) -> Self {
        Self {
            config,
            client_token: Uuid::new_v4().to_string(),
        }
    }
}

/// Optional bounds on execution data windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Only executions whose data window starts after this instant.
    pub start_after: Option<DateTime<Utc>>,
    /// Only executions whose data window ends before this instant.
    pub end_before: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start_after: Some(start),
            end_before: None,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start_after: Some(start),
            end_before: Some(end),
        }
    }
}

/// One page request of `ListExecutions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionQuery {
    pub schedule_name: String,
    pub range: TimeRange,
    pub status: Option<ExecutionStatus>,
    pub page_size: u32,
    pub next_token: Option<String>,
    /// Used to derive data windows the remote leaves out.
    pub frequency: UploadFrequency,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionPage {
    pub summaries: Vec<ExecutionSummary>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub dataset_name: String,
    pub role_arn: String,
    /// Bucket and key prefix holding the historical CSV files.
    pub source: ObjectRef,
    pub client_token: String,
}

impl IngestionRequest {
    pub fn new(dataset_name: impl Into<String>, role_arn: impl Into<String>, source: ObjectRef) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            role_arn: role_arn.into(),
            source,
            client_token: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionJobHandle {
    pub job_id: String,
    pub status: JobStatus,
    pub failed_reason: Option<String>,
}

/// Operations of the remote detection service.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn create_schedule(
        &self,
        request: &CreateScheduleRequest,
    ) -> Result<RemoteScheduleStatus, RemoteError>;

    async fn start_schedule(&self, name: &str) -> Result<RemoteScheduleStatus, RemoteError>;

    async fn stop_schedule(&self, name: &str) -> Result<RemoteScheduleStatus, RemoteError>;

    async fn delete_schedule(&self, name: &str) -> Result<(), RemoteError>;

    /// One page of executions, in whatever order the remote returns them.
    async fn list_executions(&self, query: &ExecutionQuery) -> Result<ExecutionPage, RemoteError>;

    async fn start_ingestion_job(
        &self,
        request: &IngestionRequest,
    ) -> Result<IngestionJobHandle, RemoteError>;

    async fn describe_ingestion_job(&self, job_id: &str) -> Result<IngestionJobHandle, RemoteError>;
}
