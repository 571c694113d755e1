//! Transient records produced by the remote: scheduled executions and
//! ingestion jobs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::UploadFrequency;

/// Location of an object in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    InProgress,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::InProgress)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
        })
    }
}

/// One scheduled invocation bound to a data window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub schedule_name: String,
    pub fire_time: DateTime<Utc>,
    pub data_start: DateTime<Utc>,
    pub data_end: DateTime<Utc>,
    pub status: ExecutionStatus,
    /// Output object; set only when `status` is SUCCESS.
    pub output: Option<ObjectRef>,
    pub failed_reason: Option<String>,
}

impl ExecutionSummary {
    /// Build a summary whose window is derived as `[fire − frequency, fire)`.
    pub fn derived(
        schedule_name: impl Into<String>,
        fire_time: DateTime<Utc>,
        frequency: UploadFrequency,
        status: ExecutionStatus,
        output: Option<ObjectRef>,
    ) -> Self {
        Self {
            schedule_name: schedule_name.into(),
            fire_time,
            data_start: fire_time - frequency.duration(),
            data_end: fire_time,
            status,
            output,
            failed_reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InProgress,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        })
    }
}

/// One-shot batch load of historical data into a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub status: JobStatus,
    pub source: ObjectRef,
    pub dataset_name: String,
    pub failed_reason: Option<String>,
}
