use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::schedule::ScheduleState;

#[derive(Error, Debug)]
pub enum LookoutError {
    #[error("invalid configuration: {field} = {value:?} ({reason})")]
    InvalidConfiguration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("schedule {existing} already exists for model {model}")]
    AlreadyExists { model: String, existing: String },

    #[error("cannot {operation} schedule {schedule} while {state}")]
    InvalidState {
        schedule: String,
        state: ScheduleState,
        operation: &'static str,
    },

    #[error("cannot {operation} schedule {schedule}: remote rejected the transition ({detail})")]
    StateConflict {
        schedule: String,
        operation: &'static str,
        detail: String,
    },

    #[error("{operation} failed for {target}: {message}")]
    TransportFailure {
        operation: &'static str,
        target: String,
        message: String,
    },

    #[error("malformed result for schedule {schedule} (fire time {fire_time}, s3://{bucket}/{key}): {reason}")]
    MalformedResult {
        schedule: String,
        fire_time: DateTime<Utc>,
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("timestamp {timestamp} from schedule {schedule} (fire time {fire_time}, s3://{bucket}/{key}) is already in the timeline")]
    InconsistentTimeline {
        schedule: String,
        fire_time: DateTime<Utc>,
        bucket: String,
        key: String,
        timestamp: DateTime<Utc>,
    },

    #[error("no rows of {key} fall inside [{window_start}, {window_end})")]
    NoDataInWindow {
        key: String,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },

    #[error("gave up waiting on {target} after {waited_secs}s")]
    WaitTimeout { target: String, waited_secs: u64 },

    #[error("wait on {target} was cancelled")]
    Cancelled { target: String },
}

impl LookoutError {
    pub fn invalid_config(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfiguration {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Data-integrity failures: fatal to one execution's contribution only.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedResult { .. } | Self::InconsistentTimeline { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LookoutError>;
