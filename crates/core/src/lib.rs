pub mod anomaly;
pub mod config;
pub mod error;
pub mod execution;
pub mod resolver;
pub mod schedule;
pub mod timeline;

pub use anomaly::{uniform_baseline, AnomalyRecord, DiagnosticContribution};
pub use config::Config;
pub use error::*;
pub use execution::{ExecutionStatus, ExecutionSummary, IngestionJob, JobStatus, ObjectRef};
pub use resolver::{Resolver, RunPlan};
pub use schedule::{
    ComponentDelimiter, ScheduleConfig, ScheduleSettings, ScheduleState, ScheduleTiming,
    TimestampFormat, TimezoneOffset, UploadFrequency,
};
pub use timeline::{AnomalyEvent, SensorRank, Timeline};
