//! Inference scheduling and result reconciliation.
//!
//! - [`LifecycleController`]: create / start / stop / delete a remote schedule.
//! - [`IngestionController`]: run a one-shot ingestion job to completion.
//! - [`ExecutionPoller`]: list executions, optionally blocking until one appears.
//! - [`ResultAggregator`]: fetch, parse and merge execution outputs into a
//!   [`Timeline`](lookout_core::Timeline).
//!
//! Every blocking wait takes a [`CancelToken`] and an optional upper bound.

pub mod aggregator;
pub mod cancel;
pub mod ingestion;
pub mod lifecycle;
pub mod poller;

mod remote_error;

pub use aggregator::{AggregationReport, FailedExecution, ResultAggregator};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use ingestion::{IngestionController, JobProgress};
pub use lifecycle::{LifecycleController, ScheduleRegistry};
pub use poller::{ExecutionFilter, ExecutionHistory, ExecutionPoller};
