//! Integration tests for the scheduler against an in-process remote and
//! in-memory object storage: lifecycle, polling, ingestion and aggregation.

mod aggregation;
mod ingestion;
mod lifecycle;
mod polling;
