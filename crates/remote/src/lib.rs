pub mod api;
pub mod client;
pub mod config;
pub mod error;

pub use api::{
    CreateScheduleRequest, ExecutionPage, ExecutionQuery, IngestionJobHandle, IngestionRequest,
    RemoteApi, RemoteScheduleStatus, TimeRange,
};
pub use client::LookoutClient;
pub use config::RemoteConfig;
pub use error::RemoteError;
