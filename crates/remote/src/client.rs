//! AWS Lookout for Equipment client.
//!
//! Implements [`RemoteApi`] on top of the AWS SDK: inference-scheduler
//! lifecycle, paginated execution listing and data-ingestion jobs. SDK errors
//! are classified into [`RemoteError`] so callers can tell transient transport
//! failures from semantic rejections.

use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_lookoutequipment::config::timeout::TimeoutConfig;
use aws_sdk_lookoutequipment::config::{BehaviorVersion, Region};
use aws_sdk_lookoutequipment::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_lookoutequipment::primitives::DateTime as AwsDateTime;
use aws_sdk_lookoutequipment::types::{
    DataUploadFrequency, InferenceExecutionStatus, InferenceExecutionSummary,
    InferenceInputConfiguration, InferenceInputNameConfiguration, InferenceOutputConfiguration,
    InferenceS3InputConfiguration, InferenceS3OutputConfiguration, InferenceSchedulerStatus,
    IngestionInputConfiguration, IngestionJobStatus, IngestionS3InputConfiguration,
};
use aws_sdk_lookoutequipment::Client;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use lookout_core::{ExecutionStatus, ExecutionSummary, JobStatus, ObjectRef, UploadFrequency};

use crate::api::{
    CreateScheduleRequest, ExecutionPage, ExecutionQuery, IngestionJobHandle, IngestionRequest,
    RemoteApi, RemoteScheduleStatus,
};
use crate::config::RemoteConfig;
use crate::error::RemoteError;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Remote detection service backed by AWS Lookout for Equipment.
pub struct LookoutClient {
    client: Client,
}

impl LookoutClient {
    /// Create a new [`LookoutClient`] from the given configuration.
    pub async fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let region = Region::new(config.region.clone());

        // Build the service config directly rather than through
        // aws_config::defaults(): that path also picks up AWS_ENDPOINT_URL,
        // which normally points at S3.
        let mut builder = aws_sdk_lookoutequipment::Config::builder()
            .region(region.clone())
            .behavior_version(BehaviorVersion::latest())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.operation_timeout_secs))
                    .build(),
            );

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                config.session_token.clone(),
                None,
                "lookout-remote-static",
            );
            builder = builder.credentials_provider(creds);
        } else {
            let chain = aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                .region(region)
                .build()
                .await;
            builder = builder.credentials_provider(chain);
        }

        if let Some(endpoint) = config.endpoint() {
            builder = builder.endpoint_url(endpoint);
        }

        info!(region = %config.region, "LookoutClient initialised");

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

#[async_trait]
impl RemoteApi for LookoutClient {
    async fn create_schedule(
        &self,
        request: &CreateScheduleRequest,
    ) -> Result<RemoteScheduleStatus, RemoteError> {
        let cfg = &request.config;
        info!(
            schedule = %cfg.schedule_name,
            model = %cfg.model_name,
            frequency = %cfg.upload_frequency,
            "Creating inference scheduler"
        );

        let s3_input = InferenceS3InputConfiguration::builder()
            .bucket(&cfg.input_bucket)
            .set_prefix(non_empty(&cfg.input_prefix))
            .build()
            .map_err(|e| RemoteError::Validation(e.to_string()))?;
        let name_cfg = InferenceInputNameConfiguration::builder()
            .timestamp_format(cfg.timestamp_format.as_str())
            .component_timestamp_delimiter(cfg.component_delimiter.as_str())
            .build();
        let input = InferenceInputConfiguration::builder()
            .s3_input_configuration(s3_input)
            .input_time_zone_offset(cfg.timezone_offset.to_string())
            .inference_input_name_configuration(name_cfg)
            .build();

        let s3_output = InferenceS3OutputConfiguration::builder()
            .bucket(&cfg.output_bucket)
            .set_prefix(non_empty(&cfg.output_prefix))
            .build()
            .map_err(|e| RemoteError::Validation(e.to_string()))?;
        let output = InferenceOutputConfiguration::builder()
            .s3_output_configuration(s3_output)
            .build();

        let resp = self
            .client
            .create_inference_scheduler()
            .model_name(&cfg.model_name)
            .inference_scheduler_name(&cfg.schedule_name)
            .data_upload_frequency(DataUploadFrequency::from(cfg.upload_frequency.as_iso()))
            .data_delay_offset_in_minutes(i64::from(cfg.delay_offset_minutes))
            .data_input_configuration(input)
            .data_output_configuration(output)
            .role_arn(&cfg.role_arn)
            .client_token(&request.client_token)
            .send()
            .await
            .map_err(|e| classify("CreateInferenceScheduler", e))?;

        Ok(scheduler_status(resp.status()))
    }

    async fn start_schedule(&self, name: &str) -> Result<RemoteScheduleStatus, RemoteError> {
        debug!(schedule = %name, "Starting inference scheduler");
        let resp = self
            .client
            .start_inference_scheduler()
            .inference_scheduler_name(name)
            .send()
            .await
            .map_err(|e| classify("StartInferenceScheduler", e))?;
        Ok(scheduler_status(resp.status()))
    }

    async fn stop_schedule(&self, name: &str) -> Result<RemoteScheduleStatus, RemoteError> {
        debug!(schedule = %name, "Stopping inference scheduler");
        let resp = self
            .client
            .stop_inference_scheduler()
            .inference_scheduler_name(name)
            .send()
            .await
            .map_err(|e| classify("StopInferenceScheduler", e))?;
        Ok(scheduler_status(resp.status()))
    }

    async fn delete_schedule(&self, name: &str) -> Result<(), RemoteError> {
        debug!(schedule = %name, "Deleting inference scheduler");
        self.client
            .delete_inference_scheduler()
            .inference_scheduler_name(name)
            .send()
            .await
            .map_err(|e| classify("DeleteInferenceScheduler", e))?;
        Ok(())
    }

    async fn list_executions(&self, query: &ExecutionQuery) -> Result<ExecutionPage, RemoteError> {
        debug!(
            schedule = %query.schedule_name,
            status = ?query.status,
            page_size = query.page_size,
            has_token = query.next_token.is_some(),
            "Listing inference executions"
        );

        let resp = self
            .client
            .list_inference_executions()
            .inference_scheduler_name(&query.schedule_name)
            .set_data_start_time_after(query.range.start_after.map(to_aws_time))
            .set_data_end_time_before(query.range.end_before.map(to_aws_time))
            .set_status(query.status.map(execution_status_wire))
            .max_results(query.page_size.clamp(1, 500) as i32)
            .set_next_token(query.next_token.clone())
            .send()
            .await
            .map_err(|e| classify("ListInferenceExecutions", e))?;

        let summaries = resp
            .inference_execution_summaries()
            .iter()
            .filter_map(|s| convert_summary(&query.schedule_name, query.frequency, s))
            .collect();

        Ok(ExecutionPage {
            summaries,
            next_token: resp.next_token().map(str::to_string),
        })
    }

    async fn start_ingestion_job(
        &self,
        request: &IngestionRequest,
    ) -> Result<IngestionJobHandle, RemoteError> {
        info!(
            dataset = %request.dataset_name,
            source = %request.source,
            "Starting data ingestion job"
        );

        let input = ingestion_input(&request.source)?;
        let resp = self
            .client
            .start_data_ingestion_job()
            .dataset_name(&request.dataset_name)
            .ingestion_input_configuration(input)
            .role_arn(&request.role_arn)
            .client_token(&request.client_token)
            .send()
            .await
            .map_err(|e| classify("StartDataIngestionJob", e))?;

        let job_id = resp
            .job_id()
            .ok_or_else(|| RemoteError::Service("No ingestion job ID returned".into()))?
            .to_string();

        Ok(IngestionJobHandle {
            job_id,
            status: job_status(resp.status()),
            failed_reason: None,
        })
    }

    async fn describe_ingestion_job(&self, job_id: &str) -> Result<IngestionJobHandle, RemoteError> {
        let resp = self
            .client
            .describe_data_ingestion_job()
            .job_id(job_id)
            .send()
            .await
            .map_err(|e| classify("DescribeDataIngestionJob", e))?;

        Ok(IngestionJobHandle {
            job_id: job_id.to_string(),
            status: job_status(resp.status()),
            failed_reason: resp.failed_reason().map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn ingestion_input(source: &ObjectRef) -> Result<IngestionInputConfiguration, RemoteError> {
    let s3_input = IngestionS3InputConfiguration::builder()
        .bucket(&source.bucket)
        .set_prefix(non_empty(&source.key))
        .build()
        .map_err(|e| RemoteError::Validation(e.to_string()))?;
    Ok(IngestionInputConfiguration::builder()
        .s3_input_configuration(s3_input)
        .build())
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

fn to_aws_time(t: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_secs(t.timestamp())
}

fn from_aws_time(t: &AwsDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(t.secs(), t.subsec_nanos()).single()
}

fn scheduler_status(status: Option<&InferenceSchedulerStatus>) -> RemoteScheduleStatus {
    match status.map(|s| s.as_str()) {
        Some("RUNNING") => RemoteScheduleStatus::Running,
        Some("STOPPING") => RemoteScheduleStatus::Stopping,
        Some("STOPPED") => RemoteScheduleStatus::Stopped,
        _ => RemoteScheduleStatus::Pending,
    }
}

fn job_status(status: Option<&IngestionJobStatus>) -> JobStatus {
    match status.map(|s| s.as_str()) {
        Some("SUCCESS") => JobStatus::Success,
        Some("FAILED") => JobStatus::Failed,
        // IN_PROGRESS, IMPORT_IN_PROGRESS, or anything newer
        _ => JobStatus::InProgress,
    }
}

fn execution_status_wire(status: ExecutionStatus) -> InferenceExecutionStatus {
    InferenceExecutionStatus::from(status.to_string().as_str())
}

fn convert_summary(
    schedule_name: &str,
    frequency: UploadFrequency,
    s: &InferenceExecutionSummary,
) -> Option<ExecutionSummary> {
    let Some(fire_time) = s.scheduled_start_time().and_then(from_aws_time) else {
        warn!(schedule = %schedule_name, "Skipping execution without scheduled start time");
        return None;
    };

    let status = match s.status().map(|st| st.as_str()) {
        Some("SUCCESS") => ExecutionStatus::Success,
        Some("FAILED") => ExecutionStatus::Failed,
        _ => ExecutionStatus::InProgress,
    };

    let output = match status {
        ExecutionStatus::Success => s
            .customer_result_object()
            .map(|o| ObjectRef::new(o.bucket(), o.key())),
        _ => None,
    };

    let mut summary = ExecutionSummary::derived(
        s.inference_scheduler_name().unwrap_or(schedule_name),
        fire_time,
        frequency,
        status,
        output,
    );
    if let Some(start) = s.data_start_time().and_then(from_aws_time) {
        summary.data_start = start;
    }
    if let Some(end) = s.data_end_time().and_then(from_aws_time) {
        summary.data_end = end;
    }
    summary.failed_reason = s.failed_reason().map(str::to_string);
    Some(summary)
}

/// Map an SDK error onto [`RemoteError`].
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = format!("{operation}: {}", DisplayErrorContext(&err));

    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    ) {
        return RemoteError::Transport(detail);
    }

    match err.code() {
        Some("ConflictException") => RemoteError::Conflict(detail),
        Some("ResourceNotFoundException") => RemoteError::NotFound(detail),
        Some("ValidationException") => RemoteError::Validation(detail),
        Some("ThrottlingException") => RemoteError::Throttled(detail),
        Some("AccessDeniedException") => RemoteError::AccessDenied(detail),
        Some("InternalServerException") => RemoteError::Transport(detail),
        _ => RemoteError::Service(detail),
    }
}

// ---------------------------------------------------------------------------
// Tests: conversion logic only, no AWS calls
// ---------------------------------------------------------------------------
