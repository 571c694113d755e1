use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use lookout_core::{Config, JobStatus, LookoutError, ObjectRef, Resolver, ScheduleConfig, ScheduleState};
use lookout_remote::{IngestionRequest, LookoutClient, RemoteApi, RemoteConfig};
use lookout_scheduler::{
    CancelToken, ExecutionFilter, ExecutionPoller, IngestionController, LifecycleController, ResultAggregator,
    ScheduleRegistry,
};
use lookout_storage::{ObjectSource, StorageEngine};

/// Everything a subcommand needs, resolved once in `main`.
pub struct CommandContext {
    pub config: Config,
    pub cancel: CancelToken,
    pub storage_root: Option<PathBuf>,
}

impl CommandContext {
    fn schedule(&self) -> Result<ScheduleConfig> {
        self.config
            .schedule_config()
            .context("schedule configuration is incomplete or invalid")
    }

    async fn remote(&self) -> Result<Arc<dyn RemoteApi>> {
        let remote_config = RemoteConfig::from_env_profiled(&self.config.profile);
        let client = LookoutClient::new(&remote_config)
            .await
            .context("failed to create detection service client")?;
        Ok(Arc::new(client))
    }

    fn storage(&self) -> Result<StorageEngine> {
        match &self.storage_root {
            Some(root) => StorageEngine::local(root)
                .with_context(|| format!("failed to open storage root {}", root.display())),
            None => Ok(StorageEngine::s3(&self.config.aws)),
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Resolver ──────────────────────────────────────────────────

pub fn resolve_key(ctx: &CommandContext, component: &str, fire_time: Option<DateTime<Utc>>) -> Result<()> {
    let resolver = Resolver::from_settings(&ctx.config.schedule)?;
    let fire_time = fire_time.unwrap_or_else(|| resolver.latest_due_fire_time(Utc::now()));
    let key = resolver.expected_object_key(component, fire_time)?;
    print_json(&json!({ "key": key, "plan": resolver.plan(fire_time) }))
}

pub fn next_fire(ctx: &CommandContext, after: Option<DateTime<Utc>>) -> Result<()> {
    let resolver = Resolver::from_settings(&ctx.config.schedule)?;
    let fire_time = resolver.next_fire_time(after.unwrap_or_else(Utc::now));
    print_json(&json!({
        "frequency": resolver.frequency().as_iso(),
        "plan": resolver.plan(fire_time),
    }))
}

pub async fn check_input(ctx: &CommandContext, component: &str, fire_time: Option<DateTime<Utc>>) -> Result<()> {
    let schedule = ctx.schedule()?;
    let resolver = Resolver::from_config(&schedule);
    let fire_time = fire_time.unwrap_or_else(|| resolver.latest_due_fire_time(Utc::now()));
    let key = resolver.expected_object_key(component, fire_time)?;
    let object = ObjectRef::new(schedule.input_bucket.clone(), key.clone());
    let storage = ctx.storage()?;

    let body = match storage.get_object(&object).await {
        Ok(body) => body,
        Err(e) if e.is_not_found() => {
            // Show what is there for the component, usually an offset or format mismatch.
            let nearby: Vec<_> = storage
                .list_keys(&schedule.input_bucket, &schedule.input_prefix)
                .await?
                .into_iter()
                .filter(|k| matches!(resolver.parse_key(k), Ok((c, _)) if c == component))
                .collect();
            warn!(expected = %object, candidates = nearby.len(), "Expected input object is missing");
            for k in nearby.iter().rev().take(5) {
                warn!(key = %k, "  found");
            }
            bail!("{object} does not exist");
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read {object}")),
    };

    let csv = std::str::from_utf8(&body).with_context(|| format!("{object} is not UTF-8"))?;
    let rows = resolver.count_rows_in_window(&key, csv, fire_time)?;
    let plan = resolver.plan(fire_time);
    print_json(&json!({ "object": object.to_string(), "rows_in_window": rows, "plan": plan }))
}

// ── Lifecycle ─────────────────────────────────────────────────

/// Attach to the schedule in the state `operation` expects. Each invocation is
/// its own process, so the remote is the source of truth between runs.
fn controller(remote: Arc<dyn RemoteApi>, schedule: ScheduleConfig, state: ScheduleState) -> Result<LifecycleController> {
    let registry = Arc::new(ScheduleRegistry::new());
    if state == ScheduleState::Uncreated {
        return Ok(LifecycleController::new(remote, registry, schedule));
    }
    Ok(LifecycleController::attach(remote, registry, schedule, state)?)
}

pub async fn create(ctx: &CommandContext) -> Result<()> {
    let schedule = ctx.schedule()?;
    let lifecycle = controller(ctx.remote().await?, schedule, ScheduleState::Uncreated)?;
    let state = lifecycle.create().await?;
    print_json(&json!({ "schedule": lifecycle.name(), "state": state.to_string() }))
}

pub async fn start(ctx: &CommandContext) -> Result<()> {
    let lifecycle = controller(ctx.remote().await?, ctx.schedule()?, ScheduleState::Stopped)?;
    let state = lifecycle.start().await?;
    print_json(&json!({ "schedule": lifecycle.name(), "state": state.to_string() }))
}

pub async fn stop(ctx: &CommandContext) -> Result<()> {
    let lifecycle = controller(ctx.remote().await?, ctx.schedule()?, ScheduleState::Running)?;
    let state = lifecycle.stop().await?;
    print_json(&json!({ "schedule": lifecycle.name(), "state": state.to_string() }))
}

pub async fn delete(ctx: &CommandContext, stop_first: bool) -> Result<()> {
    let assumed = if stop_first { ScheduleState::Running } else { ScheduleState::Stopped };
    let lifecycle = controller(ctx.remote().await?, ctx.schedule()?, assumed)?;
    if stop_first {
        lifecycle.ensure_stopped().await?;
    }
    let state = lifecycle.delete().await?;
    print_json(&json!({ "schedule": lifecycle.name(), "state": state.to_string() }))
}

// ── Ingestion ─────────────────────────────────────────────────

pub async fn ingest(
    ctx: &CommandContext,
    dataset: &str,
    bucket: &str,
    prefix: &str,
    role_arn: Option<String>,
) -> Result<()> {
    let Some(role_arn) = role_arn.or_else(|| ctx.config.schedule.role_arn.clone()) else {
        bail!("no role ARN: pass --role-arn or set LOOKOUT_ROLE_ARN");
    };
    let request = IngestionRequest::new(dataset, role_arn, ObjectRef::new(bucket, prefix));
    let controller = IngestionController::new(ctx.remote().await?, &ctx.config.polling);

    let job = controller
        .run(&request, &ctx.cancel, |p| {
            info!(job_id = %p.job_id, status = %p.status, elapsed_secs = p.elapsed.as_secs(), "Ingestion progress");
        })
        .await?;

    print_json(&serde_json::to_value(&job)?)?;
    if job.status == JobStatus::Failed {
        bail!(
            "ingestion job {} failed: {}",
            job.job_id,
            job.failed_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

// ── Executions ────────────────────────────────────────────────

fn filter_since(since: Option<DateTime<Utc>>) -> ExecutionFilter {
    since.map(ExecutionFilter::since).unwrap_or_default()
}

pub async fn wait_first(ctx: &CommandContext, since: Option<DateTime<Utc>>, max_wait_secs: Option<u64>) -> Result<()> {
    let schedule = ctx.schedule()?;
    let poller = ExecutionPoller::new(ctx.remote().await?, &schedule, &ctx.config.polling);
    let max_wait = match max_wait_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => ctx.config.polling.max_wait(),
    };

    let found = poller
        .await_first_result(&filter_since(since), max_wait, &ctx.cancel)
        .await?;
    for summary in &found {
        println!("{}", serde_json::to_string(summary)?);
    }
    Ok(())
}

pub async fn aggregate(
    ctx: &CommandContext,
    since: Option<DateTime<Utc>>,
    output: Option<&Path>,
    event_gap_secs: i64,
) -> Result<()> {
    let schedule = ctx.schedule()?;
    let poller = ExecutionPoller::new(ctx.remote().await?, &schedule, &ctx.config.polling);
    let storage: Arc<dyn ObjectSource> = Arc::new(ctx.storage()?);
    let mut aggregator = ResultAggregator::new(storage, ctx.config.polling.aggregation_concurrency as usize);

    let executions = poller.list(&filter_since(since)).await?;
    let report = aggregator.aggregate(&executions).await;
    let timeline = aggregator.timeline();

    for err in &report.errors {
        warn!(error = %err, "Execution not aggregated");
    }

    let events = timeline.events(chrono::Duration::seconds(event_gap_secs));
    let top_sensors: Vec<_> = timeline.sensor_ranking().into_iter().take(10).collect();
    print_json(&json!({
        "schedule": schedule.schedule_name,
        "executions": executions.len(),
        "merged": report.merged,
        "records_added": report.records_added,
        "in_progress": report.in_progress,
        "failed": report.failed.iter().map(|f| json!({
            "fire_time": f.fire_time,
            "reason": f.reason,
        })).collect::<Vec<_>>(),
        "errors": report.errors.iter().map(LookoutError::to_string).collect::<Vec<_>>(),
        "timeline": {
            "records": timeline.len(),
            "anomalies": timeline.anomaly_count(),
            "first": timeline.first().map(|r| r.timestamp),
            "last": timeline.last().map(|r| r.timestamp),
        },
        "events": events,
        "top_sensors": top_sensors,
    }))?;

    if let Some(path) = output {
        std::fs::write(path, timeline.to_json_lines()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), records = timeline.len(), "Timeline written");
    }

    if report.has_integrity_failures() {
        bail!("{} execution(s) had inconsistent or malformed results", report.errors.len());
    }
    Ok(())
}
