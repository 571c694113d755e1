use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schedule::{ScheduleConfig, ScheduleSettings};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub schedule: ScheduleSettings,
    pub polling: PollingConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `LOOKOUT_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("LOOKOUT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let aws = AwsConfig::from_env_profiled(p);
        Self {
            profile: p.to_string(),
            schedule: schedule_settings_from_env(p, &aws.region),
            aws,
            polling: PollingConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Validate the raw schedule settings.
    pub fn schedule_config(&self) -> Result<ScheduleConfig> {
        ScheduleConfig::from_settings(&self.schedule)
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        let s = &self.schedule;
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  aws:       region={}, static_credentials={}",
            self.aws.region,
            self.aws.has_static_credentials()
        );
        tracing::info!(
            "  schedule:  name={}, model={}",
            s.schedule_name.as_deref().unwrap_or("(none)"),
            s.model_name.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  input:     s3://{}/{}",
            s.input_bucket.as_deref().unwrap_or("(none)"),
            s.input_prefix.as_deref().unwrap_or("")
        );
        tracing::info!(
            "  output:    s3://{}/{}",
            s.output_bucket.as_deref().unwrap_or("(none)"),
            s.output_prefix.as_deref().unwrap_or("")
        );
        tracing::info!(
            "  polling:   interval={}s, max_wait={}s, page_size={}",
            self.polling.poll_interval_secs,
            self.polling.max_wait_secs,
            self.polling.page_size
        );
    }
}

fn schedule_settings_from_env(p: &str, region: &str) -> ScheduleSettings {
    ScheduleSettings {
        schedule_name: profiled_env_opt(p, "LOOKOUT_SCHEDULE_NAME"),
        model_name: profiled_env_opt(p, "LOOKOUT_MODEL_NAME"),
        region: region.to_string(),
        role_arn: profiled_env_opt(p, "LOOKOUT_ROLE_ARN"),
        input_bucket: profiled_env_opt(p, "LOOKOUT_INPUT_BUCKET"),
        input_prefix: profiled_env_opt(p, "LOOKOUT_INPUT_PREFIX"),
        output_bucket: profiled_env_opt(p, "LOOKOUT_OUTPUT_BUCKET"),
        output_prefix: profiled_env_opt(p, "LOOKOUT_OUTPUT_PREFIX"),
        upload_frequency: profiled_env_opt(p, "LOOKOUT_UPLOAD_FREQUENCY"),
        delay_offset_minutes: profiled_env_opt(p, "LOOKOUT_DELAY_OFFSET_MINUTES"),
        timezone_offset: profiled_env_opt(p, "LOOKOUT_TIMEZONE_OFFSET"),
        // Read raw: a single space is a legal delimiter and env_opt only drops "".
        component_delimiter: profiled_env_opt(p, "LOOKOUT_COMPONENT_DELIMITER"),
        timestamp_format: profiled_env_opt(p, "LOOKOUT_TIMESTAMP_FORMAT"),
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "eu-west-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Polling ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Fixed wait between status checks.
    pub poll_interval_secs: u64,
    /// Upper bound for any blocking wait (0 = wait until cancelled).
    pub max_wait_secs: u64,
    /// `ListExecutions` page size.
    pub page_size: u32,
    /// How many result objects are fetched and parsed at once.
    pub aggregation_concurrency: u32,
}

impl PollingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_secs: profiled_env_u64(p, "LOOKOUT_POLL_INTERVAL_SECS", 60),
            max_wait_secs: profiled_env_u64(p, "LOOKOUT_MAX_WAIT_SECS", 3_600),
            page_size: profiled_env_u32(p, "LOOKOUT_PAGE_SIZE", 50),
            aggregation_concurrency: profiled_env_u32(p, "LOOKOUT_AGGREGATION_CONCURRENCY", 4),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_secs > 0).then(|| Duration::from_secs(self.max_wait_secs))
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            max_wait_secs: 3_600,
            page_size: 50,
            aggregation_concurrency: 4,
        }
    }
}
