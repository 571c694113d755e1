use std::env;

use serde::{Deserialize, Serialize};

// ── Env helpers (mirrors core/config.rs) ──

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── RemoteConfig ─────────────────────────────────────────────────

/// Connection settings for the remote detection service.
///
/// Reads from environment variables with optional profile prefix.
/// When `LOOKOUT_PROFILE=PROD`, checks `PROD_LOOKOUT_REGION` before `LOOKOUT_REGION`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// AWS region hosting the service.
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// Service-specific endpoint override (never the generic `AWS_ENDPOINT_URL`,
    /// which usually points at S3).
    pub endpoint_url: Option<String>,
    /// Per-call timeout in seconds.
    pub operation_timeout_secs: u64,
}

impl RemoteConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Self {
        let profile = env_opt("LOOKOUT_PROFILE")
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
        Self::from_env_profiled(&profile)
    }

    /// Build config for a specific named profile.
    ///
    /// `LOOKOUT_REGION` falls back to `AWS_REGION` before using the default.
    pub fn from_env_profiled(profile: &str) -> Self {
        let region = profiled_env_opt(profile, "LOOKOUT_REGION")
            .or_else(|| profiled_env_opt(profile, "AWS_REGION"))
            .unwrap_or_else(|| "eu-west-1".to_string());

        Self {
            region,
            access_key_id: profiled_env_opt(profile, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(profile, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(profile, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(profile, "LOOKOUT_ENDPOINT_URL"),
            operation_timeout_secs: profiled_env_u64(profile, "LOOKOUT_OPERATION_TIMEOUT_SECS", 30),
        }
    }

    /// Endpoint with a scheme, as the SDK requires absolute URLs.
    pub fn endpoint(&self) -> Option<String> {
        self.endpoint_url
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(|e| {
                if e.starts_with("http://") || e.starts_with("https://") {
                    e.to_string()
                } else {
                    format!("https://{e}")
                }
            })
    }
}

// ── Tests ────────────────────────────────────────────────────────
