//! Schedule Lifecycle Controller.
//!
//! ```text
//! UNCREATED --create--> RUNNING --stop--> STOPPED --delete--> DELETED
//!                          ^                 |
//!                          +-----start-------+
//! ```
//!
//! Transitions are serialised through a mutex held across the remote call,
//! and local state only moves after the remote confirms.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use lookout_core::{LookoutError, Result, ScheduleConfig, ScheduleState};
use lookout_remote::{CreateScheduleRequest, RemoteApi, RemoteError};

use crate::remote_error::remote_failure;

// ── Registry ──────────────────────────────────────────────────

/// Model → schedule claims. One active schedule per model.
///
/// Share one registry (behind an `Arc`) between every controller that talks
/// to the same account and region.
#[derive(Default)]
pub struct ScheduleRegistry {
    claims: Mutex<HashMap<String, String>>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule currently holding `model`, if any.
    pub fn owner(&self, model: &str) -> Option<String> {
        self.lock().get(model).cloned()
    }

    /// Claim `model` for `schedule`. Re-claiming by the same schedule is a no-op.
    fn claim(&self, model: &str, schedule: &str) -> Result<()> {
        let mut claims = self.lock();
        match claims.get(model) {
            Some(existing) if existing != schedule => Err(LookoutError::AlreadyExists {
                model: model.to_string(),
                existing: existing.clone(),
            }),
            _ => {
                claims.insert(model.to_string(), schedule.to_string());
                Ok(())
            }
        }
    }

    fn release(&self, model: &str, schedule: &str) {
        let mut claims = self.lock();
        if claims.get(model).map(String::as_str) == Some(schedule) {
            claims.remove(model);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Controller ────────────────────────────────────────────────

pub struct LifecycleController {
    remote: Arc<dyn RemoteApi>,
    registry: Arc<ScheduleRegistry>,
    config: ScheduleConfig,
    state: tokio::sync::Mutex<ScheduleState>,
}

impl LifecycleController {
    /// Controller for a schedule that does not exist yet.
    pub fn new(remote: Arc<dyn RemoteApi>, registry: Arc<ScheduleRegistry>, config: ScheduleConfig) -> Self {
        Self {
            remote,
            registry,
            config,
            state: tokio::sync::Mutex::new(ScheduleState::Uncreated),
        }
    }

    /// Adopt a schedule whose state is already known (e.g. created by an
    /// earlier process). RUNNING and STOPPED schedules claim their model.
    pub fn attach(
        remote: Arc<dyn RemoteApi>,
        registry: Arc<ScheduleRegistry>,
        config: ScheduleConfig,
        state: ScheduleState,
    ) -> Result<Self> {
        if matches!(state, ScheduleState::Running | ScheduleState::Stopped) {
            registry.claim(&config.model_name, &config.schedule_name)?;
        }
        debug!(schedule = %config.schedule_name, state = %state, "Attached to schedule");
        Ok(Self {
            remote,
            registry,
            config,
            state: tokio::sync::Mutex::new(state),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.schedule_name
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub async fn state(&self) -> ScheduleState {
        *self.state.lock().await
    }

    /// Create the remote schedule. It starts executing immediately, so the
    /// resulting state is RUNNING.
    pub async fn create(&self) -> Result<ScheduleState> {
        let mut state = self.state.lock().await;
        let name = self.config.schedule_name.clone();
        let model = self.config.model_name.clone();

        match *state {
            ScheduleState::Uncreated => {}
            ScheduleState::Running | ScheduleState::Stopped => {
                return Err(LookoutError::AlreadyExists { model, existing: name });
            }
            ScheduleState::Deleted => return Err(self.invalid_state(*state, "create")),
        }
        self.registry.claim(&model, &name)?;

        debug!(schedule = %name, model = %model, "CreateSchedule");
        let request = CreateScheduleRequest::new(self.config.clone());
        match self.remote.create_schedule(&request).await {
            Ok(remote_status) => {
                *state = ScheduleState::Running;
                info!(
                    schedule = %name,
                    model = %model,
                    remote_status = %remote_status,
                    frequency = %self.config.upload_frequency,
                    "Schedule created"
                );
                Ok(*state)
            }
            Err(err) => {
                self.registry.release(&model, &name);
                warn!(schedule = %name, error = %err, "CreateSchedule failed");
                Err(match err {
                    RemoteError::Conflict(detail) => LookoutError::AlreadyExists {
                        model,
                        existing: format!("(remote: {detail})"),
                    },
                    other => remote_failure("CreateSchedule", &name, other),
                })
            }
        }
    }

    pub async fn stop(&self) -> Result<ScheduleState> {
        let mut state = self.state.lock().await;
        if *state != ScheduleState::Running {
            return Err(self.invalid_state(*state, "stop"));
        }
        let name = self.name();

        debug!(schedule = %name, "StopSchedule");
        let remote_status = self
            .remote
            .stop_schedule(name)
            .await
            .map_err(|e| self.transition_failure("StopSchedule", "stop", e))?;
        *state = ScheduleState::Stopped;
        info!(schedule = %name, remote_status = %remote_status, "Schedule stopped");
        Ok(*state)
    }

    pub async fn start(&self) -> Result<ScheduleState> {
        let mut state = self.state.lock().await;
        if *state != ScheduleState::Stopped {
            return Err(self.invalid_state(*state, "start"));
        }
        let name = self.name();

        debug!(schedule = %name, "StartSchedule");
        let remote_status = self
            .remote
            .start_schedule(name)
            .await
            .map_err(|e| self.transition_failure("StartSchedule", "start", e))?;
        *state = ScheduleState::Running;
        info!(schedule = %name, remote_status = %remote_status, "Schedule started");
        Ok(*state)
    }

    /// Delete a STOPPED schedule and release its model claim.
    pub async fn delete(&self) -> Result<ScheduleState> {
        let mut state = self.state.lock().await;
        if *state != ScheduleState::Stopped {
            return Err(self.invalid_state(*state, "delete"));
        }
        let name = self.name();

        debug!(schedule = %name, "DeleteSchedule");
        self.remote
            .delete_schedule(name)
            .await
            .map_err(|e| self.transition_failure("DeleteSchedule", "delete", e))?;
        *state = ScheduleState::Deleted;
        self.registry.release(&self.config.model_name, name);
        info!(schedule = %name, model = %self.config.model_name, "Schedule deleted");
        Ok(*state)
    }

    /// Stop if RUNNING, no-op if already STOPPED.
    ///
    /// A remote conflict on stop means the schedule is already stopped
    /// remotely, so the local state follows it.
    pub async fn ensure_stopped(&self) -> Result<ScheduleState> {
        let mut state = self.state.lock().await;
        match *state {
            ScheduleState::Stopped => return Ok(ScheduleState::Stopped),
            ScheduleState::Running => {}
            other => return Err(self.invalid_state(other, "stop")),
        }
        let name = self.name();

        debug!(schedule = %name, "StopSchedule");
        match self.remote.stop_schedule(name).await {
            Ok(remote_status) => {
                info!(schedule = %name, remote_status = %remote_status, "Schedule stopped");
            }
            Err(RemoteError::Conflict(detail)) => {
                info!(schedule = %name, detail = %detail, "Schedule already stopped remotely");
            }
            Err(e) => return Err(self.transition_failure("StopSchedule", "stop", e)),
        }
        *state = ScheduleState::Stopped;
        Ok(*state)
    }

    fn invalid_state(&self, state: ScheduleState, operation: &'static str) -> LookoutError {
        LookoutError::InvalidState {
            schedule: self.config.schedule_name.clone(),
            state,
            operation,
        }
    }

    /// A remote conflict on a transition means the remote disagrees with our
    /// view of the state; the remote's reason is kept.
    fn transition_failure(&self, remote_op: &'static str, operation: &'static str, err: RemoteError) -> LookoutError {
        warn!(schedule = %self.config.schedule_name, error = %err, "{remote_op} failed");
        match err {
            RemoteError::Conflict(detail) => LookoutError::StateConflict {
                schedule: self.config.schedule_name.clone(),
                operation,
                detail,
            },
            other => remote_failure(remote_op, &self.config.schedule_name, other),
        }
    }
}
