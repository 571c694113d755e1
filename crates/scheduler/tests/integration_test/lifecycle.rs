use std::sync::Arc;

use lookout_core::{LookoutError, ScheduleState};
use lookout_remote::RemoteError;
use lookout_scheduler::{LifecycleController, ScheduleRegistry};

use crate::helpers::{schedule_config, FakeRemote};

fn controller(remote: &Arc<FakeRemote>, registry: &Arc<ScheduleRegistry>, schedule: &str) -> LifecycleController {
    LifecycleController::new(remote.clone(), registry.clone(), schedule_config(schedule, "pump-model"))
}

#[tokio::test]
async fn test_create_stop_delete() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = controller(&remote, &registry, "pump-sched");

    assert_eq!(sched.state().await, ScheduleState::Uncreated);
    assert_eq!(sched.create().await.unwrap(), ScheduleState::Running);
    assert_eq!(registry.owner("pump-model").as_deref(), Some("pump-sched"));

    // Delete straight from RUNNING is refused locally, before any remote call.
    let err = sched.delete().await.unwrap_err();
    assert!(matches!(
        err,
        LookoutError::InvalidState { state: ScheduleState::Running, operation: "delete", .. }
    ));
    assert_eq!(remote.count("delete"), 0);

    assert_eq!(sched.stop().await.unwrap(), ScheduleState::Stopped);
    assert_eq!(sched.delete().await.unwrap(), ScheduleState::Deleted);
    assert!(registry.owner("pump-model").is_none());
    assert_eq!(remote.calls(), vec!["create", "stop", "delete"]);
}

#[tokio::test]
async fn test_second_create_for_same_model_fails() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let first = controller(&remote, &registry, "pump-sched");
    let second = controller(&remote, &registry, "pump-sched-2");

    first.create().await.unwrap();

    let err = second.create().await.unwrap_err();
    match err {
        LookoutError::AlreadyExists { model, existing } => {
            assert_eq!(model, "pump-model");
            assert_eq!(existing, "pump-sched");
        }
        other => panic!("expected AlreadyExists, got {other}"),
    }
    // Same controller again is also a duplicate.
    assert!(matches!(first.create().await, Err(LookoutError::AlreadyExists { .. })));
    assert_eq!(remote.count("create"), 1);
    assert_eq!(second.state().await, ScheduleState::Uncreated);
}

#[tokio::test]
async fn test_model_is_free_again_after_delete() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let first = controller(&remote, &registry, "pump-sched");
    let second = controller(&remote, &registry, "pump-sched-2");

    first.create().await.unwrap();
    first.stop().await.unwrap();
    first.delete().await.unwrap();

    assert_eq!(second.create().await.unwrap(), ScheduleState::Running);
    // A deleted schedule is terminal.
    assert!(matches!(first.create().await, Err(LookoutError::InvalidState { .. })));
}

#[tokio::test]
async fn test_stop_start_cycle() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = controller(&remote, &registry, "pump-sched");

    assert!(matches!(sched.stop().await, Err(LookoutError::InvalidState { .. })));
    assert!(matches!(sched.start().await, Err(LookoutError::InvalidState { .. })));

    sched.create().await.unwrap();
    assert!(matches!(sched.start().await, Err(LookoutError::InvalidState { .. })));
    sched.stop().await.unwrap();
    assert_eq!(sched.start().await.unwrap(), ScheduleState::Running);
    assert_eq!(sched.ensure_stopped().await.unwrap(), ScheduleState::Stopped);
    assert_eq!(sched.ensure_stopped().await.unwrap(), ScheduleState::Stopped);
    assert_eq!(remote.count("stop"), 2);
}

#[tokio::test]
async fn test_transport_failure_leaves_state_unchanged() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = controller(&remote, &registry, "pump-sched");

    remote.fail_next_lifecycle(RemoteError::Transport("connection reset".into()));
    let err = sched.create().await.unwrap_err();
    assert!(matches!(err, LookoutError::TransportFailure { operation: "CreateSchedule", .. }));
    assert!(err.to_string().contains("pump-sched"));
    assert_eq!(sched.state().await, ScheduleState::Uncreated);
    assert!(registry.owner("pump-model").is_none());

    sched.create().await.unwrap();
    remote.fail_next_lifecycle(RemoteError::Transport("timeout".into()));
    assert!(sched.stop().await.is_err());
    assert_eq!(sched.state().await, ScheduleState::Running);
}

#[tokio::test]
async fn test_remote_conflicts_map_to_lifecycle_errors() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = controller(&remote, &registry, "pump-sched");

    remote.fail_next_lifecycle(RemoteError::Conflict("model already has a scheduler".into()));
    assert!(matches!(sched.create().await, Err(LookoutError::AlreadyExists { .. })));
    assert!(registry.owner("pump-model").is_none());

    sched.create().await.unwrap();
    sched.stop().await.unwrap();
    remote.fail_next_lifecycle(RemoteError::Conflict("scheduler is still stopping".into()));
    let err = sched.delete().await.unwrap_err();
    assert!(matches!(err, LookoutError::StateConflict { operation: "delete", .. }));
    assert!(err.to_string().contains("scheduler is still stopping"));
    assert!(!err.to_string().contains("while"));
    assert_eq!(sched.state().await, ScheduleState::Stopped);
}

#[tokio::test]
async fn test_ensure_stopped_accepts_remotely_stopped_schedule() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = LifecycleController::attach(
        remote.clone(),
        registry.clone(),
        schedule_config("pump-sched", "pump-model"),
        ScheduleState::Running,
    )
    .unwrap();

    remote.fail_next_lifecycle(RemoteError::Conflict("scheduler is already stopped".into()));
    assert_eq!(sched.ensure_stopped().await.unwrap(), ScheduleState::Stopped);
    assert_eq!(sched.state().await, ScheduleState::Stopped);

    assert_eq!(sched.delete().await.unwrap(), ScheduleState::Deleted);
    assert_eq!(remote.calls(), vec!["stop", "delete"]);
}

#[tokio::test]
async fn test_ensure_stopped_surfaces_other_failures() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = controller(&remote, &registry, "pump-sched");
    sched.create().await.unwrap();

    remote.fail_next_lifecycle(RemoteError::Transport("connection reset".into()));
    assert!(matches!(
        sched.ensure_stopped().await,
        Err(LookoutError::TransportFailure { operation: "StopSchedule", .. })
    ));
    assert_eq!(sched.state().await, ScheduleState::Running);
}

#[tokio::test]
async fn test_remote_validation_is_configuration_error() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = controller(&remote, &registry, "pump-sched");

    remote.fail_next_lifecycle(RemoteError::Validation(
        "DataUploadFrequency must be a multiple of the sampling rate".into(),
    ));
    assert!(matches!(sched.create().await, Err(LookoutError::InvalidConfiguration { .. })));
    assert_eq!(sched.state().await, ScheduleState::Uncreated);
}

#[tokio::test]
async fn test_attach_adopts_known_state() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = LifecycleController::attach(
        remote.clone(),
        registry.clone(),
        schedule_config("pump-sched", "pump-model"),
        ScheduleState::Running,
    )
    .unwrap();
    assert_eq!(registry.owner("pump-model").as_deref(), Some("pump-sched"));

    let other = LifecycleController::attach(
        remote.clone(),
        registry.clone(),
        schedule_config("pump-sched-2", "pump-model"),
        ScheduleState::Stopped,
    );
    assert!(matches!(other, Err(LookoutError::AlreadyExists { .. })));

    sched.stop().await.unwrap();
    sched.delete().await.unwrap();
    assert_eq!(remote.calls(), vec!["stop", "delete"]);
}

#[tokio::test]
async fn test_concurrent_transitions_are_serialised() {
    let remote = FakeRemote::new();
    let registry = Arc::new(ScheduleRegistry::new());
    let sched = Arc::new(controller(&remote, &registry, "pump-sched"));
    sched.create().await.unwrap();

    let a = tokio::spawn({
        let sched = sched.clone();
        async move { sched.stop().await }
    });
    let b = tokio::spawn({
        let sched = sched.clone();
        async move { sched.stop().await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(remote.count("stop"), 1);
    assert_eq!(sched.state().await, ScheduleState::Stopped);
}
