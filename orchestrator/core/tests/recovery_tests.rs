// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use common::{FakeRuntime, FakeSourceControl, ScriptedExecutor};
use duplex_core::application::recovery::{RecoveryAction, RecoverySettings, RecoverySupervisor};
use duplex_core::domain::archive::SnapshotArchive;
use duplex_core::domain::error::OrchestratorError;
use duplex_core::domain::repository::ActivityRepository;
use duplex_core::infrastructure::repositories::InMemoryActivityRepository;
use duplex_core::infrastructure::snapshot_archive::FileSnapshotArchive;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    recovery: RecoverySupervisor,
    runtime: Arc<FakeRuntime>,
    executor: Arc<ScriptedExecutor>,
    archive: Arc<FileSnapshotArchive>,
    activity: Arc<InMemoryActivityRepository>,
    source_control: Arc<FakeSourceControl>,
    dir: TempDir,
}

fn harness(runtime: FakeRuntime, executor: ScriptedExecutor, source_control_up: bool) -> Harness {
    harness_guarding(runtime, executor, source_control_up, &["gitlab", "postgres"])
}

fn harness_guarding(
    runtime: FakeRuntime,
    executor: ScriptedExecutor,
    source_control_up: bool,
    critical: &[&str],
) -> Harness {
    let source_control = Arc::new(FakeSourceControl::new(source_control_up));
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(runtime);
    let executor = Arc::new(executor);
    let archive = Arc::new(FileSnapshotArchive::new(dir.path()));
    let activity = Arc::new(InMemoryActivityRepository::new());
    let recovery = RecoverySupervisor::new(
        RecoverySettings {
            interval: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(10),
            critical_services: critical.iter().map(|s| s.to_string()).collect(),
            probe_timeout: Duration::from_secs(1),
            backup_command: "backup.sh {target}".to_string(),
            restore_command: "restore.sh {backup}".to_string(),
            service_restore_command: "restore-service.sh {service} {backup}".to_string(),
            backup_interval: Duration::from_secs(3600),
            command_timeout: Duration::from_secs(5),
        },
        runtime.clone(),
        archive.clone(),
        source_control.clone(),
        executor.clone(),
        activity.clone(),
    );
    Harness {
        recovery,
        runtime,
        executor,
        archive,
        activity,
        source_control,
        dir,
    }
}

fn seed_backup(dir: &TempDir, stamp: &str) -> PathBuf {
    let path = dir.path().join(format!("system_backup_{}.tar.gz", stamp));
    std::fs::write(&path, b"backup").unwrap();
    path
}

#[tokio::test]
async fn test_healthy_system_passes_integrity() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "running"), ("postgres", "running")]),
        ScriptedExecutor::default(),
        true,
    );

    let report = h.recovery.run_cycle().await.unwrap();

    assert!(report.integrity.integral);
    assert!(report.integrity.probed_source_control);
    assert_eq!(h.source_control.probes(), 1);
    assert!(report.recoveries.is_empty());
    assert!(h.runtime.calls().await.is_empty());
}

#[tokio::test]
async fn test_exited_critical_service_is_started_and_snapshot_archived() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "exited"), ("postgres", "running")]),
        ScriptedExecutor::default(),
        true,
    );

    let report = h.recovery.run_cycle().await.unwrap();

    assert!(!report.integrity.integral);
    assert!(!report.integrity.probed_source_control);
    assert_eq!(h.source_control.probes(), 0);
    assert_eq!(
        report.integrity.violations,
        vec!["critical service gitlab is not running (exited)".to_string()]
    );
    assert_eq!(report.recoveries.len(), 1);
    assert_eq!(report.recoveries[0].service, "gitlab");
    assert_eq!(report.recoveries[0].action, RecoveryAction::Started);
    assert_eq!(h.runtime.state_of("gitlab").await.as_deref(), Some("running"));

    let snapshot_path = report.snapshot_path.unwrap();
    assert!(snapshot_path.starts_with(h.dir.path()));
    let snapshot = h.archive.load(&snapshot_path).await.unwrap();
    assert_eq!(snapshot.services["gitlab"].running_state, "exited");

    assert!(h.recovery.last_report().is_some());
    let activity = h.activity.find_recent(Some("recovery_supervisor"), 10).await.unwrap();
    assert_eq!(activity[0].action, "repair_service");
    assert_eq!(activity[1].status, "violation");
}

#[tokio::test]
async fn test_wedged_service_is_restarted() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "restarting"), ("postgres", "running")]),
        ScriptedExecutor::default(),
        true,
    );

    let report = h.recovery.run_cycle().await.unwrap();

    assert_eq!(report.recoveries[0].action, RecoveryAction::Restarted);
    assert_eq!(h.runtime.calls().await, vec!["restart:gitlab"]);
}

#[tokio::test]
async fn test_failed_start_falls_back_to_latest_backup() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "exited"), ("postgres", "running")]),
        ScriptedExecutor::default(),
        true,
    );
    h.runtime.fail_operations_on("gitlab").await;
    seed_backup(&h.dir, "20260101_000000_000000");
    let newest = seed_backup(&h.dir, "20260301_000000_000000");

    let report = h.recovery.run_cycle().await.unwrap();

    assert_eq!(
        report.recoveries[0].action,
        RecoveryAction::Restored {
            backup: newest.clone()
        }
    );
    assert_eq!(
        h.executor.commands().await,
        vec![format!("restore-service.sh gitlab {}", newest.display())]
    );
}

#[tokio::test]
async fn test_one_failed_service_does_not_block_others() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "exited"), ("postgres", "exited")]),
        ScriptedExecutor {
            failing: vec!["restore-service.sh gitlab".to_string()],
            ..ScriptedExecutor::default()
        },
        true,
    );
    h.runtime.fail_operations_on("gitlab").await;
    seed_backup(&h.dir, "20260101_000000_000000");

    let report = h.recovery.run_cycle().await.unwrap();

    assert_eq!(report.recoveries.len(), 2);
    assert!(matches!(report.recoveries[0].action, RecoveryAction::Failed { ref reason } if reason.contains("exit code 1")));
    assert_eq!(report.recoveries[1].service, "postgres");
    assert_eq!(report.recoveries[1].action, RecoveryAction::Started);
}

#[tokio::test]
async fn test_missing_critical_service_without_backup_fails() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "running")]),
        ScriptedExecutor::default(),
        true,
    );

    let report = h.recovery.run_cycle().await.unwrap();

    assert_eq!(
        report.integrity.violations,
        vec!["critical service postgres is missing".to_string()]
    );
    assert_eq!(report.recoveries.len(), 1);
    assert_eq!(report.recoveries[0].service, "postgres");
    assert_eq!(
        report.recoveries[0].action,
        RecoveryAction::Failed {
            reason: "no backup available".to_string()
        }
    );
    assert!(h.executor.commands().await.is_empty());
}

#[tokio::test]
async fn test_source_control_not_probed_while_a_critical_service_is_missing() {
    let h = harness_guarding(
        FakeRuntime::with(&[("gitlab", "running")]),
        ScriptedExecutor::default(),
        true,
        &["gitlab", "ollama"],
    );

    let report = h.recovery.run_cycle().await.unwrap();

    assert!(!report.integrity.integral);
    assert!(!report.integrity.probed_source_control);
    assert_eq!(h.source_control.probes(), 0);
    assert_eq!(
        report.integrity.violations,
        vec!["critical service ollama is missing".to_string()]
    );
}

#[tokio::test]
async fn test_unreachable_source_control_is_a_violation() {
    let h = harness(
        FakeRuntime::with(&[("gitlab", "running"), ("postgres", "running")]),
        ScriptedExecutor::default(),
        false,
    );

    let report = h.recovery.run_cycle().await.unwrap();

    assert!(!report.integrity.integral);
    assert!(report.integrity.probed_source_control);
    assert_eq!(report.integrity.violations.len(), 1);
    assert!(report.integrity.violations[0].starts_with("source control unreachable"));
    assert!(report.recoveries.is_empty());
}

#[tokio::test]
async fn test_runtime_outage_fails_the_cycle() {
    let h = harness(FakeRuntime::default(), ScriptedExecutor::default(), true);
    h.runtime.go_down().await;

    let err = h.recovery.run_cycle().await.unwrap_err();

    assert!(matches!(err, OrchestratorError::DependencyUnavailable { .. }));
    assert!(h.recovery.last_report().is_none());
}

#[tokio::test]
async fn test_backup_and_restore_commands() {
    let h = harness(FakeRuntime::default(), ScriptedExecutor::default(), true);

    let target = h.recovery.create_backup().await.unwrap();
    assert!(target.starts_with(h.dir.path()));
    let name = target.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("system_backup_") && name.ends_with(".tar.gz"));
    assert_eq!(
        h.executor.commands().await,
        vec![format!("backup.sh {}", target.display())]
    );

    let missing = h.dir.path().join("system_backup_19700101_000000_000000.tar.gz");
    let err = h.recovery.restore_system(Some(&missing)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));

    // nothing was written by the fake backup command
    let err = h.recovery.restore_system(None).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFound(_)));

    let backup = seed_backup(&h.dir, "20260301_000000_000000");
    let restored = h.recovery.restore_system(None).await.unwrap();
    assert_eq!(restored, backup);
    assert_eq!(
        h.executor.commands().await.last().unwrap(),
        &format!("restore.sh {}", backup.display())
    );
}
