// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{feature_config, FakeEnvironment, FakeRuntime, FakeSourceControl, OfflineLlm, RecordingCoreClient,
    ScriptedExecutor, ScriptedOracle};
use duplex_core::application::core_manager::{CoreManager, CoreManagerSettings};
use duplex_core::application::dispatcher::CommandDispatcher;
use duplex_core::application::feature_runner::{FeatureRunner, FeatureRunnerSettings};
use duplex_core::application::repository_factory::Repositories;
use duplex_core::application::sandbox_manager::{SandboxManager, SandboxSettings};
use duplex_core::application::supervisor::LoopSupervisor;
use duplex_core::application::system_monitor::{MonitorSettings, SystemMonitor};
use duplex_core::domain::command::Denylist;
use duplex_core::domain::core::CoreId;
use duplex_core::infrastructure::shared_state::{FileCoreStatusStore, FileMarkerStore};
use duplex_core::presentation::api;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn supervisor() -> Arc<LoopSupervisor> {
    Arc::new(LoopSupervisor::new(CancellationToken::new()))
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn core_app(shared: &TempDir) -> Router {
    let core_id = CoreId::new("1");
    let repos = Repositories::in_memory();
    let runtime = Arc::new(FakeRuntime::with(&[("core1_app", "running")]));
    let dispatcher = Arc::new(CommandDispatcher::new(
        core_id.clone(),
        repos.commands.clone(),
        Arc::new(ScriptedExecutor::default()),
        runtime.clone(),
        Arc::new(FakeSourceControl::new(true)),
        Arc::new(OfflineLlm),
        Denylist::default(),
        Duration::from_secs(5),
    ));
    let manager = Arc::new(CoreManager::new(
        CoreManagerSettings {
            core_id,
            container_scope: "core1".to_string(),
            self_container: "core_manager_core1".to_string(),
            health_interval: Duration::from_secs(10),
            marker_staleness: Duration::from_secs(60),
            history_length: 5,
            stop_grace: Duration::from_secs(1),
        },
        runtime,
        Arc::new(FileMarkerStore::new(shared.path())),
        Arc::new(FileCoreStatusStore::new(shared.path())),
        repos.activity.clone(),
        repos.components.clone(),
        dispatcher,
    ));
    api::core::router(api::core::CoreApiState {
        manager,
        supervisor: supervisor(),
    })
}

#[tokio::test]
async fn test_core_health_reports_role_and_timing() {
    let shared = TempDir::new().unwrap();

    let (status, body) = call(core_app(&shared), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["core_id"], "1");
    assert_eq!(body["role"], "STANDBY");
    assert_eq!(body["poll_interval_seconds"], 10);
    assert_eq!(body["marker_staleness_seconds"], 60);
}

#[tokio::test]
async fn test_execute_requires_command_envelope() {
    let shared = TempDir::new().unwrap();

    let (status, body) = call(core_app(&shared), "POST", "/execute", Some(json!({ "command": "ls" }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("command_type"));
}

#[tokio::test]
async fn test_execute_runs_and_records_command() {
    let shared = TempDir::new().unwrap();
    let app = core_app(&shared);

    let (status, body) = call(
        app.clone(),
        "POST",
        "/execute",
        Some(json!({ "command_type": "shell", "command": "echo hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "success");

    let (status, body) = call(app, "GET", "/commands?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commands"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_execute_refuses_forbidden_command() {
    let shared = TempDir::new().unwrap();

    let (status, body) = call(
        core_app(&shared),
        "POST",
        "/execute",
        Some(json!({ "command_type": "shell", "command": "rm -rf /" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden_operation");
}

#[tokio::test]
async fn test_deploy_on_standby_core_conflicts() {
    let shared = TempDir::new().unwrap();
    let request = json!({
        "feature": feature_config("auth", &[]),
        "test_results": [],
    });

    let (status, body) = call(core_app(&shared), "POST", "/feature/deploy", Some(request)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_component_status_is_rejected() {
    let shared = TempDir::new().unwrap();

    let (status, _) = call(
        core_app(&shared),
        "POST",
        "/components/auth/1.0.0/status",
        Some(json!({ "status": "sideways" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sandbox_stop_unknown_is_success() {
    let work = TempDir::new().unwrap();
    let sandboxes = Arc::new(SandboxManager::new(
        SandboxSettings {
            image: "python:3.12-slim".to_string(),
            command: vec!["python".to_string(), "/code/main.py".to_string()],
            work_dir: work.path().join("code"),
            log_dir: work.path().join("logs"),
            network: None,
            stop_timeout: Duration::from_secs(1),
            max_lifetime: Duration::from_secs(60),
        },
        Arc::new(FakeRuntime::default()),
    ));
    let app = api::sandbox::router(api::sandbox::SandboxApiState {
        sandboxes,
        supervisor: supervisor(),
    });

    let (status, body) = call(app.clone(), "POST", "/stop/sandbox_gone_12345678", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["already_gone"], true);

    let (status, body) = call(
        app,
        "POST",
        "/create",
        Some(json!({ "feature_id": "bad/id", "code": "print(1)" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

fn runner_app(work: &TempDir) -> Router {
    let repos = Repositories::in_memory();
    let runner = Arc::new(FeatureRunner::new(
        FeatureRunnerSettings {
            work_dir: work.path().to_path_buf(),
            settle_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(20),
            promotion_timeout: Duration::from_secs(1),
            marker_staleness: Duration::from_secs(60),
        },
        Arc::new(FakeEnvironment::default()),
        Arc::new(ScriptedOracle::default()),
        repos.test_results.clone(),
        repos.activity.clone(),
        Arc::new(FileMarkerStore::new(work.path())),
        Arc::new(RecordingCoreClient::default()),
    ));
    api::runner::router(api::runner::RunnerApiState {
        runner,
        supervisor: supervisor(),
    })
}

#[tokio::test]
async fn test_runner_queues_valid_features_only() {
    let work = TempDir::new().unwrap();
    let app = runner_app(&work);

    let (status, body) = call(app.clone(), "POST", "/test", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(
        app.clone(),
        "POST",
        "/test",
        Some(json!({ "feature_config": feature_config("auth", &["login"]) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_position"], 1);
    assert_eq!(body["message"], "Feature auth queued for testing");

    let (status, body) = call(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_depth"], 1);
}

#[tokio::test]
async fn test_monitor_switch_rejects_unknown_core() {
    let shared = TempDir::new().unwrap();
    let repos = Repositories::in_memory();
    let monitor = Arc::new(SystemMonitor::new(
        MonitorSettings {
            interval: Duration::from_secs(30),
            known_cores: vec![CoreId::new("1"), CoreId::new("2")],
            initial_active_core: None,
        },
        vec![],
        Arc::new(FileMarkerStore::new(shared.path())),
        Arc::new(RecordingCoreClient::default()),
        repos.activity.clone(),
    ));
    let app = api::monitor::router(api::monitor::MonitorApiState {
        monitor,
        supervisor: supervisor(),
    });

    let (status, body) = call(app.clone(), "POST", "/switch_core", Some(json!({ "core_id": "7" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = call(app, "POST", "/switch_core", Some(json!({ "core_id": "2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);
    assert_eq!(body["marker_version"], 1);
}
