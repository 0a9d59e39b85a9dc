// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hand-written fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use duplex_core::domain::command::{FileChange, FileWriteMode, NewProject};
use duplex_core::domain::core::{CoreClient, CoreClientError, CoreId, PromotionRequest};
use duplex_core::domain::feature::{Feature, TestSpec, TestStatus};
use duplex_core::domain::judge::{TestOracle, Verdict};
use duplex_core::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider};
use duplex_core::domain::probe::{HealthProbe, ProbeOutcome};
use duplex_core::domain::process::{
    EnvironmentDriver, EnvironmentError, ProcessError, ProcessExecutor, ProcessOutput, ENVIRONMENT_FILE,
};
use duplex_core::domain::runtime::{ContainerInfo, ContainerRuntime, InstanceId, RunSpec, RuntimeError};
use duplex_core::domain::source_control::{SourceControl, SourceControlError};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub fn container(name: &str, state: &str) -> ContainerInfo {
    ContainerInfo {
        id: format!("id-{}", name),
        name: name.to_string(),
        state: state.to_string(),
        image: format!("{}:latest", name),
        health: "unknown".to_string(),
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// In-memory container engine. Containers are keyed by name; `run` uses the
/// requested name as the instance id.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<BTreeMap<String, ContainerInfo>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    specs: Mutex<Vec<RunSpec>>,
    fail_run: Mutex<bool>,
    unavailable: Mutex<bool>,
}

impl FakeRuntime {
    pub fn with(containers: &[(&str, &str)]) -> Self {
        let runtime = Self::default();
        {
            let mut map = runtime.containers.try_lock().expect("fresh runtime");
            for (name, state) in containers {
                map.insert(name.to_string(), container(name, state));
            }
        }
        runtime
    }

    pub async fn state_of(&self, name: &str) -> Option<String> {
        self.containers.lock().await.get(name).map(|c| c.state.clone())
    }

    pub async fn set_state(&self, name: &str, state: &str) {
        self.containers
            .lock()
            .await
            .insert(name.to_string(), container(name, state));
    }

    /// Simulate the process inside `name` exiting on its own.
    pub async fn exit(&self, name: &str) {
        if let Some(c) = self.containers.lock().await.get_mut(name) {
            c.state = "exited".to_string();
        }
    }

    pub async fn fail_operations_on(&self, name: &str) {
        self.failing.lock().await.insert(name.to_string());
    }

    pub async fn heal(&self, name: &str) {
        self.failing.lock().await.remove(name);
    }

    pub async fn fail_run(&self) {
        *self.fail_run.lock().await = true;
    }

    pub async fn go_down(&self) {
        *self.unavailable.lock().await = true;
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn specs(&self) -> Vec<RunSpec> {
        self.specs.lock().await.clone()
    }

    async fn record(&self, call: String) -> Result<(), RuntimeError> {
        let name = call.split(':').nth(1).unwrap_or_default().to_string();
        self.calls.lock().await.push(call);
        if self.failing.lock().await.contains(&name) {
            return Err(RuntimeError::OperationFailed(format!("{} is wedged", name)));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>, RuntimeError> {
        if *self.unavailable.lock().await {
            return Err(RuntimeError::Unavailable("engine socket closed".to_string()));
        }
        Ok(self
            .containers
            .lock()
            .await
            .values()
            .filter(|c| all || c.is_running())
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        self.containers
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("start:{}", name)).await?;
        match self.containers.lock().await.get_mut(name) {
            Some(c) => {
                c.state = "running".to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(name.to_string())),
        }
    }

    async fn stop(&self, name: &str, _grace: Duration) -> Result<(), RuntimeError> {
        self.record(format!("stop:{}", name)).await?;
        match self.containers.lock().await.get_mut(name) {
            Some(c) => {
                c.state = "exited".to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(name.to_string())),
        }
    }

    async fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("restart:{}", name)).await?;
        match self.containers.lock().await.get_mut(name) {
            Some(c) => {
                c.state = "running".to_string();
                Ok(())
            }
            None => Err(RuntimeError::NotFound(name.to_string())),
        }
    }

    async fn logs(&self, name: &str, _tail: Option<usize>) -> Result<String, RuntimeError> {
        if self.containers.lock().await.contains_key(name) {
            Ok(format!("output of {}\n", name))
        } else {
            Err(RuntimeError::NotFound(name.to_string()))
        }
    }

    async fn run(&self, spec: RunSpec) -> Result<InstanceId, RuntimeError> {
        self.calls.lock().await.push(format!("run:{}", spec.name));
        if *self.fail_run.lock().await {
            return Err(RuntimeError::SpawnFailed("image not found".to_string()));
        }
        let mut info = container(&spec.name, "running");
        info.image = spec.image.clone();
        self.containers.lock().await.insert(spec.name.clone(), info);
        let id = InstanceId::new(spec.name.clone());
        self.specs.lock().await.push(spec);
        Ok(id)
    }

    async fn wait(&self, id: &InstanceId) -> Result<i64, RuntimeError> {
        loop {
            match self.containers.lock().await.get(id.as_str()) {
                None => return Err(RuntimeError::NotFound(id.as_str().to_string())),
                Some(c) if !c.is_running() => return Ok(0),
                Some(_) => {}
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn remove(&self, id: &InstanceId) -> Result<(), RuntimeError> {
        self.calls.lock().await.push(format!("remove:{}", id.as_str()));
        match self.containers.lock().await.remove(id.as_str()) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::NotFound(id.as_str().to_string())),
        }
    }
}

/// Engine whose `stop` returns only some time after the container has
/// exited, the way docker reports a graceful stop.
pub struct LaggingStop {
    pub inner: std::sync::Arc<FakeRuntime>,
    pub lag: Duration,
}

#[async_trait]
impl ContainerRuntime for LaggingStop {
    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>, RuntimeError> {
        self.inner.list(all).await
    }

    async fn get(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        self.inner.get(name).await
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.inner.start(name).await
    }

    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError> {
        self.inner.stop(name, grace).await?;
        tokio::time::sleep(self.lag).await;
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.inner.restart(name).await
    }

    async fn logs(&self, name: &str, tail: Option<usize>) -> Result<String, RuntimeError> {
        self.inner.logs(name, tail).await
    }

    async fn run(&self, spec: RunSpec) -> Result<InstanceId, RuntimeError> {
        self.inner.run(spec).await
    }

    async fn wait(&self, id: &InstanceId) -> Result<i64, RuntimeError> {
        self.inner.wait(id).await
    }

    async fn remove(&self, id: &InstanceId) -> Result<(), RuntimeError> {
        self.inner.remove(id).await
    }
}

/// Environment driver that records calls and can refuse to come up.
#[derive(Default)]
pub struct FakeEnvironment {
    pub fail_up: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeEnvironment {
    pub fn failing() -> Self {
        Self {
            fail_up: true,
            ..Self::default()
        }
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl EnvironmentDriver for FakeEnvironment {
    async fn up(&self, dir: &Path) -> Result<ProcessOutput, EnvironmentError> {
        let defined = dir.join(ENVIRONMENT_FILE).exists();
        self.calls.lock().await.push(format!("up:defined={}", defined));
        if self.fail_up {
            return Err(EnvironmentError::NonZeroExit {
                exit_code: 1,
                stderr: "port is already allocated".to_string(),
            });
        }
        Ok(ProcessOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn down(&self, _dir: &Path) -> Result<ProcessOutput, EnvironmentError> {
        self.calls.lock().await.push("down".to_string());
        Ok(ProcessOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// Oracle answering per test name; unknown tests pass.
#[derive(Default)]
pub struct ScriptedOracle {
    verdicts: HashMap<String, TestStatus>,
    judged: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn with(verdicts: &[(&str, TestStatus)]) -> Self {
        Self {
            verdicts: verdicts.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
            judged: Mutex::new(Vec::new()),
        }
    }

    pub async fn judged(&self) -> Vec<String> {
        self.judged.lock().await.clone()
    }
}

#[async_trait]
impl TestOracle for ScriptedOracle {
    async fn judge(&self, _feature: &Feature, test: &TestSpec) -> Verdict {
        self.judged.lock().await.push(test.name.clone());
        let status = self.verdicts.get(&test.name).copied().unwrap_or(TestStatus::Success);
        Verdict {
            status,
            details: json!(format!("{} judged {}", test.name, status)),
            raw: format!(r#"{{"status": "{}"}}"#, status),
        }
    }
}

/// Core client that records every call; cores listed in `unreachable` fail.
#[derive(Default)]
pub struct RecordingCoreClient {
    pub unreachable: HashSet<CoreId>,
    promotions: Mutex<Vec<(CoreId, PromotionRequest)>>,
    reconciles: Mutex<Vec<CoreId>>,
}

impl RecordingCoreClient {
    pub fn unreachable(cores: &[&str]) -> Self {
        Self {
            unreachable: cores.iter().map(|c| CoreId::new(*c)).collect(),
            ..Self::default()
        }
    }

    pub async fn promotions(&self) -> Vec<(CoreId, PromotionRequest)> {
        self.promotions.lock().await.clone()
    }

    pub async fn reconciles(&self) -> Vec<CoreId> {
        self.reconciles.lock().await.clone()
    }

    fn check(&self, core_id: &CoreId) -> Result<(), CoreClientError> {
        if self.unreachable.contains(core_id) {
            return Err(CoreClientError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CoreClient for RecordingCoreClient {
    async fn reconcile(&self, core_id: &CoreId) -> Result<(), CoreClientError> {
        self.reconciles.lock().await.push(core_id.clone());
        self.check(core_id)
    }

    async fn promote(&self, core_id: &CoreId, request: &PromotionRequest) -> Result<(), CoreClientError> {
        self.promotions.lock().await.push((core_id.clone(), request.clone()));
        self.check(core_id)
    }
}

/// Source control that only answers the reachability probe, counting calls.
pub struct FakeSourceControl {
    pub reachable: bool,
    probes: AtomicUsize,
}

impl FakeSourceControl {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable,
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn create_project(&self, _project: &NewProject) -> Result<serde_json::Value, SourceControlError> {
        Ok(json!({ "id": 1 }))
    }

    async fn write_file(
        &self,
        _mode: FileWriteMode,
        _change: &FileChange,
    ) -> Result<serde_json::Value, SourceControlError> {
        Ok(json!({}))
    }

    async fn pipeline_status(
        &self,
        _project_id: &str,
        _pipeline_id: &str,
    ) -> Result<serde_json::Value, SourceControlError> {
        Ok(json!({ "status": "success" }))
    }

    async fn probe(&self) -> Result<(), SourceControlError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(())
        } else {
            Err(SourceControlError::Network("connection refused".to_string()))
        }
    }
}

/// Records command lines; lines containing a `failing` fragment exit 1.
#[derive(Default)]
pub struct ScriptedExecutor {
    pub failing: Vec<String>,
    pub commands: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub async fn commands(&self) -> Vec<String> {
        self.commands.lock().await.clone()
    }
}

#[async_trait]
impl ProcessExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        command_line: &str,
        _working_dir: Option<&Path>,
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        self.commands.lock().await.push(command_line.to_string());
        let failed = self.failing.iter().any(|f| command_line.contains(f.as_str()));
        Ok(ProcessOutput {
            exit_code: if failed { 1 } else { 0 },
            stdout: String::new(),
            stderr: if failed { "script failed".to_string() } else { String::new() },
        })
    }
}

/// Language model that is never reachable.
pub struct OfflineLlm;

#[async_trait]
impl LLMProvider for OfflineLlm {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        Err(LLMError::Network("connection refused".to_string()))
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        Err(LLMError::Network("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Err(LLMError::Network("connection refused".to_string()))
    }
}

pub struct StaticProbe(pub bool);

#[async_trait]
impl HealthProbe for StaticProbe {
    async fn check(&self) -> ProbeOutcome {
        if self.0 {
            ProbeOutcome::healthy()
        } else {
            ProbeOutcome::unhealthy("HTTP 503")
        }
    }
}

pub fn feature_config(name: &str, tests: &[&str]) -> serde_json::Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "component_type": "service",
        "environment": {
            "version": "3",
            "services": { "app": { "image": format!("{}:1.0.0", name) } }
        },
        "tests": tests
            .iter()
            .map(|t| json!({ "name": t, "prompt": format!("Check {}", t) }))
            .collect::<Vec<_>>(),
    })
}
