// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Command Dispatcher
//!
//! Executes typed commands on behalf of a Core Manager and keeps the audit
//! trail. The lifecycle of one dispatch:
//!
//! 1. Envelope check (`command_type`, `command` present). Failures here are
//!    rejected before anything is written.
//! 2. A `pending` [`CommandRecord`] is inserted.
//! 3. The envelope is parsed into a [`Command`]; process lines are checked
//!    against the [`Denylist`] and never reach the executor on a match.
//! 4. The command runs under the configured timeout.
//! 5. The record is completed exactly once with `success` or `error`.
//!
//! Execution failures (non-zero exit, non-2xx, transport errors) are
//! captured in the record and returned as an `error` outcome; they are not
//! propagated as [`OrchestratorError`].

use crate::domain::command::{
    Command, CommandRecord, CommandStatus, ContainerCommand, Denylist, FileWriteMode,
    InferenceCommand, SourceControlCommand,
};
use crate::domain::core::CoreId;
use crate::domain::error::OrchestratorError;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::process::ProcessExecutor;
use crate::domain::repository::CommandRepository;
use crate::domain::runtime::ContainerRuntime;
use crate::domain::source_control::SourceControl;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Untyped request body of `POST /execute`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchRequest {
    #[serde(default)]
    pub command_type: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl DispatchRequest {
    pub fn new(command_type: &str, command: &str, params: serde_json::Value) -> Self {
        Self {
            command_type: Some(command_type.to_string()),
            command: Some(command.to_string()),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub command_id: crate::domain::command::CommandId,
    pub status: CommandStatus,
    pub result: serde_json::Value,
}

impl DispatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Why a recorded command ended in `error`.
enum Failure {
    /// Rejected before execution; surfaced to the caller as an error.
    Rejected(OrchestratorError),
    /// Ran (or tried to) and failed; captured in the outcome.
    Execution(serde_json::Value),
}

const STOP_GRACE: Duration = Duration::from_secs(10);

pub struct CommandDispatcher {
    core_id: CoreId,
    commands: Arc<dyn CommandRepository>,
    executor: Arc<dyn ProcessExecutor>,
    runtime: Arc<dyn ContainerRuntime>,
    source_control: Arc<dyn SourceControl>,
    llm_provider: Arc<dyn LLMProvider>,
    denylist: Denylist,
    timeout: Duration,
}

impl CommandDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        core_id: CoreId,
        commands: Arc<dyn CommandRepository>,
        executor: Arc<dyn ProcessExecutor>,
        runtime: Arc<dyn ContainerRuntime>,
        source_control: Arc<dyn SourceControl>,
        llm_provider: Arc<dyn LLMProvider>,
        denylist: Denylist,
        timeout: Duration,
    ) -> Self {
        Self {
            core_id,
            commands,
            executor,
            runtime,
            source_control,
            llm_provider,
            denylist,
            timeout,
        }
    }

    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, OrchestratorError> {
        let command_type = request
            .command_type
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| OrchestratorError::Validation("Missing required field: command_type".to_string()))?;
        let command_body = request
            .command
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| OrchestratorError::Validation("Missing required field: command".to_string()))?;

        let record = CommandRecord::pending(
            self.core_id.clone(),
            &command_type,
            &command_body,
            request.params.clone(),
        );
        self.commands.insert(&record).await?;
        let command_id = record.id;

        let outcome = match Command::parse(&command_type, &command_body, &request.params) {
            Ok(command) => self.run(command).await,
            Err(e) => Err(Failure::Rejected(e.into())),
        };

        let (status, payload, rejection) = match outcome {
            Ok(payload) => (CommandStatus::Success, payload, None),
            Err(Failure::Execution(payload)) => (CommandStatus::Error, payload, None),
            Err(Failure::Rejected(err)) => (
                CommandStatus::Error,
                json!({ "error": err.to_string(), "kind": err.kind() }),
                Some(err),
            ),
        };

        if let Err(e) = self.commands.complete(command_id, status, &payload).await {
            error!(command_id = %command_id, "Failed to record command outcome: {}", e);
        }
        metrics::counter!(
            "duplex_commands_total",
            "command_type" => command_type.clone(),
            "status" => status.as_str()
        )
        .increment(1);
        info!(
            command_id = %command_id,
            command_type = %command_type,
            status = status.as_str(),
            "Command dispatched"
        );

        match rejection {
            Some(err) => Err(err),
            None => Ok(DispatchOutcome {
                command_id,
                status,
                result: payload,
            }),
        }
    }

    async fn run(&self, command: Command) -> Result<serde_json::Value, Failure> {
        if let Command::Process { command_line } = &command {
            if let Some(entry) = self.denylist.violation(command_line) {
                warn!(core_id = %self.core_id, denied = entry, "Refusing forbidden command");
                return Err(Failure::Rejected(OrchestratorError::ForbiddenOperation(format!(
                    "command contains forbidden pattern '{}'",
                    entry
                ))));
            }
        }

        let kind = command.kind();
        match tokio::time::timeout(self.timeout, self.execute(command)).await {
            Ok(result) => result.map_err(Failure::Execution),
            Err(_) => Err(Failure::Execution(json!({
                "error": format!("{} command timed out after {}s", kind.as_str(), self.timeout.as_secs())
            }))),
        }
    }

    async fn execute(&self, command: Command) -> Result<serde_json::Value, serde_json::Value> {
        let fail = |e: &dyn std::fmt::Display| json!({ "error": e.to_string() });

        match command {
            Command::Process { command_line } => {
                let output = self
                    .executor
                    .execute(&command_line, None, self.timeout)
                    .await
                    .map_err(|e| fail(&e))?;
                let payload = json!({
                    "stdout": output.stdout,
                    "stderr": output.stderr,
                    "exit_code": output.exit_code,
                });
                if output.success() {
                    Ok(payload)
                } else {
                    Err(payload)
                }
            }
            Command::Container(cmd) => match cmd {
                ContainerCommand::List => {
                    let containers = self.runtime.list(false).await.map_err(|e| fail(&e))?;
                    Ok(json!({ "containers": containers }))
                }
                ContainerCommand::Start { container } => {
                    self.runtime.start(&container).await.map_err(|e| fail(&e))?;
                    Ok(json!({ "container": container, "action": "started" }))
                }
                ContainerCommand::Stop { container } => {
                    self.runtime.stop(&container, STOP_GRACE).await.map_err(|e| fail(&e))?;
                    Ok(json!({ "container": container, "action": "stopped" }))
                }
                ContainerCommand::Restart { container } => {
                    self.runtime.restart(&container).await.map_err(|e| fail(&e))?;
                    Ok(json!({ "container": container, "action": "restarted" }))
                }
                ContainerCommand::Logs { container, tail } => {
                    let logs = self
                        .runtime
                        .logs(&container, Some(tail))
                        .await
                        .map_err(|e| fail(&e))?;
                    Ok(json!({ "container": container, "logs": logs }))
                }
            },
            Command::SourceControl(cmd) => {
                let result = match &cmd {
                    SourceControlCommand::CreateProject(project) => {
                        self.source_control.create_project(project).await
                    }
                    SourceControlCommand::WriteFile { mode, change } => {
                        self.source_control.write_file(mode.clone(), change).await
                    }
                    SourceControlCommand::GetPipeline { project_id, pipeline_id } => {
                        self.source_control.pipeline_status(project_id, pipeline_id).await
                    }
                };
                let action = match &cmd {
                    SourceControlCommand::CreateProject(_) => "create_project",
                    SourceControlCommand::WriteFile { mode: FileWriteMode::Create, .. } => "create_file",
                    SourceControlCommand::WriteFile { mode: FileWriteMode::Update, .. } => "update_file",
                    SourceControlCommand::GetPipeline { .. } => "get_pipeline",
                };
                result
                    .map(|response| json!({ "action": action, "response": response }))
                    .map_err(|e| fail(&e))
            }
            Command::Inference(cmd) => match cmd {
                InferenceCommand::Generate { prompt, model } => {
                    let options = GenerationOptions {
                        model,
                        ..GenerationOptions::default()
                    };
                    let response = self
                        .llm_provider
                        .generate(&prompt, &options)
                        .await
                        .map_err(|e| fail(&e))?;
                    Ok(json!({ "response": response.text, "model": response.model }))
                }
                InferenceCommand::ListModels => {
                    let models = self.llm_provider.list_models().await.map_err(|e| fail(&e))?;
                    Ok(json!({ "models": models }))
                }
            },
        }
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<CommandRecord>, OrchestratorError> {
        Ok(self.commands.find_recent(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::{FileChange, NewProject};
    use crate::domain::llm::{GenerationResponse, LLMError, TokenUsage};
    use crate::domain::process::{ProcessError, ProcessOutput};
    use crate::domain::runtime::{ContainerInfo, InstanceId, RunSpec, RuntimeError};
    use crate::domain::source_control::SourceControlError;
    use crate::infrastructure::repositories::InMemoryCommandRepository;
    use async_trait::async_trait;
    use std::path::Path;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<String>>,
        exit_code: i32,
    }

    #[async_trait]
    impl ProcessExecutor for RecordingExecutor {
        async fn execute(
            &self,
            command_line: &str,
            _working_dir: Option<&Path>,
            _timeout: Duration,
        ) -> Result<ProcessOutput, ProcessError> {
            self.calls.lock().await.push(command_line.to_string());
            Ok(ProcessOutput {
                exit_code: self.exit_code,
                stdout: "out".to_string(),
                stderr: if self.exit_code == 0 { String::new() } else { "boom".to_string() },
            })
        }
    }

    struct MissingRuntime;

    #[async_trait]
    impl ContainerRuntime for MissingRuntime {
        async fn list(&self, _all: bool) -> Result<Vec<ContainerInfo>, RuntimeError> {
            Ok(vec![])
        }
        async fn get(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
            Err(RuntimeError::NotFound(name.to_string()))
        }
        async fn start(&self, name: &str) -> Result<(), RuntimeError> {
            Err(RuntimeError::NotFound(name.to_string()))
        }
        async fn stop(&self, name: &str, _grace: Duration) -> Result<(), RuntimeError> {
            Err(RuntimeError::NotFound(name.to_string()))
        }
        async fn restart(&self, name: &str) -> Result<(), RuntimeError> {
            Err(RuntimeError::NotFound(name.to_string()))
        }
        async fn logs(&self, name: &str, _tail: Option<usize>) -> Result<String, RuntimeError> {
            Err(RuntimeError::NotFound(name.to_string()))
        }
        async fn run(&self, _spec: RunSpec) -> Result<InstanceId, RuntimeError> {
            Err(RuntimeError::Unavailable("no engine".to_string()))
        }
        async fn wait(&self, _id: &InstanceId) -> Result<i64, RuntimeError> {
            Ok(0)
        }
        async fn remove(&self, _id: &InstanceId) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    struct UnreachableSourceControl;

    #[async_trait]
    impl SourceControl for UnreachableSourceControl {
        async fn create_project(&self, _p: &NewProject) -> Result<serde_json::Value, SourceControlError> {
            Err(SourceControlError::Api { status: 500, body: "down".to_string() })
        }
        async fn write_file(
            &self,
            _mode: FileWriteMode,
            _change: &FileChange,
        ) -> Result<serde_json::Value, SourceControlError> {
            Err(SourceControlError::Timeout)
        }
        async fn pipeline_status(&self, _p: &str, _id: &str) -> Result<serde_json::Value, SourceControlError> {
            Ok(json!({"status": "passed"}))
        }
        async fn probe(&self) -> Result<(), SourceControlError> {
            Ok(())
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LLMProvider for EchoLlm {
        async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            Ok(GenerationResponse {
                text: prompt.to_uppercase(),
                model: options.model.clone().unwrap_or_else(|| "llama3".to_string()),
                usage: TokenUsage::default(),
            })
        }
        async fn list_models(&self) -> Result<Vec<String>, LLMError> {
            Ok(vec!["llama3".to_string()])
        }
        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    fn dispatcher(executor: Arc<RecordingExecutor>) -> (CommandDispatcher, Arc<InMemoryCommandRepository>) {
        let repo = Arc::new(InMemoryCommandRepository::new());
        let d = CommandDispatcher::new(
            CoreId::new("1"),
            repo.clone(),
            executor,
            Arc::new(MissingRuntime),
            Arc::new(UnreachableSourceControl),
            Arc::new(EchoLlm),
            Denylist::default(),
            Duration::from_secs(5),
        );
        (d, repo)
    }

    #[tokio::test]
    async fn test_denylisted_command_never_executes() {
        let executor = Arc::new(RecordingExecutor::default());
        let (d, repo) = dispatcher(executor.clone());

        let result = d
            .dispatch(DispatchRequest::new("shell", "rm -rf /data", json!({})))
            .await;
        assert!(matches!(result, Err(OrchestratorError::ForbiddenOperation(_))));
        assert!(executor.calls.lock().await.is_empty());

        let records = repo.find_recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].result_status, CommandStatus::Error);
    }

    #[tokio::test]
    async fn test_missing_envelope_writes_no_record() {
        let (d, repo) = dispatcher(Arc::new(RecordingExecutor::default()));
        let result = d
            .dispatch(DispatchRequest {
                command_type: Some("shell".to_string()),
                command: None,
                params: json!({}),
            })
            .await;
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
        assert!(repo.find_recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_recorded_as_error() {
        let (d, repo) = dispatcher(Arc::new(RecordingExecutor::default()));
        let result = d.dispatch(DispatchRequest::new("ftp", "get", json!({}))).await;
        assert!(matches!(result, Err(OrchestratorError::Validation(_))));
        assert_eq!(repo.find_recent(10).await.unwrap()[0].result_status, CommandStatus::Error);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_captured_not_propagated() {
        let executor = Arc::new(RecordingExecutor {
            exit_code: 2,
            ..Default::default()
        });
        let (d, repo) = dispatcher(executor);
        let outcome = d.dispatch(DispatchRequest::new("shell", "false", json!({}))).await.unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.result["exit_code"], 2);
        assert_eq!(outcome.result["stderr"], "boom");

        let stored = repo.find_by_id(outcome.command_id).await.unwrap().unwrap();
        assert_eq!(stored.result_status, CommandStatus::Error);
        assert_eq!(stored.result_payload.unwrap()["exit_code"], 2);
    }

    #[tokio::test]
    async fn test_adapter_errors_become_error_outcomes() {
        let (d, _repo) = dispatcher(Arc::new(RecordingExecutor::default()));

        let docker = d
            .dispatch(DispatchRequest::new("docker", "restart", json!({"container": "ghost"})))
            .await
            .unwrap();
        assert_eq!(docker.status, CommandStatus::Error);
        assert!(docker.result["error"].as_str().unwrap().contains("ghost"));

        let gitlab = d
            .dispatch(DispatchRequest::new("gitlab", "create_project", json!({"name": "demo"})))
            .await
            .unwrap();
        assert_eq!(gitlab.status, CommandStatus::Error);
        assert!(gitlab.result["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_successful_inference_and_pipeline() {
        let (d, repo) = dispatcher(Arc::new(RecordingExecutor::default()));

        let generated = d
            .dispatch(DispatchRequest::new("ollama", "generate", json!({"prompt": "hi"})))
            .await
            .unwrap();
        assert!(generated.succeeded());
        assert_eq!(generated.result["response"], "HI");

        let pipeline = d
            .dispatch(DispatchRequest::new(
                "gitlab",
                "get_pipeline",
                json!({"project_id": 7, "pipeline_id": 42}),
            ))
            .await
            .unwrap();
        assert!(pipeline.succeeded());
        assert_eq!(pipeline.result["response"]["status"], "passed");

        let history = d.history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.result_status == CommandStatus::Success));
        assert_eq!(repo.find_recent(1).await.unwrap()[0].command_type, "gitlab");
    }
}
