// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dispatched Commands and their Audit Records
//!
//! A command arrives as an untyped envelope (`command_type`, `command`,
//! `params`) and is parsed into a typed [`Command`] before anything runs.
//! Every dispatch produces exactly one [`CommandRecord`] whose
//! `result_status` moves from `pending` to a terminal value once.

use crate::domain::core::CoreId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub Uuid);

impl CommandId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    #[serde(rename = "shell")]
    ProcessExecution,
    #[serde(rename = "docker")]
    ContainerControl,
    #[serde(rename = "gitlab")]
    SourceControl,
    #[serde(rename = "ollama")]
    ModelInference,
}

impl CommandKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shell" | "process" => Some(CommandKind::ProcessExecution),
            "docker" | "container" => Some(CommandKind::ContainerControl),
            "gitlab" | "source_control" => Some(CommandKind::SourceControl),
            "ollama" | "inference" => Some(CommandKind::ModelInference),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::ProcessExecution => "shell",
            CommandKind::ContainerControl => "docker",
            CommandKind::SourceControl => "gitlab",
            CommandKind::ModelInference => "ollama",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerCommand {
    List,
    Start { container: String },
    Stop { container: String },
    Restart { container: String },
    Logs { container: String, tail: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileWriteMode {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub project_id: String,
    pub file_path: String,
    pub content: String,
    pub branch: String,
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceControlCommand {
    CreateProject(NewProject),
    WriteFile { mode: FileWriteMode, change: FileChange },
    GetPipeline { project_id: String, pipeline_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceCommand {
    Generate { prompt: String, model: Option<String> },
    ListModels,
}

/// Schema-validated command, ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Process { command_line: String },
    Container(ContainerCommand),
    SourceControl(SourceControlCommand),
    Inference(InferenceCommand),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandValidationError {
    #[error("Unknown command type: {0}")]
    UnknownKind(String),
    #[error("Unknown {kind} command: {command}")]
    UnknownCommand { kind: &'static str, command: String },
    #[error("Missing required parameter: {0}")]
    MissingParam(&'static str),
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },
}

const DEFAULT_LOG_TAIL: usize = 100;

impl Command {
    pub fn parse(
        command_type: &str,
        command: &str,
        params: &serde_json::Value,
    ) -> Result<Self, CommandValidationError> {
        let kind = CommandKind::parse(command_type)
            .ok_or_else(|| CommandValidationError::UnknownKind(command_type.to_string()))?;
        if !params.is_null() && !params.is_object() {
            return Err(CommandValidationError::InvalidParam {
                name: "params",
                reason: "must be an object".to_string(),
            });
        }
        let p = Params(params);

        match kind {
            CommandKind::ProcessExecution => {
                if command.trim().is_empty() {
                    return Err(CommandValidationError::MissingParam("command"));
                }
                Ok(Command::Process { command_line: command.to_string() })
            }
            CommandKind::ContainerControl => {
                let cmd = match command {
                    "ps" | "list" => ContainerCommand::List,
                    "start" => ContainerCommand::Start { container: p.required("container")? },
                    "stop" => ContainerCommand::Stop { container: p.required("container")? },
                    "restart" => ContainerCommand::Restart { container: p.required("container")? },
                    "logs" => ContainerCommand::Logs {
                        container: p.required("container")?,
                        tail: p.usize_or("tail", DEFAULT_LOG_TAIL)?,
                    },
                    other => {
                        return Err(CommandValidationError::UnknownCommand {
                            kind: kind.as_str(),
                            command: other.to_string(),
                        })
                    }
                };
                Ok(Command::Container(cmd))
            }
            CommandKind::SourceControl => {
                let cmd = match command {
                    "create_project" => SourceControlCommand::CreateProject(NewProject {
                        name: p.required("name")?,
                        description: p.optional("description").unwrap_or_default(),
                        visibility: p.optional("visibility").unwrap_or_else(|| "private".to_string()),
                    }),
                    "create_file" | "update_file" => SourceControlCommand::WriteFile {
                        mode: if command == "create_file" {
                            FileWriteMode::Create
                        } else {
                            FileWriteMode::Update
                        },
                        change: FileChange {
                            project_id: p.required("project_id")?,
                            file_path: p.required("file_path")?,
                            content: p.required("content")?,
                            branch: p.optional("branch").unwrap_or_else(|| "main".to_string()),
                            commit_message: p
                                .optional("commit_message")
                                .unwrap_or_else(|| format!("{} via duplex", command.replace('_', " "))),
                        },
                    },
                    "get_pipeline" => SourceControlCommand::GetPipeline {
                        project_id: p.required("project_id")?,
                        pipeline_id: p.required("pipeline_id")?,
                    },
                    other => {
                        return Err(CommandValidationError::UnknownCommand {
                            kind: kind.as_str(),
                            command: other.to_string(),
                        })
                    }
                };
                Ok(Command::SourceControl(cmd))
            }
            CommandKind::ModelInference => {
                let cmd = match command {
                    "generate" => InferenceCommand::Generate {
                        prompt: p.required("prompt")?,
                        model: p.optional("model"),
                    },
                    "list_models" => InferenceCommand::ListModels,
                    other => {
                        return Err(CommandValidationError::UnknownCommand {
                            kind: kind.as_str(),
                            command: other.to_string(),
                        })
                    }
                };
                Ok(Command::Inference(cmd))
            }
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Process { .. } => CommandKind::ProcessExecution,
            Command::Container(_) => CommandKind::ContainerControl,
            Command::SourceControl(_) => CommandKind::SourceControl,
            Command::Inference(_) => CommandKind::ModelInference,
        }
    }
}

struct Params<'a>(&'a serde_json::Value);

impl Params<'_> {
    /// Strings are taken as-is; numbers are accepted for id-like fields.
    fn optional(&self, name: &str) -> Option<String> {
        match self.0.get(name)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn required(&self, name: &'static str) -> Result<String, CommandValidationError> {
        self.optional(name).ok_or(CommandValidationError::MissingParam(name))
    }

    fn usize_or(&self, name: &'static str, default: usize) -> Result<usize, CommandValidationError> {
        match self.0.get(name) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(v) => v
                .as_u64()
                .map(|n| n as usize)
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                .ok_or_else(|| CommandValidationError::InvalidParam {
                    name,
                    reason: format!("expected a non-negative integer, got {}", v),
                }),
        }
    }
}

/// Substrings that make a process-execution command forbidden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denylist {
    entries: Vec<String>,
}

impl Denylist {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// First denylist entry contained in `command_line`, if any.
    pub fn violation(&self, command_line: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| !entry.is_empty() && command_line.contains(entry.as_str()))
            .map(String::as_str)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self::new(
            ["rm -rf", "mkfs", "dd if=", ":(){ :|:& };:"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Success,
    Error,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Success => "success",
            CommandStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommandStatus::Pending),
            "success" => Some(CommandStatus::Success),
            "error" => Some(CommandStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: CommandId,
    pub issuing_core: CoreId,
    pub command_type: String,
    pub command_body: String,
    pub parameters: serde_json::Value,
    pub result_status: CommandStatus,
    pub result_payload: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl CommandRecord {
    pub fn pending(
        issuing_core: CoreId,
        command_type: &str,
        command_body: &str,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: CommandId::new(),
            issuing_core,
            command_type: command_type.to_string(),
            command_body: command_body.to_string(),
            parameters,
            result_status: CommandStatus::Pending,
            result_payload: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_container_logs_with_default_tail() {
        let cmd = Command::parse("docker", "logs", &json!({"container": "ollama"})).unwrap();
        assert_eq!(
            cmd,
            Command::Container(ContainerCommand::Logs {
                container: "ollama".to_string(),
                tail: 100
            })
        );
    }

    #[test]
    fn test_parse_rejects_missing_params() {
        assert_eq!(
            Command::parse("docker", "start", &json!({})).unwrap_err(),
            CommandValidationError::MissingParam("container")
        );
        assert_eq!(
            Command::parse("gitlab", "create_file", &json!({"project_id": 7, "file_path": "a.py"}))
                .unwrap_err(),
            CommandValidationError::MissingParam("content")
        );
        assert_eq!(
            Command::parse("ollama", "generate", &serde_json::Value::Null).unwrap_err(),
            CommandValidationError::MissingParam("prompt")
        );
    }

    #[test]
    fn test_parse_rejects_unknown_kind_and_command() {
        assert!(matches!(
            Command::parse("kubectl", "apply", &json!({})),
            Err(CommandValidationError::UnknownKind(_))
        ));
        assert!(matches!(
            Command::parse("ollama", "fine_tune", &json!({})),
            Err(CommandValidationError::UnknownCommand { kind: "ollama", .. })
        ));
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        let cmd = Command::parse("gitlab", "get_pipeline", &json!({"project_id": 12, "pipeline_id": "99"}))
            .unwrap();
        assert_eq!(
            cmd,
            Command::SourceControl(SourceControlCommand::GetPipeline {
                project_id: "12".to_string(),
                pipeline_id: "99".to_string()
            })
        );
    }

    #[test]
    fn test_denylist_matches_substrings() {
        let denylist = Denylist::default();
        assert_eq!(denylist.violation("cd /tmp && rm -rf /"), Some("rm -rf"));
        assert_eq!(denylist.violation("dd if=/dev/zero of=/dev/sda"), Some("dd if="));
        assert_eq!(denylist.violation("git add ."), None);
        assert_eq!(Denylist::new(vec![String::new()]).violation("anything"), None);
    }
}
