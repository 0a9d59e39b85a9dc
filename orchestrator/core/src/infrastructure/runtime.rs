// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::runtime::{ContainerInfo, ContainerRuntime, InstanceId, RunSpec, RuntimeError};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogsOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::Docker;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client-side timeout applied to every Docker API request.
const DOCKER_TIMEOUT_SECS: u64 = 120;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(socket_path: Option<String>) -> Result<Self, RuntimeError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            Docker::connect_with_unix(&path, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    RuntimeError::Unavailable(format!(
                        "Failed to connect to Docker at {}: {}\n\n\
                         Ensure Docker is running and the socket path is correct.",
                        path, e
                    ))
                })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Unavailable(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Common causes:\n\
                     - Docker daemon not running (check: docker ps)\n\
                     - Permission denied accessing Docker socket\n\n\
                     Try:\n\
                     - Check permissions: ls -la /var/run/docker.sock\n\
                     - Mount the socket into this container",
                    e
                ))
            })?
        };

        Ok(Self { docker })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("Cannot connect to Docker daemon: {}", e)))?;
        Ok(())
    }

    async fn exit_code_if_stopped(&self, id: &str) -> Result<Option<i64>, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(id, e))?;
        let state = inspect.state.unwrap_or_default();
        if state.running.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(state.exit_code.unwrap_or(-1)))
    }
}

fn map_docker_error(name: &str, err: DockerError) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError { status_code: 404, .. } => {
            RuntimeError::NotFound(name.to_string())
        }
        DockerError::DockerResponseServerError { status_code, message } => {
            RuntimeError::OperationFailed(format!("{} (HTTP {}): {}", name, status_code, message))
        }
        DockerError::RequestTimeoutError => {
            RuntimeError::Unavailable(format!("Docker request for {} timed out", name))
        }
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

/// `Up 3 hours (healthy)` -> `healthy`.
fn health_from_status(status: Option<&str>) -> String {
    let Some(status) = status else {
        return "unknown".to_string();
    };
    for health in ["unhealthy", "healthy", "health: starting"] {
        if status.contains(&format!("({})", health)) {
            return health.trim_start_matches("health: ").to_string();
        }
    }
    "unknown".to_string()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list(&self, all: bool) -> Result<Vec<ContainerInfo>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_docker_error("list", e))?;

        Ok(summaries
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                ContainerInfo {
                    id: c.id.clone().unwrap_or_default(),
                    name,
                    state: c.state.clone().unwrap_or_else(|| "unknown".to_string()),
                    image: c.image.clone().unwrap_or_else(|| "unknown".to_string()),
                    health: health_from_status(c.status.as_deref()),
                }
            })
            .collect())
    }

    async fn get(&self, name: &str) -> Result<ContainerInfo, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(name, e))?;

        let state = inspect.state.unwrap_or_default();
        Ok(ContainerInfo {
            id: inspect.id.unwrap_or_default(),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            state: state
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            image: inspect
                .config
                .and_then(|c| c.image)
                .unwrap_or_else(|| "unknown".to_string()),
            health: state
                .health
                .and_then(|h| h.status)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => {}
            // already started
            Err(DockerError::DockerResponseServerError { status_code: 304, .. }) => {}
            Err(e) => return Err(map_docker_error(name, e)),
        }
        info!(container = name, "Started container");
        Ok(())
    }

    async fn stop(&self, name: &str, grace: Duration) -> Result<(), RuntimeError> {
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(name, Some(options)).await {
            Ok(()) => {}
            // already stopped
            Err(DockerError::DockerResponseServerError { status_code: 304, .. }) => {}
            Err(e) => return Err(map_docker_error(name, e)),
        }
        info!(container = name, "Stopped container");
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .restart_container(name, None::<RestartContainerOptions>)
            .await
            .map_err(|e| map_docker_error(name, e))?;
        info!(container = name, "Restarted container");
        Ok(())
    }

    async fn logs(&self, name: &str, tail: Option<usize>) -> Result<String, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail.map(|t| t.to_string()).unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_docker_error(name, e))?;
            output.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
        }
        Ok(output)
    }

    async fn run(&self, spec: RunSpec) -> Result<InstanceId, RuntimeError> {
        let binds = spec
            .mounts
            .iter()
            .map(|m| {
                format!(
                    "{}:{}{}",
                    m.source.display(),
                    m.target,
                    if m.read_only { ":ro" } else { "" }
                )
            })
            .collect::<Vec<_>>();

        let host_config = bollard::service::HostConfig {
            binds: Some(binds),
            network_mode: spec.network.clone(),
            ..Default::default()
        };

        let env_vars: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.command.is_empty() {
                None
            } else {
                Some(spec.command.clone())
            },
            env: Some(env_vars),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let res = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| RuntimeError::SpawnFailed(format!("{}: {}", spec.name, e)))?;

        if let Err(e) = self
            .docker
            .start_container(&res.id, None::<StartContainerOptions<String>>)
            .await
        {
            // do not leak the created-but-never-started container
            let _ = self.remove(&InstanceId::new(res.id.clone())).await;
            return Err(RuntimeError::SpawnFailed(format!("Failed to start container: {}", e)));
        }

        for warning in res.warnings {
            warn!(container = %spec.name, "Docker warning: {}", warning);
        }
        info!(container = %spec.name, id = %res.id, image = %spec.image, "Launched container");
        Ok(InstanceId::new(res.id))
    }

    async fn wait(&self, id: &InstanceId) -> Result<i64, RuntimeError> {
        loop {
            let options = WaitContainerOptions {
                condition: "not-running",
            };
            let mut stream = self.docker.wait_container(id.as_str(), Some(options));
            match stream.next().await {
                Some(Ok(response)) => return Ok(response.status_code),
                // bollard reports non-zero exits as an error carrying the code
                Some(Err(DockerError::DockerContainerWaitError { code, .. })) => return Ok(code),
                Some(Err(DockerError::DockerResponseServerError { status_code: 404, .. })) => {
                    return Err(RuntimeError::NotFound(id.as_str().to_string()))
                }
                Some(Err(e)) => {
                    // the request timeout elapsed before the container exited
                    debug!(id = id.as_str(), "Wait interrupted ({}), re-checking state", e);
                }
                None => {}
            }
            if let Some(code) = self.exit_code_if_stopped(id.as_str()).await? {
                return Ok(code);
            }
        }
    }

    async fn remove(&self, id: &InstanceId) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id.as_str(), Some(options))
            .await
            .map_err(|e| map_docker_error(id.as_str(), e))?;

        info!(id = id.as_str(), "Removed container");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_from_status() {
        assert_eq!(health_from_status(Some("Up 2 hours (healthy)")), "healthy");
        assert_eq!(health_from_status(Some("Up 1 minute (unhealthy)")), "unhealthy");
        assert_eq!(health_from_status(Some("Up 3 seconds (health: starting)")), "starting");
        assert_eq!(health_from_status(Some("Exited (0) 5 minutes ago")), "unknown");
        assert_eq!(health_from_status(None), "unknown");
    }

    #[test]
    fn test_not_found_mapping() {
        let err = map_docker_error(
            "ghost",
            DockerError::DockerResponseServerError {
                status_code: 404,
                message: "No such container".to_string(),
            },
        );
        assert!(err.is_not_found());
    }
}
