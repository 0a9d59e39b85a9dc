// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// One manifest configures every duplex process on a host:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - The two cores, their URLs and container scopes
// - Per-component intervals, timeouts and directories
// - External collaborators (container runtime, LLM, source control, database)
// - Network and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "duplex/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "duplex/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    /// The redundant core pair
    #[serde(default = "default_cores")]
    pub cores: Vec<CoreEndpoint>,

    #[serde(default)]
    pub core_manager: CoreManagerConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub source_control: SourceControlConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub feature_runner: FeatureRunnerConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Relational audit store; in-memory repositories when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreEndpoint {
    pub id: String,

    /// Base URL of this core's HTTP surface
    pub url: String,

    /// Substring identifying containers that belong to this core
    pub container_scope: String,

    /// The Core Manager's own container, never stopped on STANDBY
    pub self_container: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreManagerConfig {
    /// Identity of the core run by this process (override: DUPLEX_CORE_ID)
    #[serde(default = "default_core_id")]
    pub core_id: String,

    #[serde(default = "default_health_interval")]
    pub health_interval_seconds: u64,

    /// Markers older than this are treated as unknown
    #[serde(default = "default_marker_staleness")]
    pub marker_staleness_seconds: u64,

    /// Directory both cores and the monitor can read and write
    #[serde(default = "default_shared_dir")]
    pub shared_dir: PathBuf,

    #[serde(default = "default_history_length")]
    pub service_history_length: usize,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// Substrings that make a process-execution command forbidden
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

impl Default for CoreManagerConfig {
    fn default() -> Self {
        Self {
            core_id: default_core_id(),
            health_interval_seconds: default_health_interval(),
            marker_staleness_seconds: default_marker_staleness(),
            shared_dir: default_shared_dir(),
            service_history_length: default_history_length(),
            command_timeout_seconds: default_command_timeout(),
            denylist: default_denylist(),
        }
    }
}

impl CoreManagerConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_seconds)
    }

    pub fn marker_staleness(&self) -> Duration {
        Duration::from_secs(self.marker_staleness_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to Docker socket
    /// Default: local defaults of the Docker client (DOCKER_HOST or /var/run/docker.sock)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Inference endpoint (override: DUPLEX_LLM_ENDPOINT)
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceControlConfig {
    #[serde(default = "default_source_control_url")]
    pub url: String,

    /// API token (supports "env:VAR_NAME"; override: DUPLEX_SOURCE_CONTROL_TOKEN)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for SourceControlConfig {
    fn default() -> Self {
        Self {
            url: default_source_control_url(),
            token: None,
            probe_timeout_seconds: default_probe_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl SourceControlConfig {
    /// Token with `env:VAR` indirection resolved. Missing variables resolve to `None`.
    pub fn resolved_token(&self) -> Option<String> {
        let token = self.token.as_ref()?;
        match token.strip_prefix("env:") {
            Some(var) => std::env::var(var).ok(),
            None => Some(token.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_interval")]
    pub interval_seconds: u64,

    /// Shortened delay before the next cycle after a cycle-level failure
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,

    /// Holds both snapshots and backup artifacts
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    #[serde(default = "default_critical_services")]
    pub critical_services: Vec<String>,

    /// `{target}` is replaced with the new artifact path
    #[serde(default = "default_backup_command")]
    pub backup_command: String,

    /// `{backup}` is replaced with the artifact path
    #[serde(default = "default_restore_command")]
    pub restore_command: String,

    /// `{service}` and `{backup}` are replaced
    #[serde(default = "default_service_restore_command")]
    pub service_restore_command: String,

    #[serde(default = "default_backup_interval")]
    pub backup_interval_seconds: u64,

    #[serde(default = "default_backup_timeout")]
    pub command_timeout_seconds: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_recovery_interval(),
            retry_backoff_seconds: default_retry_backoff(),
            backup_dir: default_backup_dir(),
            critical_services: default_critical_services(),
            backup_command: default_backup_command(),
            restore_command: default_restore_command(),
            service_restore_command: default_service_restore_command(),
            backup_interval_seconds: default_backup_interval(),
            command_timeout_seconds: default_backup_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_image")]
    pub image: String,

    /// Entry command; the code is mounted read-only at /code
    #[serde(default = "default_sandbox_command")]
    pub command: Vec<String>,

    #[serde(default = "default_sandbox_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_sandbox_log_dir")]
    pub log_dir: PathBuf,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,

    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_seconds: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_sandbox_image(),
            command: default_sandbox_command(),
            work_dir: default_sandbox_work_dir(),
            log_dir: default_sandbox_log_dir(),
            network: None,
            stop_timeout_seconds: default_stop_timeout(),
            max_lifetime_seconds: default_max_lifetime(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRunnerConfig {
    #[serde(default = "default_runner_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default = "default_settle_delay")]
    pub settle_delay_seconds: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// e.g. "docker compose" or "docker-compose"
    #[serde(default = "default_compose_command")]
    pub compose_command: String,

    #[serde(default = "default_environment_timeout")]
    pub environment_timeout_seconds: u64,

    #[serde(default = "default_promotion_timeout")]
    pub promotion_timeout_seconds: u64,
}

impl Default for FeatureRunnerConfig {
    fn default() -> Self {
        Self {
            work_dir: default_runner_work_dir(),
            settle_delay_seconds: default_settle_delay(),
            poll_interval_ms: default_poll_interval_ms(),
            compose_command: default_compose_command(),
            environment_timeout_seconds: default_environment_timeout(),
            promotion_timeout_seconds: default_promotion_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,

    /// Core designated on first start when no marker exists yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_active_core: Option<String>,

    #[serde(default)]
    pub components: Vec<MonitoredComponent>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_monitor_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            initial_active_core: None,
            components: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredComponent {
    pub name: String,

    #[serde(flatten)]
    pub probe: ProbeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeKind {
    /// Healthy on any 2xx response
    Http { url: String },
    /// Healthy when the configured database answers `SELECT 1`
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (override: DUPLEX_DATABASE_URL)
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network bind address (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_cores() -> Vec<CoreEndpoint> {
    vec![
        CoreEndpoint {
            id: "1".to_string(),
            url: "http://core1:5000".to_string(),
            container_scope: "core1".to_string(),
            self_container: "core_manager_core1".to_string(),
        },
        CoreEndpoint {
            id: "2".to_string(),
            url: "http://core2:5000".to_string(),
            container_scope: "core2".to_string(),
            self_container: "core_manager_core2".to_string(),
        },
    ]
}

fn default_core_id() -> String {
    "1".to_string()
}

fn default_health_interval() -> u64 {
    30
}

fn default_marker_staleness() -> u64 {
    90
}

fn default_shared_dir() -> PathBuf {
    PathBuf::from("/shared")
}

fn default_history_length() -> usize {
    20
}

fn default_command_timeout() -> u64 {
    60
}

fn default_denylist() -> Vec<String> {
    crate::domain::command::Denylist::default().entries().to_vec()
}

fn default_llm_endpoint() -> String {
    "http://ollama:11434".to_string()
}

fn default_llm_model() -> String {
    "llama3".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_source_control_url() -> String {
    "http://gitlab".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_recovery_interval() -> u64 {
    60
}

fn default_retry_backoff() -> u64 {
    60
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/backups")
}

fn default_critical_services() -> Vec<String> {
    ["gitlab", "ollama", "autonomous-system", "recovery-system"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_backup_command() -> String {
    "/app/scripts/create_backup.sh {target}".to_string()
}

fn default_restore_command() -> String {
    "/app/scripts/restore_system.sh {backup}".to_string()
}

fn default_service_restore_command() -> String {
    "/app/scripts/restore_service.sh {service} {backup}".to_string()
}

fn default_backup_interval() -> u64 {
    3600
}

fn default_backup_timeout() -> u64 {
    600
}

fn default_sandbox_image() -> String {
    "python:3.11-slim".to_string()
}

fn default_sandbox_command() -> Vec<String> {
    vec!["python".to_string(), "/code/main.py".to_string()]
}

fn default_sandbox_work_dir() -> PathBuf {
    PathBuf::from("/tmp/duplex/sandboxes")
}

fn default_sandbox_log_dir() -> PathBuf {
    PathBuf::from("/var/log/duplex/sandboxes")
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_max_lifetime() -> u64 {
    3600
}

fn default_runner_work_dir() -> PathBuf {
    PathBuf::from("/tmp/duplex/features")
}

fn default_settle_delay() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_compose_command() -> String {
    "docker compose".to_string()
}

fn default_environment_timeout() -> u64 {
    300
}

fn default_promotion_timeout() -> u64 {
    30
}

fn default_monitor_interval() -> u64 {
    60
}

fn default_max_connections() -> u32 {
    5
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for NodeConfigSpec {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            core_manager: CoreManagerConfig::default(),
            runtime: RuntimeConfig::default(),
            llm: LlmConfig::default(),
            source_control: SourceControlConfig::default(),
            recovery: RecoveryConfig::default(),
            sandbox: SandboxConfig::default(),
            feature_runner: FeatureRunnerConfig::default(),
            monitor: MonitorConfig::default(),
            database: None,
            network: NetworkConfig::default(),
            observability: None,
        }
    }
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "duplex-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. DUPLEX_CONFIG_PATH environment variable
    /// 2. ./duplex-config.yaml (working directory)
    /// 3. ~/.duplex/config.yaml (user home)
    /// 4. /etc/duplex/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DUPLEX_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./duplex-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".duplex").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/duplex/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(core_id) = lookup("DUPLEX_CORE_ID").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: DUPLEX_CORE_ID={}", core_id);
            self.spec.core_manager.core_id = core_id;
        }

        if let Some(url) = lookup("DUPLEX_DATABASE_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: DUPLEX_DATABASE_URL");
            match self.spec.database.as_mut() {
                Some(db) => db.url = url,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Some(token) = lookup("DUPLEX_SOURCE_CONTROL_TOKEN").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: DUPLEX_SOURCE_CONTROL_TOKEN");
            self.spec.source_control.token = Some(token);
        }

        if let Some(endpoint) = lookup("DUPLEX_LLM_ENDPOINT").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: DUPLEX_LLM_ENDPOINT={}", endpoint);
            self.spec.llm.endpoint = endpoint;
        }
    }

    pub fn core(&self, id: &str) -> Option<&CoreEndpoint> {
        self.spec.cores.iter().find(|c| c.id == id)
    }

    /// Endpoint of the core this process runs, if it is a Core Manager.
    pub fn this_core(&self) -> Option<&CoreEndpoint> {
        self.core(&self.spec.core_manager.core_id)
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or(LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        if spec.cores.is_empty() {
            anyhow::bail!("spec.cores must list at least one core");
        }
        let mut seen = HashSet::new();
        for core in &spec.cores {
            if core.id.is_empty() {
                anyhow::bail!("Core id cannot be empty");
            }
            if !seen.insert(core.id.as_str()) {
                anyhow::bail!("Duplicate core id: '{}'", core.id);
            }
            if core.url.is_empty() {
                anyhow::bail!("Core url cannot be empty for core: {}", core.id);
            }
            if core.container_scope.is_empty() {
                anyhow::bail!("Core container_scope cannot be empty for core: {}", core.id);
            }
        }

        if self.this_core().is_none() {
            anyhow::bail!(
                "spec.core_manager.core_id '{}' not found in spec.cores",
                spec.core_manager.core_id
            );
        }

        if let Some(initial) = &spec.monitor.initial_active_core {
            if self.core(initial).is_none() {
                anyhow::bail!("spec.monitor.initial_active_core '{}' not found in spec.cores", initial);
            }
        }

        let intervals = [
            ("spec.core_manager.health_interval_seconds", spec.core_manager.health_interval_seconds),
            ("spec.core_manager.command_timeout_seconds", spec.core_manager.command_timeout_seconds),
            ("spec.recovery.interval_seconds", spec.recovery.interval_seconds),
            ("spec.recovery.retry_backoff_seconds", spec.recovery.retry_backoff_seconds),
            ("spec.recovery.backup_interval_seconds", spec.recovery.backup_interval_seconds),
            ("spec.sandbox.stop_timeout_seconds", spec.sandbox.stop_timeout_seconds),
            ("spec.sandbox.max_lifetime_seconds", spec.sandbox.max_lifetime_seconds),
            ("spec.feature_runner.poll_interval_ms", spec.feature_runner.poll_interval_ms),
            ("spec.monitor.interval_seconds", spec.monitor.interval_seconds),
            ("spec.monitor.probe_timeout_seconds", spec.monitor.probe_timeout_seconds),
            ("spec.source_control.probe_timeout_seconds", spec.source_control.probe_timeout_seconds),
        ];
        for (name, value) in intervals {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if spec.core_manager.marker_staleness_seconds < spec.core_manager.health_interval_seconds {
            anyhow::bail!(
                "spec.core_manager.marker_staleness_seconds ({}) must be at least the health interval ({})",
                spec.core_manager.marker_staleness_seconds,
                spec.core_manager.health_interval_seconds
            );
        }

        // a marker refreshed once per monitor cycle must not look stale between cycles
        if spec.monitor.interval_seconds >= spec.core_manager.marker_staleness_seconds {
            anyhow::bail!(
                "spec.monitor.interval_seconds ({}) must be below spec.core_manager.marker_staleness_seconds ({})",
                spec.monitor.interval_seconds,
                spec.core_manager.marker_staleness_seconds
            );
        }

        if spec.core_manager.denylist.iter().any(|d| d.trim().is_empty()) {
            anyhow::bail!("spec.core_manager.denylist entries cannot be empty");
        }

        if spec.sandbox.image.is_empty() {
            anyhow::bail!("spec.sandbox.image cannot be empty");
        }

        for component in &spec.monitor.components {
            if component.name.is_empty() {
                anyhow::bail!("Monitored component name cannot be empty");
            }
            if let ProbeKind::Http { url } = &component.probe {
                if url.is_empty() {
                    anyhow::bail!("Probe url cannot be empty for component: {}", component.name);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, "duplex/v1");
        assert_eq!(manifest.kind, "NodeConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.cores.len(), 2);
        assert!(manifest.spec.database.is_none());
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing_with_components() {
        let yaml = r#"
apiVersion: duplex/v1
kind: NodeConfig
metadata:
  name: lab-host
spec:
  cores:
    - id: "1"
      url: http://core1:5000
      container_scope: core1
      self_container: core_manager_core1
    - id: "2"
      url: http://core2:5000
      container_scope: core2
      self_container: core_manager_core2
  core_manager:
    core_id: "2"
    health_interval_seconds: 10
    marker_staleness_seconds: 30
  monitor:
    interval_seconds: 10
    initial_active_core: "1"
    components:
      - name: core1
        kind: http
        url: http://core1:5000/health
      - name: database
        kind: database
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.this_core().map(|c| c.url.as_str()), Some("http://core2:5000"));
        assert_eq!(manifest.spec.monitor.components.len(), 2);
        assert_eq!(manifest.spec.monitor.components[1].probe, ProbeKind::Database);
        assert_eq!(manifest.spec.core_manager.denylist, default_denylist());
        assert_eq!(manifest.spec.recovery.critical_services.len(), 4);
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.cores[1].id = "1".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.cores[1].id = "2".to_string();

        manifest.spec.core_manager.core_id = "3".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.core_manager.core_id = "1".to_string();

        manifest.spec.core_manager.marker_staleness_seconds = 5;
        assert!(manifest.validate().is_err());
        manifest.spec.core_manager.marker_staleness_seconds = 90;

        manifest.spec.monitor.interval_seconds = 90;
        assert!(manifest.validate().is_err());
        manifest.spec.monitor.interval_seconds = 60;

        manifest.spec.recovery.interval_seconds = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.recovery.interval_seconds = 60;

        manifest.spec.core_manager.denylist.push("  ".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = NodeConfigManifest::default();
        manifest.apply_overrides_from(|key| match key {
            "DUPLEX_CORE_ID" => Some("2".to_string()),
            "DUPLEX_DATABASE_URL" => Some("postgres://duplex@db/duplex".to_string()),
            "DUPLEX_LLM_ENDPOINT" => Some("http://localhost:11434".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.core_manager.core_id, "2");
        assert_eq!(
            manifest.spec.database.as_ref().map(|d| d.url.as_str()),
            Some("postgres://duplex@db/duplex")
        );
        assert_eq!(manifest.spec.llm.endpoint, "http://localhost:11434");
        assert!(manifest.spec.source_control.token.is_none());
    }

    #[test]
    fn test_token_env_indirection() {
        let config = SourceControlConfig {
            token: Some("plain-token".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolved_token().as_deref(), Some("plain-token"));

        let config = SourceControlConfig {
            token: Some("env:DUPLEX_TEST_TOKEN_THAT_IS_NOT_SET".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolved_token(), None);
    }
}
