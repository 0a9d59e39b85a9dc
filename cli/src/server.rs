// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-component process wiring: build the services a component needs from
//! the node config, start its loops under a [`LoopSupervisor`] and serve its
//! router until SIGINT/SIGTERM.

use anyhow::{anyhow, Context, Result};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use duplex_core::application::core_manager::{CoreManager, CoreManagerSettings};
use duplex_core::application::dispatcher::CommandDispatcher;
use duplex_core::application::feature_runner::{FeatureRunner, FeatureRunnerSettings};
use duplex_core::application::recovery::{RecoverySettings, RecoverySupervisor};
use duplex_core::application::repository_factory::Repositories;
use duplex_core::application::sandbox_manager::{SandboxManager, SandboxSettings};
use duplex_core::application::supervisor::LoopSupervisor;
use duplex_core::application::system_monitor::{MonitorSettings, SystemMonitor};
use duplex_core::domain::command::Denylist;
use duplex_core::domain::core::CoreId;
use duplex_core::domain::judge::LlmOracle;
use duplex_core::domain::llm::LLMProvider;
use duplex_core::domain::node_config::NodeConfigManifest;
use duplex_core::domain::process::ProcessExecutor;
use duplex_core::domain::repository::{PostgresConfig, StorageBackend};
use duplex_core::domain::runtime::ContainerRuntime;
use duplex_core::domain::source_control::SourceControl;
use duplex_core::infrastructure::core_client::HttpCoreClient;
use duplex_core::infrastructure::db::Database;
use duplex_core::infrastructure::llm::OllamaAdapter;
use duplex_core::infrastructure::probe::probe_for;
use duplex_core::infrastructure::process::{ComposeDriver, ShellExecutor};
use duplex_core::infrastructure::runtime::DockerRuntime;
use duplex_core::infrastructure::shared_state::{FileCoreStatusStore, FileMarkerStore};
use duplex_core::infrastructure::snapshot_archive::FileSnapshotArchive;
use duplex_core::infrastructure::source_control::GitLabClient;
use duplex_core::presentation::api;

const CORE_STOP_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Core,
    Recovery,
    Sandbox,
    Runner,
    Monitor,
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::Core => "core_manager",
            Component::Recovery => "recovery_supervisor",
            Component::Sandbox => "sandbox_manager",
            Component::Runner => "feature_runner",
            Component::Monitor => "system_monitor",
        }
    }
}

/// Run `component` until a shutdown signal arrives.
pub async fn run(component: Component, config: NodeConfigManifest) -> Result<()> {
    let supervisor = Arc::new(LoopSupervisor::new(CancellationToken::new()));
    let pool = connect_database(&config).await?;
    let repositories = Repositories::create(&storage_backend(&config), pool.clone());

    let mut sandboxes = None;
    let app = match component {
        Component::Core => build_core(&config, &repositories, &supervisor).await?,
        Component::Recovery => build_recovery(&config, &repositories, &supervisor)?,
        Component::Sandbox => {
            let manager = Arc::new(SandboxManager::new(sandbox_settings(&config), docker(&config)?));
            sandboxes = Some(manager.clone());
            api::sandbox::router(api::sandbox::SandboxApiState {
                sandboxes: manager,
                supervisor: supervisor.clone(),
            })
        }
        Component::Runner => build_runner(&config, &repositories, &supervisor)?,
        Component::Monitor => build_monitor(&config, &repositories, pool, &supervisor)?,
    };

    serve(app, &config).await?;

    info!(component = component.name(), "Stopping background loops");
    supervisor.shutdown().await;
    if let Some(manager) = sandboxes {
        manager.stop_all().await;
    }
    info!(component = component.name(), "Shutdown complete");
    Ok(())
}

async fn serve(app: Router, config: &NodeConfigManifest) -> Result<()> {
    let addr = format!("{}:{}", config.spec.network.bind_address, config.spec.network.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

fn storage_backend(config: &NodeConfigManifest) -> StorageBackend {
    match &config.spec.database {
        Some(db) => StorageBackend::PostgreSQL(PostgresConfig {
            connection_string: db.url.clone(),
        }),
        None => StorageBackend::InMemory,
    }
}

async fn connect_database(config: &NodeConfigManifest) -> Result<Option<PgPool>> {
    let Some(db) = &config.spec.database else {
        info!("No database configured, using in-memory repositories");
        return Ok(None);
    };
    let database = Database::new(&db.url, db.max_connections)
        .await
        .context("Failed to connect to the audit database")?;
    database
        .migrate()
        .await
        .context("Failed to prepare the audit schema")?;
    info!("Connected to audit database");
    Ok(Some(database.get_pool().clone()))
}

fn docker(config: &NodeConfigManifest) -> Result<Arc<dyn ContainerRuntime>> {
    let runtime = DockerRuntime::new(config.spec.runtime.docker_socket_path.clone())
        .context("Failed to connect to the container runtime")?;
    Ok(Arc::new(runtime))
}

fn source_control(config: &NodeConfigManifest) -> Arc<dyn SourceControl> {
    let sc = &config.spec.source_control;
    Arc::new(GitLabClient::new(
        sc.url.clone(),
        sc.resolved_token(),
        Duration::from_secs(sc.request_timeout_seconds),
        Duration::from_secs(sc.probe_timeout_seconds),
    ))
}

fn language_model(config: &NodeConfigManifest) -> Arc<dyn LLMProvider> {
    let llm = &config.spec.llm;
    Arc::new(OllamaAdapter::new(
        llm.endpoint.clone(),
        llm.model.clone(),
        Duration::from_secs(llm.timeout_seconds),
    ))
}

fn core_client(config: &NodeConfigManifest, timeout: Duration) -> Arc<HttpCoreClient> {
    Arc::new(HttpCoreClient::new(reqwest::Client::new(), &config.spec.cores, timeout))
}

async fn build_core(
    config: &NodeConfigManifest,
    repositories: &Repositories,
    supervisor: &Arc<LoopSupervisor>,
) -> Result<Router> {
    let cm = &config.spec.core_manager;
    let endpoint = config
        .this_core()
        .ok_or_else(|| anyhow!("core_manager.core_id '{}' is not listed in spec.cores", cm.core_id))?;
    let core_id = CoreId::new(endpoint.id.clone());
    let runtime = docker(config)?;
    let executor: Arc<dyn ProcessExecutor> = Arc::new(ShellExecutor);

    let dispatcher = Arc::new(CommandDispatcher::new(
        core_id.clone(),
        repositories.commands.clone(),
        executor,
        runtime.clone(),
        source_control(config),
        language_model(config),
        Denylist::new(cm.denylist.clone()),
        cm.command_timeout(),
    ));
    let manager = Arc::new(CoreManager::new(
        CoreManagerSettings {
            core_id,
            container_scope: endpoint.container_scope.clone(),
            self_container: endpoint.self_container.clone(),
            health_interval: cm.health_interval(),
            marker_staleness: cm.marker_staleness(),
            history_length: cm.service_history_length,
            stop_grace: CORE_STOP_GRACE,
        },
        runtime,
        Arc::new(FileMarkerStore::new(&cm.shared_dir)),
        Arc::new(FileCoreStatusStore::new(&cm.shared_dir)),
        repositories.activity.clone(),
        repositories.components.clone(),
        dispatcher,
    ));
    manager.restore_state().await;

    let looped = manager.clone();
    supervisor.spawn("health_check", move |heartbeat, cancel| {
        looped.clone().run_loop(heartbeat, cancel)
    });

    Ok(api::core::router(api::core::CoreApiState {
        manager,
        supervisor: supervisor.clone(),
    }))
}

fn build_recovery(
    config: &NodeConfigManifest,
    repositories: &Repositories,
    supervisor: &Arc<LoopSupervisor>,
) -> Result<Router> {
    let rc = &config.spec.recovery;
    let settings = RecoverySettings {
        interval: Duration::from_secs(rc.interval_seconds),
        retry_backoff: Duration::from_secs(rc.retry_backoff_seconds),
        critical_services: rc.critical_services.clone(),
        probe_timeout: Duration::from_secs(config.spec.source_control.probe_timeout_seconds),
        backup_command: rc.backup_command.clone(),
        restore_command: rc.restore_command.clone(),
        service_restore_command: rc.service_restore_command.clone(),
        backup_interval: Duration::from_secs(rc.backup_interval_seconds),
        command_timeout: Duration::from_secs(rc.command_timeout_seconds),
    };
    let recovery = Arc::new(RecoverySupervisor::new(
        settings,
        docker(config)?,
        Arc::new(FileSnapshotArchive::new(rc.backup_dir.clone())),
        source_control(config),
        Arc::new(ShellExecutor),
        repositories.activity.clone(),
    ));

    let looped = recovery.clone();
    supervisor.spawn("recovery", move |heartbeat, cancel| {
        looped.clone().run_loop(heartbeat, cancel)
    });

    Ok(api::recovery::router(api::recovery::RecoveryApiState {
        recovery,
        supervisor: supervisor.clone(),
    }))
}

fn sandbox_settings(config: &NodeConfigManifest) -> SandboxSettings {
    let sc = &config.spec.sandbox;
    SandboxSettings {
        image: sc.image.clone(),
        command: sc.command.clone(),
        work_dir: sc.work_dir.clone(),
        log_dir: sc.log_dir.clone(),
        network: sc.network.clone(),
        stop_timeout: Duration::from_secs(sc.stop_timeout_seconds),
        max_lifetime: Duration::from_secs(sc.max_lifetime_seconds),
    }
}

fn build_runner(
    config: &NodeConfigManifest,
    repositories: &Repositories,
    supervisor: &Arc<LoopSupervisor>,
) -> Result<Router> {
    let fr = &config.spec.feature_runner;
    let environment = Arc::new(ComposeDriver::new(
        Arc::new(ShellExecutor),
        fr.compose_command.clone(),
        Duration::from_secs(fr.environment_timeout_seconds),
    ));
    let oracle = Arc::new(LlmOracle::new(language_model(config), Some(config.spec.llm.model.clone())));
    let promotion_timeout = Duration::from_secs(fr.promotion_timeout_seconds);

    let runner = Arc::new(FeatureRunner::new(
        FeatureRunnerSettings {
            work_dir: fr.work_dir.clone(),
            settle_delay: Duration::from_secs(fr.settle_delay_seconds),
            poll_interval: Duration::from_millis(fr.poll_interval_ms),
            promotion_timeout,
            marker_staleness: config.spec.core_manager.marker_staleness(),
        },
        environment,
        oracle,
        repositories.test_results.clone(),
        repositories.activity.clone(),
        Arc::new(FileMarkerStore::new(&config.spec.core_manager.shared_dir)),
        core_client(config, promotion_timeout),
    ));

    let worker = runner.clone();
    supervisor.spawn("feature_worker", move |heartbeat, cancel| {
        worker.clone().run_worker(heartbeat, cancel)
    });

    Ok(api::runner::router(api::runner::RunnerApiState {
        runner,
        supervisor: supervisor.clone(),
    }))
}

fn build_monitor(
    config: &NodeConfigManifest,
    repositories: &Repositories,
    pool: Option<PgPool>,
    supervisor: &Arc<LoopSupervisor>,
) -> Result<Router> {
    let mc = &config.spec.monitor;
    let probe_timeout = Duration::from_secs(mc.probe_timeout_seconds);
    let client = reqwest::Client::new();
    let probes = mc
        .components
        .iter()
        .map(|component| {
            (
                component.name.clone(),
                probe_for(component, &client, pool.clone(), probe_timeout),
            )
        })
        .collect::<Vec<_>>();
    if probes.is_empty() {
        warn!("No monitored components configured; overall health will read 100");
    }

    let monitor = Arc::new(SystemMonitor::new(
        MonitorSettings {
            interval: Duration::from_secs(mc.interval_seconds),
            known_cores: config.spec.cores.iter().map(|c| CoreId::new(c.id.clone())).collect(),
            initial_active_core: mc.initial_active_core.clone().map(CoreId::new),
        },
        probes,
        Arc::new(FileMarkerStore::new(&config.spec.core_manager.shared_dir)),
        core_client(config, config.spec.core_manager.command_timeout()),
        repositories.activity.clone(),
    ));

    let looped = monitor.clone();
    supervisor.spawn("monitor", move |heartbeat, cancel| {
        looped.clone().run_loop(heartbeat, cancel)
    });

    Ok(api::monitor::router(api::monitor::MonitorApiState {
        monitor,
        supervisor: supervisor.clone(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
