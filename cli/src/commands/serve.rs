// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `duplex serve <component>`

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use duplex_core::domain::node_config::NodeConfigManifest;

use crate::server::{self, Component};

#[derive(Args)]
pub struct ServeArgs {
    /// Component to run in this process
    #[arg(value_enum)]
    pub component: ComponentArg,

    /// HTTP API host (default: network.bind_address)
    #[arg(long, env = "DUPLEX_HOST")]
    pub host: Option<String>,

    /// HTTP API port (default: network.port)
    #[arg(long, env = "DUPLEX_PORT")]
    pub port: Option<u16>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ComponentArg {
    Core,
    Recovery,
    Sandbox,
    Runner,
    Monitor,
}

impl From<ComponentArg> for Component {
    fn from(arg: ComponentArg) -> Self {
        match arg {
            ComponentArg::Core => Component::Core,
            ComponentArg::Recovery => Component::Recovery,
            ComponentArg::Sandbox => Component::Sandbox,
            ComponentArg::Runner => Component::Runner,
            ComponentArg::Monitor => Component::Monitor,
        }
    }
}

pub async fn handle_command(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;
    if let Some(host) = args.host {
        config.spec.network.bind_address = host;
    }
    if let Some(port) = args.port {
        config.spec.network.port = port;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    let component = Component::from(args.component);
    info!(component = component.name(), node = %config.metadata.name, "Starting duplex component");
    server::run(component, config).await
}
